/// A launchable application as read from a descriptor file.
///
/// Produced once by the parser and replaced wholesale on update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationRecord {
    pub name: String,          // Display name, localized if available
    pub exec: String,          // Command line, terminal-wrapped if needed
    pub icon: String,          // Icon name or absolute path
    pub comment: String,       // Tooltip / description
    pub mime_type: String,
    pub categories: Vec<String>,
    pub terminal: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub clicks: u32,
    pub pinned: bool,
    // Only meaningful while pinned, 0 otherwise
    pub position: i32,
    pub favorite: bool,
}

/// One row of the favorites cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoriteEntry {
    pub desktop_id: String,
    pub clicks: u32,
}

impl FavoriteEntry {
    pub fn new(desktop_id: impl Into<String>, clicks: u32) -> Self {
        Self {
            desktop_id: desktop_id.into(),
            clicks,
        }
    }
}

/// A row of the entry table.
#[derive(Debug, Clone)]
pub struct Entry {
    pub desktop_id: String,
    pub record: ApplicationRecord,
    pub stats: Stats,
}

impl Entry {
    pub fn new(desktop_id: String, stats: Stats, record: ApplicationRecord) -> Self {
        Self {
            desktop_id,
            record,
            stats,
        }
    }
}
