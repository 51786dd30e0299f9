use super::table::EntryHandle;
use std::collections::HashMap;
use std::collections::hash_map::Entry as MapEntry;

/// Position of the search directory a file came from. Lower wins.
pub type Priority = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Shown; the handle points at its table row.
    Ok(EntryHandle),
    Invalid,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub state: FileState,
    pub priority: Priority,
}

impl Metadata {
    pub fn handle(&self) -> Option<EntryHandle> {
        match self.state {
            FileState::Ok(handle) => Some(handle),
            FileState::Invalid | FileState::Hidden => None,
        }
    }

    /// Whether a file at `priority` is shadowed by the one recorded here.
    pub fn shadows(&self, priority: Priority) -> bool {
        self.priority < priority
    }
}

/// Maps desktop ids to their bookkeeping. One record per id.
#[derive(Debug, Default)]
pub struct IdentityIndex {
    ids: HashMap<String, Metadata>,
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a not-yet-known id as `Hidden` at `priority`.
    /// Returns `None` if the id is already taken.
    pub fn claim(&mut self, desktop_id: String, priority: Priority) -> Option<&mut Metadata> {
        match self.ids.entry(desktop_id) {
            MapEntry::Occupied(_) => None,
            MapEntry::Vacant(slot) => Some(slot.insert(Metadata {
                state: FileState::Hidden,
                priority,
            })),
        }
    }

    pub fn get(&self, desktop_id: &str) -> Option<&Metadata> {
        self.ids.get(desktop_id)
    }

    pub fn get_mut(&mut self, desktop_id: &str) -> Option<&mut Metadata> {
        self.ids.get_mut(desktop_id)
    }

    pub fn remove(&mut self, desktop_id: &str) -> Option<Metadata> {
        self.ids.remove(desktop_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Metadata)> {
        self.ids.iter().map(|(id, meta)| (id.as_str(), meta))
    }
}
