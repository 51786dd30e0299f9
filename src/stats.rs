use crate::error::Result;
use crate::model::FavoriteEntry;
use directories::ProjectDirs;
use log::{error, info};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const FAVORITES_FILE: &str = "fav-cache.json";
const PINNED_FILE: &str = "pin-cache";

/// Click counts and pinned ids, persisted between runs.
///
/// Favorites are a JSON object of desktop id to clicks, pins are one
/// desktop id per line in pin order.
#[derive(Debug)]
pub struct StatsStore {
    dir: PathBuf,
    clicks: HashMap<String, u32>,
    pinned: Vec<String>,
}

pub fn default_dir() -> Option<PathBuf> {
    ProjectDirs::from("org", "appgrid", "appgrid").map(|dirs| dirs.cache_dir().to_path_buf())
}

impl StatsStore {
    /// Loads whatever is in `dir`. Missing or broken files start out empty.
    pub fn open(dir: &Path) -> Self {
        let clicks = match load_clicks(&dir.join(FAVORITES_FILE)) {
            Ok(clicks) => clicks,
            Err(e) => {
                error!("Failed to read favorites cache in {:?}: {}", dir, e);
                HashMap::new()
            }
        };
        let pinned = load_pinned(&dir.join(PINNED_FILE));
        info!("{} cache entries, {} pinned entries loaded", clicks.len(), pinned.len());
        Self {
            dir: dir.to_path_buf(),
            clicks,
            pinned,
        }
    }

    /// The `n` most clicked ids.
    pub fn favorites(&self, n: usize) -> Vec<FavoriteEntry> {
        let mut favs: Vec<FavoriteEntry> = self
            .clicks
            .iter()
            .map(|(id, clicks)| FavoriteEntry::new(id.clone(), *clicks))
            .collect();
        favs.sort_by(|a, b| b.clicks.cmp(&a.clicks).then_with(|| a.desktop_id.cmp(&b.desktop_id)));
        favs.truncate(n);
        favs
    }

    pub fn pinned(&self) -> &[String] {
        &self.pinned
    }

    pub fn clicks(&self, id: &str) -> u32 {
        self.clicks.get(id).copied().unwrap_or(0)
    }

    pub fn click(&mut self, id: &str) -> u32 {
        let count = self.clicks.entry(id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Returns false if `id` was already pinned.
    pub fn pin(&mut self, id: &str) -> bool {
        if self.pinned.iter().any(|p| p == id) {
            return false;
        }
        self.pinned.push(id.to_string());
        true
    }

    /// Returns false if `id` was not pinned.
    pub fn unpin(&mut self, id: &str) -> bool {
        let before = self.pinned.len();
        self.pinned.retain(|p| p != id);
        before != self.pinned.len()
    }

    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string_pretty(&self.clicks)?;
        fs::write(self.dir.join(FAVORITES_FILE), content)?;

        let mut pinned = self.pinned.join("\n");
        if !pinned.is_empty() {
            pinned.push('\n');
        }
        fs::write(self.dir.join(PINNED_FILE), pinned)?;
        Ok(())
    }
}

fn load_clicks(path: &Path) -> Result<HashMap<String, u32>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn load_pinned(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|content| {
            content
                .lines()
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}
