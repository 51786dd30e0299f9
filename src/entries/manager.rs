use super::index::{FileState, IdentityIndex, Metadata, Priority};
use super::table::{EntryTable, NullSink, PresentationSink};
use crate::desktop::{self, Outcome, ParserConfig};
use crate::model::Stats;
use crate::watcher::WatchEvent;
use log::{debug, error, info, trace, warn};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Loads descriptors from the search directories and keeps the table in
/// step with changes on disk.
///
/// When two files share a desktop id, the one from the directory listed
/// first wins. A shadowed file stays ignored even after the file shadowing
/// it goes away.
pub struct EntriesManager<S = NullSink> {
    index: IdentityIndex,
    table: EntryTable<S>,
    config: ParserConfig,
}

impl<S: PresentationSink> EntriesManager<S> {
    pub fn new(table: EntryTable<S>, config: ParserConfig) -> Self {
        Self {
            index: IdentityIndex::new(),
            table,
            config,
        }
    }

    /// Loads every descriptor under `dirs`; the position in `dirs` is the priority.
    pub fn scan(&mut self, dirs: &[PathBuf]) {
        for (priority, dir) in dirs.iter().enumerate() {
            if !dir.exists() {
                debug!("Skipping missing directory {:?}", dir);
                continue;
            }
            debug!("Scanning desktop files in {:?}", dir);
            for (id, path) in descriptors(dir, dir) {
                self.try_load_entry(id, &path, priority);
            }
        }
        info!(
            "EntriesManager: {} desktop ids, {} shown",
            self.index.len(),
            self.table.len()
        );
    }

    /// Applies one change notification for a file under `dir`.
    pub fn handle_event(&mut self, dir: &Path, priority: Priority, event: WatchEvent) {
        match event {
            WatchEvent::ChangesDone(path) | WatchEvent::MovedIn(path) => {
                self.changed(dir, &path, priority);
            }
            WatchEvent::Deleted(path) | WatchEvent::MovedOut(path) => {
                self.deleted(dir, &path, priority);
            }
            WatchEvent::Renamed { from, to } => {
                self.deleted(dir, &from, priority);
                self.changed(dir, &to, priority);
            }
            // Created fires before any data is written; the settle event follows.
            WatchEvent::Created(path)
            | WatchEvent::Changed(path)
            | WatchEvent::AttributeChanged(path) => {
                trace!("Ignoring in-flight change of {:?}", path);
            }
            WatchEvent::Unmounted => warn!("Unmounting of {:?} is not supported", dir),
        }
    }

    fn changed(&mut self, dir: &Path, path: &Path, priority: Priority) {
        if path.is_dir() {
            // a whole subtree moved in
            for (id, path) in descriptors(dir, path) {
                self.on_file_changed(id, &path, priority);
            }
            return;
        }
        if !desktop::looks_like_desktop_file(path) || !path.is_file() {
            return;
        }
        if let Some(id) = desktop::desktop_id(path, dir) {
            self.on_file_changed(id, path, priority);
        }
    }

    fn deleted(&mut self, dir: &Path, path: &Path, priority: Priority) {
        let Some(id) = desktop::desktop_id(path, dir) else {
            return;
        };
        if desktop::looks_like_desktop_file(path) {
            self.on_file_deleted(&id, priority);
            return;
        }
        // the path is gone, so a directory can only be told apart by the ids under it
        let prefix = format!("{id}/");
        let gone: Vec<String> = self
            .index
            .iter()
            .filter(|(other, meta)| other.starts_with(&prefix) && meta.priority == priority)
            .map(|(other, _)| other.to_string())
            .collect();
        if !gone.is_empty() {
            debug!("{:?} went away with {} desktop ids", path, gone.len());
        }
        for id in gone {
            self.on_file_deleted(&id, priority);
        }
    }

    /// Re-reads the file behind `id` unless a higher-priority file shadows it.
    pub fn on_file_changed(&mut self, id: String, path: &Path, priority: Priority) {
        let Some(meta) = self.index.get_mut(&id) else {
            // not seen before, load it
            self.try_load_entry(id, path, priority);
            return;
        };
        if meta.shadows(priority) {
            debug!("'{}' is overridden, change of {:?} ignored", id, path);
            return;
        }
        meta.priority = priority;

        match desktop::parse_file(path, &self.config) {
            Outcome::Ok(record) => {
                meta.state = match meta.state {
                    FileState::Ok(handle) => {
                        FileState::Ok(self.table.update(handle, &id, Stats::default(), record))
                    }
                    FileState::Invalid | FileState::Hidden => {
                        FileState::Ok(self.table.emplace(&id, Stats::default(), record))
                    }
                };
            }
            Outcome::Hidden => {
                if let Some(handle) = meta.handle() {
                    self.table.erase(handle);
                }
                meta.state = FileState::Hidden;
            }
            Outcome::Error(e) => {
                error!("Failed to load desktop file {:?}: {}", path, e);
                if let Some(handle) = meta.handle() {
                    self.table.erase(handle);
                }
                meta.state = FileState::Invalid;
            }
        }
    }

    /// Forgets `id` unless the deleted file was shadowed anyway.
    pub fn on_file_deleted(&mut self, id: &str, priority: Priority) {
        let Some(&meta) = self.index.get(id) else {
            error!("on_file_deleted: no entry with id '{}'", id);
            return;
        };
        if meta.shadows(priority) {
            return;
        }
        if let Some(handle) = meta.handle() {
            self.table.erase(handle);
        }
        self.index.remove(id);
    }

    fn try_load_entry(&mut self, id: String, path: &Path, priority: Priority) {
        let Some(meta) = self.index.claim(id.clone(), priority) else {
            info!(".desktop file {:?} with id '{}' overridden, ignored", path, id);
            return;
        };
        match desktop::parse_file(path, &self.config) {
            Outcome::Ok(record) => {
                meta.state = FileState::Ok(self.table.emplace(&id, Stats::default(), record));
            }
            Outcome::Hidden => debug!("{:?} is hidden", path),
            Outcome::Error(e) => {
                error!("Failed to load desktop file {:?}: {}", path, e);
                meta.state = FileState::Invalid;
            }
        }
    }

    pub fn metadata(&self, id: &str) -> Option<&Metadata> {
        self.index.get(id)
    }

    pub fn index(&self) -> &IdentityIndex {
        &self.index
    }

    pub fn table(&self) -> &EntryTable<S> {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut EntryTable<S> {
        &mut self.table
    }
}

/// `(desktop id, path)` of every descriptor below `start`, ids relative to `root`.
fn descriptors(root: &Path, start: &Path) -> impl Iterator<Item = (String, PathBuf)> {
    let root = root.to_path_buf();
    WalkDir::new(start)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(move |entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                error!("Failed to read {:?}: {}", e.path().unwrap_or(start), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && desktop::looks_like_desktop_file(entry.path()))
        .filter_map(move |entry| {
            let id = desktop::desktop_id(entry.path(), &root)?;
            Some((id, entry.into_path()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::table::tests::{Event, Recorder};
    use std::fs;
    use tempfile::TempDir;

    fn manager() -> EntriesManager<Recorder> {
        let table = EntryTable::new(Recorder::default(), Vec::new(), Vec::new());
        EntriesManager::new(table, ParserConfig::new("en", "xterm -e").with_home(None))
    }

    fn write(dir: &Path, name: &str, app: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("[Desktop Entry]\nName={app}\nExec={}\n", app.to_lowercase())).unwrap();
        path
    }

    #[test]
    fn unknown_change_loads_the_file() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "late.desktop", "Late");
        let mut m = manager();

        m.handle_event(dir.path(), 0, WatchEvent::ChangesDone(path));
        let handle = m.metadata("late.desktop").and_then(Metadata::handle).unwrap();
        assert_eq!(m.table().get(handle).unwrap().record.name, "Late");
    }

    #[test]
    fn hidden_then_visible_inserts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.desktop");
        fs::write(&path, "[Desktop Entry]\nName=App\nExec=app\nNoDisplay=true\n").unwrap();
        let mut m = manager();
        m.scan(&[dir.path().to_path_buf()]);
        assert_eq!(m.metadata("app.desktop").unwrap().state, FileState::Hidden);
        assert!(m.table().is_empty());

        write(dir.path(), "app.desktop", "App");
        m.handle_event(dir.path(), 0, WatchEvent::ChangesDone(path));
        assert!(m.metadata("app.desktop").unwrap().handle().is_some());
        assert!(matches!(m.table().sink().events.as_slice(), [Event::Insert(_)]));
    }

    #[test]
    fn broken_edit_erases_then_fix_reinserts() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "app.desktop", "App");
        let mut m = manager();
        m.scan(&[dir.path().to_path_buf()]);

        fs::write(&path, "[Desktop Entry]\nName=App\n").unwrap();
        m.handle_event(dir.path(), 0, WatchEvent::ChangesDone(path.clone()));
        assert_eq!(m.metadata("app.desktop").unwrap().state, FileState::Invalid);
        assert!(m.table().is_empty());

        write(dir.path(), "app.desktop", "App");
        m.handle_event(dir.path(), 0, WatchEvent::ChangesDone(path));
        assert_eq!(m.table().len(), 1);

        let events = &m.table().sink().events;
        assert!(matches!(
            events.as_slice(),
            [Event::Insert(_), Event::Erase(_), Event::Insert(_)]
        ));
    }

    #[test]
    fn in_flight_events_are_ignored() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "app.desktop", "App");
        let mut m = manager();

        m.handle_event(dir.path(), 0, WatchEvent::Created(path.clone()));
        m.handle_event(dir.path(), 0, WatchEvent::Changed(path.clone()));
        m.handle_event(dir.path(), 0, WatchEvent::AttributeChanged(path));
        m.handle_event(dir.path(), 0, WatchEvent::Unmounted);
        assert!(m.index().is_empty());
        assert!(m.table().sink().events.is_empty());
    }

    #[test]
    fn non_descriptor_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "[Desktop Entry]\nName=X\nExec=x\n").unwrap();
        let mut m = manager();
        m.scan(&[dir.path().to_path_buf()]);
        m.handle_event(dir.path(), 0, WatchEvent::ChangesDone(path));
        assert!(m.index().is_empty());
    }

    #[test]
    fn delete_of_unknown_id_is_harmless() {
        let dir = TempDir::new().unwrap();
        let mut m = manager();
        m.handle_event(dir.path(), 0, WatchEvent::Deleted(dir.path().join("ghost.desktop")));
        assert!(m.index().is_empty());
    }

    #[test]
    fn rename_moves_the_entry() {
        let dir = TempDir::new().unwrap();
        let old = write(dir.path(), "old.desktop", "App");
        let mut m = manager();
        m.scan(&[dir.path().to_path_buf()]);

        let new = dir.path().join("new.desktop");
        fs::rename(&old, &new).unwrap();
        m.handle_event(dir.path(), 0, WatchEvent::Renamed { from: old, to: new });

        assert!(m.metadata("old.desktop").is_none());
        assert!(m.metadata("new.desktop").unwrap().handle().is_some());
        assert_eq!(m.table().len(), 1);
    }
}
