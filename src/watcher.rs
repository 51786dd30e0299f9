//! Directory change notifications.
//!
//! One `notify` watcher per search directory. Backend events are reduced to
//! [`WatchEvent`]s and pushed through a calloop channel, so the manager only
//! ever sees them one at a time on the loop thread.

use crate::entries::index::Priority;
use crate::entries::manager::EntriesManager;
use crate::entries::table::PresentationSink;
use crate::error::{Error, Result};
use calloop::LoopHandle;
use calloop::channel::{Channel, Event as ChannelEvent, Sender};
use log::{debug, info, trace, warn};
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// File appeared, content may still be in flight.
    Created(PathBuf),
    /// Content is being written.
    Changed(PathBuf),
    /// Writer closed the file; content is settled.
    ChangesDone(PathBuf),
    AttributeChanged(PathBuf),
    Deleted(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
    MovedIn(PathBuf),
    MovedOut(PathBuf),
    Unmounted,
}

/// A notification tagged with the search directory it belongs to.
#[derive(Debug, Clone)]
pub struct WatchMessage {
    pub dir: PathBuf,
    pub priority: Priority,
    pub event: WatchEvent,
}

pub fn translate(event: &notify::Event) -> Vec<WatchEvent> {
    let paths = event.paths.iter().cloned();
    match event.kind {
        EventKind::Create(_) => paths
            .map(|path| {
                if is_link(&path) {
                    WatchEvent::ChangesDone(path)
                } else {
                    WatchEvent::Created(path)
                }
            })
            .collect(),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            paths.map(WatchEvent::ChangesDone).collect()
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => {
            paths.map(WatchEvent::AttributeChanged).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.map(WatchEvent::MovedOut).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.map(WatchEvent::MovedIn).collect()
        }
        // inotify reports both halves on their own before the paired event
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            trace!("Paired rename {:?} already delivered as halves", event.paths);
            Vec::new()
        }
        EventKind::Modify(_) => paths.map(WatchEvent::Changed).collect(),
        EventKind::Remove(_) => paths.map(WatchEvent::Deleted).collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

/// Symlinks and extra hard links arrive complete; no writer will close them.
fn is_link(path: &Path) -> bool {
    match fs::symlink_metadata(path) {
        Ok(meta) => meta.file_type().is_symlink() || (meta.is_file() && meta.nlink() > 1),
        Err(_) => false,
    }
}

/// Keeps the per-directory watchers alive.
pub struct DirectoryWatcher {
    watchers: Vec<RecommendedWatcher>,
    degraded: Vec<PathBuf>,
}

impl DirectoryWatcher {
    /// Watches every directory; index in `dirs` is its priority.
    /// A directory that can't be watched is logged and left without live updates.
    pub fn spawn(dirs: &[PathBuf], tx: &Sender<WatchMessage>) -> Self {
        let mut watchers = Vec::new();
        let mut degraded = Vec::new();
        for (priority, dir) in dirs.iter().enumerate() {
            match watch_dir(dir, priority, tx.clone()) {
                Ok(watcher) => {
                    debug!("Watching {:?} (priority {})", dir, priority);
                    watchers.push(watcher);
                }
                Err(e) => {
                    warn!("{e}; no live updates for this directory");
                    degraded.push(dir.clone());
                }
            }
        }
        info!("DirectoryWatcher: {} live, {} degraded", watchers.len(), degraded.len());
        Self { watchers, degraded }
    }

    pub fn live_count(&self) -> usize {
        self.watchers.len()
    }

    pub fn degraded(&self) -> &[PathBuf] {
        &self.degraded
    }
}

fn watch_dir(dir: &Path, priority: Priority, tx: Sender<WatchMessage>) -> Result<RecommendedWatcher> {
    let root = dir.to_path_buf();
    let handler = move |res: notify::Result<notify::Event>| match res {
        Ok(event) => {
            for event in translate(&event) {
                let msg = WatchMessage { dir: root.clone(), priority, event };
                if tx.send(msg).is_err() {
                    // loop is gone, nothing left to notify
                    return;
                }
            }
        }
        Err(e) => warn!("Watch error in {:?}: {}", root, e),
    };

    let watch_error = |source| Error::Watch { path: dir.to_path_buf(), source };
    let mut watcher = notify::recommended_watcher(handler).map_err(watch_error)?;
    watcher.watch(dir, RecursiveMode::Recursive).map_err(watch_error)?;
    Ok(watcher)
}

/// Feeds `channel` into the loop, handing each message to the manager.
pub fn attach<S>(handle: &LoopHandle<'_, EntriesManager<S>>, channel: Channel<WatchMessage>) -> Result<()>
where
    S: PresentationSink,
{
    handle
        .insert_source(channel, |event, _, manager: &mut EntriesManager<S>| {
            if let ChannelEvent::Msg(msg) = event {
                manager.handle_event(&msg.dir, msg.priority, msg.event);
            }
        })
        .map_err(|e| Error::EventLoop(e.error.to_string()))?;
    Ok(())
}

/// Pings `tx` whenever a file in the statistics directory settles.
pub fn watch_stats(dir: &Path, tx: Sender<()>) -> Result<RecommendedWatcher> {
    let handler = move |res: notify::Result<notify::Event>| {
        let Ok(event) = res else { return };
        let settled = translate(&event)
            .iter()
            .any(|ev| matches!(ev, WatchEvent::ChangesDone(_) | WatchEvent::MovedIn(_)));
        if settled {
            let _ = tx.send(());
        }
    };

    let watch_error = |source| Error::Watch { path: dir.to_path_buf(), source };
    let mut watcher = notify::recommended_watcher(handler).map_err(watch_error)?;
    watcher.watch(dir, RecursiveMode::NonRecursive).map_err(watch_error)?;
    Ok(watcher)
}

/// Runs `reload` on the manager for every ping on `channel`.
pub fn attach_stats<S, F>(
    handle: &LoopHandle<'_, EntriesManager<S>>,
    channel: Channel<()>,
    mut reload: F,
) -> Result<()>
where
    S: PresentationSink,
    F: FnMut(&mut EntriesManager<S>) + 'static,
{
    handle
        .insert_source(channel, move |event, _, manager: &mut EntriesManager<S>| {
            if let ChannelEvent::Msg(()) = event {
                reload(manager);
            }
        })
        .map_err(|e| Error::EventLoop(e.error.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};

    fn event(kind: EventKind, path: &str) -> notify::Event {
        notify::Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn close_write_settles() {
        let ev = event(EventKind::Access(AccessKind::Close(AccessMode::Write)), "/a/foo.desktop");
        assert_eq!(translate(&ev), vec![WatchEvent::ChangesDone("/a/foo.desktop".into())]);
    }

    #[test]
    fn plain_kinds_map_one_to_one() {
        let created = event(EventKind::Create(CreateKind::File), "/a/x.desktop");
        assert_eq!(translate(&created), vec![WatchEvent::Created("/a/x.desktop".into())]);

        let data = event(EventKind::Modify(ModifyKind::Data(DataChange::Content)), "/a/x.desktop");
        assert_eq!(translate(&data), vec![WatchEvent::Changed("/a/x.desktop".into())]);

        let attr = event(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)), "/a/x.desktop");
        assert_eq!(translate(&attr), vec![WatchEvent::AttributeChanged("/a/x.desktop".into())]);

        let removed = event(EventKind::Remove(RemoveKind::File), "/a/x.desktop");
        assert_eq!(translate(&removed), vec![WatchEvent::Deleted("/a/x.desktop".into())]);
    }

    #[test]
    fn rename_halves_become_moves() {
        let from = event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), "/a/old.desktop");
        let to = event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), "/a/new.desktop");
        let both = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("/a/old.desktop".into())
            .add_path("/a/new.desktop".into());

        assert_eq!(translate(&from), vec![WatchEvent::MovedOut("/a/old.desktop".into())]);
        assert_eq!(translate(&to), vec![WatchEvent::MovedIn("/a/new.desktop".into())]);
        assert!(translate(&both).is_empty());
    }

    #[test]
    fn created_link_settles_at_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("real.desktop");
        fs::write(&target, "[Desktop Entry]\n").unwrap();
        let soft = dir.path().join("soft.desktop");
        std::os::unix::fs::symlink(&target, &soft).unwrap();
        let hard = dir.path().join("hard.desktop");
        fs::hard_link(&target, &hard).unwrap();
        let fresh = dir.path().join("fresh.desktop");
        fs::write(&fresh, "").unwrap();

        for path in [&soft, &hard] {
            let ev = notify::Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone());
            assert_eq!(translate(&ev), vec![WatchEvent::ChangesDone(path.clone())]);
        }
        let ev = notify::Event::new(EventKind::Create(CreateKind::File)).add_path(fresh.clone());
        assert_eq!(translate(&ev), vec![WatchEvent::Created(fresh)]);
    }

    #[test]
    fn reads_are_dropped() {
        let ev = event(EventKind::Access(AccessKind::Read), "/a/x.desktop");
        assert!(translate(&ev).is_empty());
    }
}
