//! Application entry index for the grid launcher.
//!
//! Parses `.desktop` descriptors from an ordered list of search directories,
//! deduplicates them by desktop id (first directory wins) and keeps an
//! [`entries::EntryTable`] consistent with the filesystem as files change.

pub mod config;
pub mod desktop;
pub mod entries;
pub mod error;
pub mod matcher;
pub mod model;
pub mod stats;
pub mod watcher;

pub use error::{Error, Result};
