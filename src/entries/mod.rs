pub mod index;
pub mod manager;
pub mod table;

pub use index::{FileState, IdentityIndex, Metadata, Priority};
pub use manager::EntriesManager;
pub use table::{EntryHandle, EntryTable, NullSink, PresentationSink};
