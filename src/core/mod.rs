pub mod cache;
pub mod path;

pub use cache::{CacheStats, Cached, EntryAttr, EntryKind, PathCache};
pub use path::RelativePath;
