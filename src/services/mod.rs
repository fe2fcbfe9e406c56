//! Services layer for the icon server
//!
//! Upstream icon search and writing selections to disk.

pub mod saver;
pub mod search;

pub use saver::{IconSaver, SaveReport, DEFAULT_SAVE_PATH};
pub use search::{IconProvider, IconSearcher, IconfontClient, SearchQuery, UpstreamPage, MAX_PAGE_SIZE};
