//! Offline caching: partition storage, lifecycle and caching strategies.
//!
//! This module provides:
//! - Named, versioned partitions of request -> response entries
//! - Install (pre-cache the app shell) and activate (retire old versions)
//! - Cache-first, network-first, network-first with JSON fallback and
//!   stale-while-revalidate strategies

mod layer;
mod partitions;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use partitions::{ActivateReport, InstallReport, PartitionManager, PartitionNames};
pub use storage::SqlitePartitionStore;
pub use traits::{CachePartitionStore, ResponseSource, Served};
