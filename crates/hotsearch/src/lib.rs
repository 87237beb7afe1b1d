//! Core domain for the trending-list aggregator.
//!
//! Holds the normalized record model, the `Fetcher` capability every source
//! implements, the registry that maps source ids to fetchers, and the
//! snapshot store interface with its in-memory and PostgreSQL backends.

pub mod db;
pub mod error;
pub mod fetcher;
pub mod memory;
pub mod registry;
pub mod store;
pub mod test_helpers;
pub mod types;

pub use error::{FetchError, RegistryError, StoreError};
pub use fetcher::Fetcher;
pub use registry::{FetcherRegistry, SourceDescriptor};
pub use store::SnapshotStore;
pub use types::{
    AggregateSnapshot, ApiResponse, FetchOutcome, FetchResult, NormalizedRecord, Partition,
    SourceInfo, SourceItems,
};
