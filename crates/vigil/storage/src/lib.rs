//! Persistence for metric samples and action records.
//!
//! Storage is consumed through the [`MetricStorage`] and [`ActionStorage`]
//! traits. [`PostgresStorage`] backs production deployments;
//! [`MemoryStorage`] backs development and tests. Action status
//! transitions are compare-and-set: exactly one caller wins any race.

mod error;
mod memory;
mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use traits::{
    ActionFilter, ActionStorage, MetricStorage, Storage, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT,
};
