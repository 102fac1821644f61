//! Storage layer for idmtools.
//!
//! - [`PersistStore`]: namespaced record store, with [`InMemoryStore`] and
//!   (feature `persistent`) a file-backed store
//! - [`PersistService`]: typed view keyed by UID
//! - [`PersistenceContext`] and [`retrieve_experiment`]: experiment lookup
//!   with platform read-through

mod memory;
mod service;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::InMemoryStore;
pub use service::{
    retrieve_experiment, Persistable, PersistService, PersistenceContext, EXPERIMENTS_NAMESPACE,
    PLATFORMS_NAMESPACE,
};
pub use traits::{PersistStore, StorageError};
