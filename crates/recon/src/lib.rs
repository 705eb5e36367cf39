//! `tally-recon`: Concurrent cross-store object-count reconciliation engine.
//!
//! Pure engine crate: takes two `ObjectStore` handles and a run config,
//! returns a binned report. No CLI or network dependencies.

pub mod backoff;
pub mod bins;
pub mod compare;
pub mod config;
pub mod engine;
pub mod enumerate;
pub mod error;
pub mod model;
pub mod pool;
pub mod report;
pub mod store;

pub use backoff::{retry, Backoff, RetryError, RetryPolicy};
pub use bins::DiffBin;
pub use compare::{Comparator, DualSourceComparator, RetryingComparator, ScopedStore};
pub use config::{RunConfig, StoreConfig, StoreKind};
pub use engine::{run, IdentifierSource};
pub use error::{CompareError, ReconError, StoreError};
pub use model::{Comparison, Identifier, StoreSide};
pub use report::{write_summary, ReconReport};
pub use store::{MemoryStore, ObjectStore};
