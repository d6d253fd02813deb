//! Error types for shared workspace operations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to allocate shared region {name}: {source}")]
    Allocation {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid shared region: {0}")]
    InvalidRegion(String),

    #[error("synchronization failure: {0}")]
    Synchronization(String),

    #[error("matrix size must be positive")]
    ZeroSize,

    #[error("worker {worker} has no tally slot (region has {slots})")]
    WorkerSlot { worker: usize, slots: usize },
}
