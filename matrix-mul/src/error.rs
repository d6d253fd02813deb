//! Error types for matrix-mul operations.

use std::fmt;

use shm_workspace::PartitionAudit;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("shared workspace error: {0}")]
    Workspace(#[from] shm_workspace::Error),

    #[error("matrix size must be positive")]
    InvalidSize,

    #[error("expected {expected} values for a square matrix, got {got}")]
    Shape { expected: usize, got: usize },

    #[error("operand size mismatch: A is {0}x{0}, B is {1}x{1}")]
    OperandMismatch(usize, usize),

    #[error("failed to spawn worker {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for worker {worker}: {source}")]
    Wait {
        worker: usize,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "{} worker(s) terminated abnormally: {abandoned} unit(s) abandoned, {unclaimed} never claimed",
        .failures.len()
    )]
    PartialFailure {
        failures: Vec<WorkerFailure>,
        abandoned: u64,
        unclaimed: usize,
    },

    #[error("work partition violated: {0}")]
    Partition(PartitionAudit),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to write report: {0}")]
    Report(#[from] std::io::Error),

    #[error("{0}")]
    Usage(String),
}

/// Failure classes a multiply call can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The shared region could not be created, sized or attached.
    Allocation,
    /// The mutex could not be set up or acquired, or the partition broke.
    Synchronization,
    /// A worker could not be started.
    Spawn,
    /// At least one worker exited abnormally; part of C is undefined.
    PartialFailure,
    InvalidInput,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Workspace(e) => match e {
                shm_workspace::Error::Allocation { .. }
                | shm_workspace::Error::InvalidRegion(_) => ErrorKind::Allocation,
                shm_workspace::Error::Synchronization(_)
                | shm_workspace::Error::WorkerSlot { .. } => ErrorKind::Synchronization,
                shm_workspace::Error::ZeroSize => ErrorKind::InvalidInput,
            },
            Error::Spawn { .. } => ErrorKind::Spawn,
            Error::Wait { .. } | Error::Partition(_) => ErrorKind::Synchronization,
            Error::PartialFailure { .. } => ErrorKind::PartialFailure,
            Error::InvalidSize
            | Error::Shape { .. }
            | Error::OperandMismatch(..)
            | Error::Config(_)
            | Error::Usage(_) => ErrorKind::InvalidInput,
            Error::Report(_) => ErrorKind::Io,
        }
    }
}

/// A worker that did not terminate cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFailure {
    pub worker: usize,
    pub reason: String,
    /// Units the worker claimed but never wrote.
    pub abandoned: u64,
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "worker {}: {} ({} unit(s) abandoned)",
            self.worker, self.reason, self.abandoned
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let alloc = Error::from(shm_workspace::Error::Allocation {
            name: "matmul-1-0".to_string(),
            source: std::io::Error::other("no space"),
        });
        assert_eq!(alloc.kind(), ErrorKind::Allocation);

        let sync = Error::from(shm_workspace::Error::Synchronization("bad".to_string()));
        assert_eq!(sync.kind(), ErrorKind::Synchronization);

        let spawn = Error::Spawn {
            worker: 3,
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(spawn.kind(), ErrorKind::Spawn);
        assert!(spawn.to_string().contains("worker 3"));

        assert_eq!(Error::InvalidSize.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_partial_failure_message() {
        let err = Error::PartialFailure {
            failures: vec![WorkerFailure {
                worker: 1,
                reason: "signal: 9 (SIGKILL)".to_string(),
                abandoned: 1,
            }],
            abandoned: 1,
            unclaimed: 4,
        };
        assert_eq!(err.kind(), ErrorKind::PartialFailure);
        assert_eq!(
            err.to_string(),
            "1 worker(s) terminated abnormally: 1 unit(s) abandoned, 4 never claimed"
        );
    }
}
