//! Shared-memory workspace for partitioning a matrix product across
//! processes.
//!
//! `shm-workspace` maps one file-backed region that the coordinator and every
//! worker process see at the same physical address range. The region holds
//! the operands A and B, the result C, and a cursor guarded by a
//! cross-process mutex. Workers take work units off the cursor one at a
//! time; the lock is held only while the cursor moves, never while a worker
//! computes.
//!
//! # Region contents
//!
//! - **Header**: magic, matrix size, granularity, permit word, cursor
//! - **Matrices**: A, B, C as row-major `f64`
//! - **Audit area**: per-unit claim counters and per-worker tallies
//!
//! # Example
//!
//! ```no_run
//! use shm_workspace::{Granularity, RegionName, SharedWorkspace, default_shm_dir};
//!
//! fn main() -> Result<(), shm_workspace::Error> {
//!     let name = RegionName::unique();
//!     let mut ws = SharedWorkspace::create(&default_shm_dir(), &name, 2, Granularity::Row, 1)?;
//!     ws.operands_mut().0.copy_from_slice(&[1.0, 0.0, 0.0, 1.0]);
//!     ws.operands_mut().1.copy_from_slice(&[5.0, 6.0, 7.0, 8.0]);
//!     ws.mutex().init()?;
//!
//!     while let Some(claim) = ws.claim(0)? {
//!         let (a, b) = ws.operands();
//!         claim.fill(|i, j| (0..2).map(|k| a[i * 2 + k] * b[k * 2 + j]).sum());
//!     }
//!
//!     assert_eq!(ws.result(), &[5.0, 6.0, 7.0, 8.0]);
//!     ws.destroy()
//! }
//! ```

mod cursor;
mod error;
mod layout;
mod lock;
mod name;
mod workspace;

pub use cursor::{Granularity, WorkUnit};
pub use error::Error;
pub use lock::{LockGuard, ShmMutex};
pub use name::{RegionName, default_shm_dir};
pub use workspace::{Claim, PartitionAudit, SharedWorkspace, WorkerTally};
