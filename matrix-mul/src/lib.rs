//! Sequential vs parallel matrix multiplication over a shared-memory
//! workspace.
//!
//! `matrix-mul` computes C = A × B for square matrices of `f64` three ways:
//! a single-threaded baseline, and two parallel modes in which a pool of
//! worker processes pulls work units (whole rows, or single cells) from a
//! cursor guarded by a lock inside the shared region.
//!
//! # Workspace Layout
//!
//! - **Header**: magic, size, granularity, lock word, cursor
//! - **A, B, C**: `size × size` row-major `f64` matrices
//! - **Claim ledger**: one counter per work unit
//! - **Tallies**: claimed/completed counters per worker
//!
//! # Example
//!
//! ```no_run
//! use matrix_mul::{Config, MatrixMul};
//!
//! fn main() -> Result<(), matrix_mul::Error> {
//!     let mut mm = MatrixMul::new(&Config::from_env()?);
//!
//!     let seq = mm.run_sequential(100)?;
//!     let row = mm.run_parallel_by_row(100, 10)?;
//!     let element = mm.run_parallel_by_element(100, 10)?;
//!
//!     println!("sequential: {:.2} us", seq.elapsed_micros());
//!     println!("row:        {:.2} us", row.elapsed_micros());
//!     println!("element:    {:.2} us", element.elapsed_micros());
//!     Ok(())
//! }
//! ```
//!
//! The library runs workers as threads unless told otherwise. Worker
//! processes need a program that dispatches `worker <region> <id>` to
//! [`worker::run_process`], such as this crate's `matrix-mul` binary; see
//! [`Launcher`].

pub mod bench;
mod config;
mod error;
mod matrix;
mod matrix_mul;
pub mod pool;
pub mod report;
pub mod sequential;
pub mod worker;

pub use config::Config;
pub use error::{Error, ErrorKind, WorkerFailure};
pub use matrix::{Matrix, Operands, populate};
pub use matrix_mul::{MatrixMul, Product, Strategy};
pub use pool::{Launcher, Pool};
pub use shm_workspace::{Granularity, WorkerTally};
