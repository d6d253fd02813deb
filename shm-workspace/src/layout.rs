//! Byte layout of a shared region.
//!
//! ```text
//! [ header: 64 bytes ][ A: n*n f64 ][ B: n*n f64 ][ C: n*n f64 ]
//! [ ledger: one u32 per work unit ][ pad to 8 ][ tallies: 2 u64 per worker ]
//! ```
//!
//! The mapping is page aligned, so every section starting on a multiple of
//! its element alignment is aligned in memory too.

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, AtomicU64};

use crate::cursor::Granularity;

pub(crate) const MAGIC: u64 = u64::from_le_bytes(*b"MATMUL01");
pub(crate) const HEADER_BYTES: usize = 64;

#[repr(C)]
pub(crate) struct Header {
    pub(crate) magic: u64,
    pub(crate) size: u64,
    pub(crate) granularity: u32,
    pub(crate) permits: AtomicU32,
    pub(crate) worker_slots: u64,
    pub(crate) next_row: AtomicU64,
    pub(crate) next_col: AtomicU64,
}

const _: () = assert!(size_of::<Header>() <= HEADER_BYTES);

/// Per-worker unit counters.
#[repr(C)]
pub(crate) struct Tally {
    pub(crate) claimed: AtomicU64,
    pub(crate) completed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Layout {
    pub(crate) size: usize,
    pub(crate) units: usize,
    pub(crate) worker_slots: usize,
    pub(crate) a: usize,
    pub(crate) b: usize,
    pub(crate) c: usize,
    pub(crate) ledger: usize,
    pub(crate) tallies: usize,
    pub(crate) total: usize,
}

impl Layout {
    /// Computes section offsets, or `None` if the region would not fit in
    /// the address space.
    pub(crate) fn new(size: usize, granularity: Granularity, worker_slots: usize) -> Option<Self> {
        let units = granularity.units(size)?;
        let matrix_bytes = size.checked_mul(size)?.checked_mul(size_of::<f64>())?;

        let a = HEADER_BYTES;
        let b = a.checked_add(matrix_bytes)?;
        let c = b.checked_add(matrix_bytes)?;
        let ledger = c.checked_add(matrix_bytes)?;
        let ledger_end = ledger.checked_add(units.checked_mul(size_of::<AtomicU32>())?)?;
        let tallies = ledger_end.checked_next_multiple_of(size_of::<u64>())?;
        let total = tallies.checked_add(worker_slots.checked_mul(size_of::<Tally>())?)?;

        Some(Self {
            size,
            units,
            worker_slots,
            a,
            b,
            c,
            ledger,
            tallies,
            total,
        })
    }
}
