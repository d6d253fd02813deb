//! Work units and the shared cursor that hands them out.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// How the output matrix is split into work units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    /// One unit per row of C.
    Row,
    /// One unit per cell of C.
    Element,
}

impl Granularity {
    /// Number of work units a `size`×`size` product is split into.
    pub fn units(self, size: usize) -> Option<usize> {
        match self {
            Granularity::Row => Some(size),
            Granularity::Element => size.checked_mul(size),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Row => "row",
            Granularity::Element => "element",
        }
    }

    pub(crate) fn code(self) -> u32 {
        match self {
            Granularity::Row => 1,
            Granularity::Element => 2,
        }
    }

    pub(crate) fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Granularity::Row),
            2 => Some(Granularity::Element),
            _ => None,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A piece of output work handed to exactly one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkUnit {
    Row(usize),
    Cell { row: usize, col: usize },
}

impl WorkUnit {
    /// Position of this unit in the claim ledger.
    pub fn index(self, size: usize) -> usize {
        match self {
            WorkUnit::Row(row) => row,
            WorkUnit::Cell { row, col } => row * size + col,
        }
    }

    /// The `(row, col)` cells of C this unit covers, in row-major order.
    pub fn cells(self, size: usize) -> impl Iterator<Item = (usize, usize)> {
        let (row, cols) = match self {
            WorkUnit::Row(row) => (row, 0..size),
            WorkUnit::Cell { row, col } => (row, col..col + 1),
        };
        cols.map(move |col| (row, col))
    }
}

/// View over the cursor words in the region header.
///
/// `advance` reads and moves the cursor with relaxed loads and stores; the
/// caller must hold the workspace mutex, whose acquire/release pair orders
/// these accesses between processes.
pub(crate) struct Cursor<'a> {
    next_row: &'a AtomicU64,
    next_col: &'a AtomicU64,
    size: u64,
    granularity: Granularity,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(
        next_row: &'a AtomicU64,
        next_col: &'a AtomicU64,
        size: usize,
        granularity: Granularity,
    ) -> Self {
        Self {
            next_row,
            next_col,
            size: size as u64,
            granularity,
        }
    }

    /// Hands out the next unit, or `None` once the cursor is exhausted.
    ///
    /// The cursor saturates at `size` (row mode) or `(size, 0)` (element
    /// mode); late callers leave it untouched.
    pub(crate) fn advance(&self) -> Option<WorkUnit> {
        let row = self.next_row.load(Ordering::Relaxed);
        if row >= self.size {
            return None;
        }

        match self.granularity {
            Granularity::Row => {
                self.next_row.store(row + 1, Ordering::Relaxed);
                Some(WorkUnit::Row(row as usize))
            }
            Granularity::Element => {
                let col = self.next_col.load(Ordering::Relaxed);
                let next_col = col + 1;
                if next_col == self.size {
                    self.next_col.store(0, Ordering::Relaxed);
                    self.next_row.store(row + 1, Ordering::Relaxed);
                } else {
                    self.next_col.store(next_col, Ordering::Relaxed);
                }
                Some(WorkUnit::Cell {
                    row: row as usize,
                    col: col as usize,
                })
            }
        }
    }

    pub(crate) fn position(&self) -> (usize, usize) {
        (
            self.next_row.load(Ordering::Relaxed) as usize,
            self.next_col.load(Ordering::Relaxed) as usize,
        )
    }
}
