//! The shared region holding operands, result and the work cursor.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use memmap2::MmapMut;
use tracing::{debug, warn};

use crate::Error;
use crate::cursor::{Cursor, Granularity, WorkUnit};
use crate::layout::{HEADER_BYTES, Header, Layout, MAGIC, Tally};
use crate::lock::ShmMutex;
use crate::name::RegionName;

/// A memory-mapped region shared by the coordinator and its workers.
///
/// The coordinator creates the region with [`SharedWorkspace::create`] and
/// owns its backing file: the file is unlinked by [`destroy`], or on drop if
/// `destroy` was never reached. Worker processes attach with
/// [`SharedWorkspace::open`] and never unlink anything.
///
/// All cross-process state lives in the mapping itself. The header words are
/// atomics, A and B are read-only once workers exist, and each cell of C is
/// written only through the [`Claim`] that covers it.
///
/// [`destroy`]: SharedWorkspace::destroy
pub struct SharedWorkspace {
    _mmap: MmapMut,
    base: *mut u8,
    layout: Layout,
    granularity: Granularity,
    name: String,
    path: PathBuf,
    owner: bool,
}

// SAFETY: `base` points into `_mmap`, which lives as long as the workspace
// and never moves. Shared access goes through atomics (header, ledger,
// tallies), through read-only slices (A and B after population), or through
// writes to C cells that the claim protocol hands to exactly one holder.
unsafe impl Send for SharedWorkspace {}
unsafe impl Sync for SharedWorkspace {}

/// Exclusive right to write the cells of one work unit.
///
/// Only [`SharedWorkspace::claim`] creates claims, and a claim borrows the
/// workspace it was taken from, so [`Claim::fill`] can only write into that
/// region and each unit's cells are written at most once.
#[derive(Debug)]
pub struct Claim<'a> {
    workspace: &'a SharedWorkspace,
    unit: WorkUnit,
    worker: usize,
}

impl Claim<'_> {
    pub fn unit(&self) -> WorkUnit {
        self.unit
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Writes every cell covered by this claim, computing each with `value`,
    /// and counts the unit as completed for its worker.
    pub fn fill(self, mut value: impl FnMut(usize, usize) -> f64) {
        let ws = self.workspace;
        let size = ws.layout.size;
        // SAFETY: C is an aligned, in-bounds section of `ws`.
        let c = unsafe { ws.base.add(ws.layout.c).cast::<f64>() };
        for (row, col) in self.unit.cells(size) {
            let v = value(row, col);
            // SAFETY: the unit came from this workspace's cursor, so the cell
            // lies inside its C, and no other claim covers it.
            unsafe { c.add(row * size + col).write(v) };
        }
        ws.tallies()[self.worker]
            .completed
            .fetch_add(1, Ordering::Relaxed);
    }
}

/// Units a worker claimed and finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerTally {
    pub claimed: u64,
    pub completed: u64,
}

impl WorkerTally {
    /// Units claimed but never written, e.g. because the worker died.
    pub fn abandoned(&self) -> u64 {
        self.claimed.saturating_sub(self.completed)
    }
}

/// Result of checking the claim ledger after all workers have stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionAudit {
    pub units: usize,
    pub unclaimed: usize,
    pub overclaimed: usize,
    pub first_gap: Option<usize>,
}

impl PartitionAudit {
    /// Every unit was claimed exactly once.
    pub fn is_exact(&self) -> bool {
        self.unclaimed == 0 && self.overclaimed == 0
    }
}

impl fmt::Display for PartitionAudit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} units unclaimed, {} claimed more than once",
            self.unclaimed, self.units, self.overclaimed
        )?;
        if let Some(unit) = self.first_gap {
            write!(f, " (first at unit {unit})")?;
        }
        Ok(())
    }
}

fn allocation(name: &str, source: io::Error) -> Error {
    Error::Allocation {
        name: name.to_string(),
        source,
    }
}

impl SharedWorkspace {
    /// Creates a fresh region named `name` inside `dir`.
    ///
    /// The backing file is created exclusively, so a name collision fails
    /// instead of silently sharing state with another call. The cursor
    /// starts at `(0, 0)`, C and the audit area are zeroed, and the mutex
    /// stays closed until [`ShmMutex::init`] is called.
    pub fn create(
        dir: &Path,
        name: &RegionName,
        size: usize,
        granularity: Granularity,
        worker_slots: usize,
    ) -> Result<Self, Error> {
        if size == 0 {
            return Err(Error::ZeroSize);
        }
        let layout = Layout::new(size, granularity, worker_slots).ok_or_else(|| {
            allocation(
                name.as_str(),
                io::Error::new(io::ErrorKind::InvalidInput, "region size overflows usize"),
            )
        })?;

        let path = name.path_in(dir);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| allocation(name.as_str(), e))?;

        let mapped = file
            .set_len(layout.total as u64)
            .and_then(|()| unsafe { MmapMut::map_mut(&file) });
        let mut mmap = match mapped {
            Ok(mmap) => mmap,
            Err(e) => {
                let _ = fs::remove_file(&path);
                return Err(allocation(name.as_str(), e));
            }
        };

        let base = mmap.as_mut_ptr();
        // SAFETY: the mapping is page aligned and at least HEADER_BYTES long.
        unsafe {
            ptr::write(
                base.cast::<Header>(),
                Header {
                    magic: MAGIC,
                    size: size as u64,
                    granularity: granularity.code(),
                    permits: AtomicU32::new(0),
                    worker_slots: worker_slots as u64,
                    next_row: AtomicU64::new(0),
                    next_col: AtomicU64::new(0),
                },
            );
        }

        debug!(
            region = %name,
            size,
            granularity = %granularity,
            bytes = layout.total,
            "created shared workspace"
        );

        Ok(Self {
            _mmap: mmap,
            base,
            layout,
            granularity,
            name: name.to_string(),
            path,
            owner: true,
        })
    }

    /// Attaches to a region created by another process.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| allocation(&name, e))?;
        let mut mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|e| allocation(&name, e))?;

        if mmap.len() < HEADER_BYTES {
            return Err(Error::InvalidRegion(format!(
                "{name}: {} bytes is too small for a header",
                mmap.len()
            )));
        }

        let base = mmap.as_mut_ptr();
        // SAFETY: length checked above; the non-atomic header fields are only
        // written by `create`, before any worker is started.
        let header = unsafe { &*base.cast::<Header>() };
        if header.magic != MAGIC {
            return Err(Error::InvalidRegion(format!("{name}: bad magic")));
        }
        let granularity = Granularity::from_code(header.granularity).ok_or_else(|| {
            Error::InvalidRegion(format!("{name}: unknown granularity {}", header.granularity))
        })?;
        let size = header.size as usize;
        if size == 0 {
            return Err(Error::InvalidRegion(format!("{name}: zero matrix size")));
        }
        let layout = Layout::new(size, granularity, header.worker_slots as usize)
            .filter(|layout| layout.total == mmap.len())
            .ok_or_else(|| {
                Error::InvalidRegion(format!(
                    "{name}: length {} does not match a {size}x{size} {granularity} workspace",
                    mmap.len()
                ))
            })?;

        debug!(region = %name, size, granularity = %granularity, "attached to shared workspace");

        Ok(Self {
            _mmap: mmap,
            base,
            layout,
            granularity,
            name,
            path: path.to_path_buf(),
            owner: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the backing file, handed to worker processes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> usize {
        self.layout.size
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Number of work units the cursor hands out.
    pub fn units(&self) -> usize {
        self.layout.units
    }

    pub fn worker_slots(&self) -> usize {
        self.layout.worker_slots
    }

    fn header(&self) -> &Header {
        // SAFETY: written by `create`, validated by `open`.
        unsafe { &*self.base.cast::<Header>() }
    }

    /// The mutex guarding the cursor.
    pub fn mutex(&self) -> ShmMutex<'_> {
        ShmMutex::new(&self.header().permits)
    }

    fn cursor(&self) -> Cursor<'_> {
        let header = self.header();
        Cursor::new(
            &header.next_row,
            &header.next_col,
            self.layout.size,
            self.granularity,
        )
    }

    /// Current `(next_row, next_col)`.
    pub fn cursor_position(&self) -> (usize, usize) {
        self.cursor().position()
    }

    fn matrix_len(&self) -> usize {
        self.layout.size * self.layout.size
    }

    fn ledger(&self) -> &[AtomicU32] {
        // SAFETY: the ledger section is aligned, in bounds, and AtomicU32 has
        // the layout of u32; zero bytes are a valid value.
        unsafe {
            std::slice::from_raw_parts(
                self.base.add(self.layout.ledger).cast::<AtomicU32>(),
                self.layout.units,
            )
        }
    }

    fn tallies(&self) -> &[Tally] {
        // SAFETY: as for `ledger`.
        unsafe {
            std::slice::from_raw_parts(
                self.base.add(self.layout.tallies).cast::<Tally>(),
                self.layout.worker_slots,
            )
        }
    }

    /// Mutable views of A and B, for population before workers start.
    pub fn operands_mut(&mut self) -> (&mut [f64], &mut [f64]) {
        let len = self.matrix_len();
        // SAFETY: A and B are disjoint, aligned, in-bounds sections, and
        // `&mut self` rules out other borrows in this process.
        unsafe {
            (
                std::slice::from_raw_parts_mut(self.base.add(self.layout.a).cast::<f64>(), len),
                std::slice::from_raw_parts_mut(self.base.add(self.layout.b).cast::<f64>(), len),
            )
        }
    }

    /// Read-only views of A and B.
    pub fn operands(&self) -> (&[f64], &[f64]) {
        let len = self.matrix_len();
        // SAFETY: nothing writes A or B once workers are running.
        unsafe {
            (
                std::slice::from_raw_parts(self.base.add(self.layout.a).cast::<f64>(), len),
                std::slice::from_raw_parts(self.base.add(self.layout.b).cast::<f64>(), len),
            )
        }
    }

    /// The result matrix C.
    ///
    /// Takes `&mut self` so it can only be read once every worker borrowing
    /// this workspace has finished; worker processes must have been joined.
    pub fn result(&mut self) -> &[f64] {
        let len = self.matrix_len();
        // SAFETY: aligned, in-bounds, and no writer remains.
        unsafe { std::slice::from_raw_parts(self.base.add(self.layout.c).cast::<f64>(), len) }
    }

    /// Takes the next work unit for `worker`.
    ///
    /// The mutex is held only while the cursor is read and advanced. The
    /// ledger and tally updates happen after it is released.
    pub fn claim(&self, worker: usize) -> Result<Option<Claim<'_>>, Error> {
        let tally = self.tallies().get(worker).ok_or(Error::WorkerSlot {
            worker,
            slots: self.layout.worker_slots,
        })?;

        let unit = {
            let _guard = self.mutex().acquire()?;
            self.cursor().advance()
        };

        let Some(unit) = unit else {
            return Ok(None);
        };
        self.ledger()[unit.index(self.layout.size)].fetch_add(1, Ordering::Relaxed);
        tally.claimed.fetch_add(1, Ordering::Relaxed);

        Ok(Some(Claim {
            workspace: self,
            unit,
            worker,
        }))
    }

    pub fn tally(&self, worker: usize) -> Option<WorkerTally> {
        self.tallies().get(worker).map(|t| WorkerTally {
            claimed: t.claimed.load(Ordering::Relaxed),
            completed: t.completed.load(Ordering::Relaxed),
        })
    }

    /// Tallies of every worker slot, in slot order.
    pub fn tallies_snapshot(&self) -> Vec<WorkerTally> {
        (0..self.layout.worker_slots)
            .filter_map(|worker| self.tally(worker))
            .collect()
    }

    /// Checks that every unit was claimed exactly once.
    pub fn audit(&self) -> PartitionAudit {
        let mut audit = PartitionAudit {
            units: self.layout.units,
            unclaimed: 0,
            overclaimed: 0,
            first_gap: None,
        };
        for (unit, claims) in self.ledger().iter().enumerate() {
            match claims.load(Ordering::Relaxed) {
                1 => continue,
                0 => audit.unclaimed += 1,
                _ => audit.overclaimed += 1,
            }
            audit.first_gap.get_or_insert(unit);
        }
        audit
    }

    /// Unmaps the region and removes its backing file.
    pub fn destroy(mut self) -> Result<(), Error> {
        if !self.owner {
            return Ok(());
        }
        self.owner = false;
        fs::remove_file(&self.path).map_err(|e| allocation(&self.name, e))?;
        debug!(region = %self.name, "destroyed shared workspace");
        Ok(())
    }
}

impl Drop for SharedWorkspace {
    fn drop(&mut self) {
        if !self.owner {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(region = %self.name, "released shared workspace on drop"),
            Err(e) => warn!(region = %self.name, error = %e, "failed to remove shared workspace"),
        }
    }
}

impl fmt::Debug for SharedWorkspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedWorkspace")
            .field("name", &self.name)
            .field("size", &self.layout.size)
            .field("granularity", &self.granularity)
            .field("worker_slots", &self.layout.worker_slots)
            .field("owner", &self.owner)
            .finish()
    }
}
