//! Cross-process mutex over a permit word in the region header.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::Error;

const TAKEN: u32 = 0;
const AVAILABLE: u32 = 1;
/// Held, and at least one waiter may be asleep on the word.
const CONTENDED: u32 = 2;
const SPINS_BEFORE_SLEEP: u32 = 64;

/// A binary semaphore stored in shared memory and used as a mutex.
///
/// The permit word starts at 0 when the region is created, so nobody can
/// enter the critical section until the coordinator calls [`init`]. From
/// then on it is 1 when free, 0 while held, and 2 while held with sleeping
/// waiters. Any other value means the region was corrupted or is not a
/// workspace at all.
///
/// Waiters spin briefly, then sleep on the word (a futex on Linux) and are
/// woken by the release. Sleeps are bounded, so a waiter rechecks the word
/// periodically even if the holder died without releasing. There is no FIFO
/// ordering between waiters.
///
/// [`init`]: ShmMutex::init
pub struct ShmMutex<'a> {
    permits: &'a AtomicU32,
}

fn out_of_range(found: u32) -> Error {
    Error::Synchronization(format!("permit count {found} out of range"))
}

impl<'a> ShmMutex<'a> {
    pub(crate) fn new(permits: &'a AtomicU32) -> Self {
        Self { permits }
    }

    /// Makes the single permit available and wakes anyone who tried to
    /// enter early.
    pub fn init(&self) -> Result<(), Error> {
        let mut current = self.permits.load(Ordering::Relaxed);
        loop {
            match current {
                TAKEN | CONTENDED => {}
                AVAILABLE => {
                    return Err(Error::Synchronization(
                        "mutex already initialized".to_string(),
                    ));
                }
                other => return Err(out_of_range(other)),
            }
            match self.permits.compare_exchange(
                current,
                AVAILABLE,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(CONTENDED) => {
                    futex::wake_all(self.permits);
                    return Ok(());
                }
                Ok(_) => return Ok(()),
                Err(found) => current = found,
            }
        }
    }

    /// Blocks until the permit is obtained.
    pub fn acquire(&self) -> Result<LockGuard<'a>, Error> {
        for _ in 0..SPINS_BEFORE_SLEEP {
            match self.permits.compare_exchange_weak(
                AVAILABLE,
                TAKEN,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(self.guard()),
                // Held by someone else, or a spurious CAS failure.
                Err(TAKEN | CONTENDED | AVAILABLE) => std::hint::spin_loop(),
                Err(other) => return Err(out_of_range(other)),
            }
        }

        loop {
            match self.permits.load(Ordering::Relaxed) {
                // Taken as CONTENDED: other sleepers may still be waiting.
                AVAILABLE => {
                    if self
                        .permits
                        .compare_exchange(
                            AVAILABLE,
                            CONTENDED,
                            Ordering::Acquire,
                            Ordering::Relaxed,
                        )
                        .is_ok()
                    {
                        return Ok(self.guard());
                    }
                }
                TAKEN => {
                    // Announce a sleeper before sleeping; retry if the word moved.
                    if self
                        .permits
                        .compare_exchange(TAKEN, CONTENDED, Ordering::Relaxed, Ordering::Relaxed)
                        .is_ok()
                    {
                        futex::wait(self.permits, CONTENDED);
                    }
                }
                CONTENDED => futex::wait(self.permits, CONTENDED),
                other => return Err(out_of_range(other)),
            }
        }
    }

    pub fn is_locked(&self) -> bool {
        self.permits.load(Ordering::Relaxed) != AVAILABLE
    }

    fn guard(&self) -> LockGuard<'a> {
        LockGuard {
            permits: self.permits,
        }
    }
}

/// Holds the permit; dropping it hands the permit back.
#[must_use = "the mutex is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    permits: &'a AtomicU32,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self.permits.swap(AVAILABLE, Ordering::Release) == CONTENDED {
            futex::wake_one(self.permits);
        }
    }
}

#[cfg(target_os = "linux")]
mod futex {
    use std::sync::atomic::AtomicU32;

    /// Upper bound on one sleep, in nanoseconds.
    const WAIT_SLICE_NANOS: i64 = 10_000_000;

    /// Sleeps while `word` still holds `expected`. Returns early on wake,
    /// timeout, or signal; callers recheck the word.
    pub(super) fn wait(word: &AtomicU32, expected: u32) {
        let timeout = libc::timespec {
            tv_sec: 0,
            tv_nsec: WAIT_SLICE_NANOS as _,
        };
        // SAFETY: `word` is a live, aligned u32 and `timeout` outlives the
        // call. Not FUTEX_PRIVATE: the word lives in a mapping shared between
        // processes.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                word.as_ptr(),
                libc::FUTEX_WAIT,
                expected as libc::c_int,
                &timeout as *const libc::timespec,
            );
        }
    }

    pub(super) fn wake_one(word: &AtomicU32) {
        wake(word, 1);
    }

    pub(super) fn wake_all(word: &AtomicU32) {
        wake(word, libc::c_int::MAX);
    }

    fn wake(word: &AtomicU32, count: libc::c_int) {
        // SAFETY: `word` is a live, aligned u32.
        unsafe {
            libc::syscall(libc::SYS_futex, word.as_ptr(), libc::FUTEX_WAKE, count);
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod futex {
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    pub(super) fn wait(_word: &AtomicU32, _expected: u32) {
        std::thread::sleep(Duration::from_micros(50));
    }

    pub(super) fn wake_one(_word: &AtomicU32) {}

    pub(super) fn wake_all(_word: &AtomicU32) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::UnsafeCell;
    use std::thread;
    use std::time::{Duration, Instant};

    struct Counter(UnsafeCell<u64>);

    // Only touched while holding the mutex under test.
    unsafe impl Sync for Counter {}

    #[test]
    fn test_blocks_until_init() {
        let permits = AtomicU32::new(TAKEN);
        let mutex = ShmMutex::new(&permits);
        assert!(mutex.is_locked());

        mutex.init().unwrap();
        assert!(!mutex.is_locked());
        assert!(mutex.init().is_err());
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let permits = AtomicU32::new(TAKEN);
        let mutex = ShmMutex::new(&permits);
        mutex.init().unwrap();

        let guard = mutex.acquire().unwrap();
        assert!(mutex.is_locked());
        drop(guard);
        assert!(!mutex.is_locked());

        let _again = mutex.acquire().unwrap();
        assert!(mutex.is_locked());
    }

    #[test]
    fn test_corrupt_permit_count() {
        let permits = AtomicU32::new(7);
        let mutex = ShmMutex::new(&permits);
        assert!(matches!(mutex.acquire(), Err(Error::Synchronization(_))));
    }

    #[test]
    fn test_sleeping_waiter_is_woken_on_release() {
        let permits = AtomicU32::new(TAKEN);
        let mutex = ShmMutex::new(&permits);
        mutex.init().unwrap();

        let guard = mutex.acquire().unwrap();
        thread::scope(|s| {
            let waiter = s.spawn(|| {
                let _guard = mutex.acquire().unwrap();
            });

            let deadline = Instant::now() + Duration::from_secs(5);
            while permits.load(Ordering::Relaxed) != CONTENDED {
                assert!(Instant::now() < deadline, "waiter never went to sleep");
                thread::sleep(Duration::from_millis(1));
            }
            drop(guard);
            waiter.join().unwrap();
        });
        assert_eq!(permits.load(Ordering::Relaxed), AVAILABLE);
    }

    #[test]
    fn test_early_waiter_enters_after_init() {
        let permits = AtomicU32::new(TAKEN);
        let mutex = ShmMutex::new(&permits);

        thread::scope(|s| {
            let waiter = s.spawn(|| {
                let _guard = mutex.acquire().unwrap();
            });
            let deadline = Instant::now() + Duration::from_secs(5);
            while permits.load(Ordering::Relaxed) != CONTENDED {
                assert!(Instant::now() < deadline, "waiter never went to sleep");
                thread::sleep(Duration::from_millis(1));
            }
            mutex.init().unwrap();
            waiter.join().unwrap();
        });
        assert!(!mutex.is_locked());
    }

    #[test]
    fn test_mutual_exclusion() {
        let permits = AtomicU32::new(TAKEN);
        let mutex = ShmMutex::new(&permits);
        mutex.init().unwrap();
        let counter = Counter(UnsafeCell::new(0));

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let counter = &counter;
                    for _ in 0..10_000 {
                        let _guard = mutex.acquire().unwrap();
                        unsafe { *counter.0.get() += 1 };
                    }
                });
            }
        });

        assert_eq!(unsafe { *counter.0.get() }, 80_000);
        assert!(!mutex.is_locked());
    }
}
