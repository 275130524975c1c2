//! Lock-free tracking of operations in flight.
//!
//! Operations register on one of two counter pairs (`started`, `completed`),
//! selected by the low bit of a generation number. A waiter flips the
//! generation and then waits for the pair it just retired to balance: from
//! then on new operations register on the other pair, so the retired one
//! only ever drains. Once it balances, no operation that began before the
//! flip is still running, however many later operations started and
//! finished in the meantime. All counters wrap around freely; comparisons
//! use wrapping arithmetic.
//!
//! Every access path brackets itself with [`Quiescence::begin`], which
//! returns an [`OperationGuard`] that marks the operation complete when
//! dropped (including on early returns and panics).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use log::trace;

use crate::utils::backoff;

#[derive(Debug, Default)]
struct Counters {
    started: AtomicU64,
    completed: AtomicU64,
}

impl Counters {
    fn in_flight(&self) -> u64 {
        // `completed` is read first: a zero result then means every operation
        // registered here before the first load has completed.
        let completed = self.completed.load(Ordering::SeqCst);
        let started = self.started.load(Ordering::SeqCst);
        started.wrapping_sub(completed)
    }
}

#[derive(Debug, Default)]
pub struct Quiescence {
    generation: AtomicU64,
    counters: [Counters; 2],
}

impl Quiescence {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn with_counters(started: u64, completed: u64) -> Self {
        let q = Self::default();
        q.counters[0].started.store(started, Ordering::SeqCst);
        q.counters[0].completed.store(completed, Ordering::SeqCst);
        q
    }

    fn pair(&self, generation: u64) -> &Counters {
        &self.counters[(generation & 1) as usize]
    }

    /// Marks the start of an operation.
    ///
    /// The registration is sequentially consistent, so anything the caller
    /// loads afterwards is ordered after it.
    #[inline]
    pub fn begin(&self) -> OperationGuard<'_> {
        loop {
            let generation = self.generation.load(Ordering::SeqCst);
            let counters = self.pair(generation);
            counters.started.fetch_add(1, Ordering::SeqCst);
            if self.generation.load(Ordering::SeqCst) == generation {
                return OperationGuard { counters };
            }
            // Registered on a pair that was retired in between.
            counters.completed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Number of operations started but not yet completed.
    pub fn in_flight(&self) -> u64 {
        self.counters[0].in_flight().wrapping_add(self.counters[1].in_flight())
    }

    /// Blocks until every operation that started before this call completes.
    ///
    /// Operations started during the call are not waited for. Waits must not
    /// run concurrently with each other.
    pub fn wait(&self) {
        self.wait_until(None);
    }

    /// Like [`wait`][Self::wait], but gives up after `timeout`.
    ///
    /// Returns `true` if all operations started before the call completed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.wait_until(Some(Instant::now() + timeout))
    }

    fn wait_until(&self, deadline: Option<Instant>) -> bool {
        let generation = self.generation.load(Ordering::SeqCst);
        trace!("quiescence: waiting for {} operations", self.in_flight());

        // The idle pair may still hold operations a timed-out wait gave up on.
        if !drain(self.pair(generation.wrapping_add(1)), deadline) {
            return false;
        }
        self.generation.store(generation.wrapping_add(1), Ordering::SeqCst);
        if !drain(self.pair(generation), deadline) {
            return false;
        }

        trace!("quiescence: done waiting");
        true
    }
}

fn drain(counters: &Counters, deadline: Option<Instant>) -> bool {
    let mut spins = 0;
    while counters.in_flight() != 0 {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return false;
        }
        backoff(&mut spins);
    }
    true
}

/// Scoped marker of one operation in flight. Completes it on drop.
#[must_use = "the operation completes as soon as the guard is dropped"]
pub struct OperationGuard<'a> {
    counters: &'a Counters,
}

impl Drop for OperationGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.counters.completed.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Barrier;
    use std::thread;

    use test_log::test;

    use super::*;

    #[test]
    fn test_idle_wait_returns() {
        let q = Quiescence::new();
        q.wait();
        assert!(q.wait_timeout(Duration::from_millis(1)));
        assert_eq!(q.in_flight(), 0);
    }

    #[test]
    fn test_guard_counts() {
        let q = Quiescence::new();
        let a = q.begin();
        let b = q.begin();
        assert_eq!(q.in_flight(), 2);
        drop(a);
        assert_eq!(q.in_flight(), 1);
        drop(b);
        assert_eq!(q.in_flight(), 0);
    }

    #[test]
    fn test_wait_times_out_while_in_flight() {
        let q = Quiescence::new();
        let _guard = q.begin();
        assert!(!q.wait_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn test_operations_across_generations() {
        let q = Quiescence::new();
        let early = q.begin();
        assert!(!q.wait_timeout(Duration::from_millis(5)));

        // Registers on the new generation and finishes first.
        let late = q.begin();
        assert_eq!(q.in_flight(), 2);
        drop(late);
        assert_eq!(q.in_flight(), 1);

        // The early operation still pins the retired generation.
        assert!(!q.wait_timeout(Duration::from_millis(5)));
        drop(early);
        assert!(q.wait_timeout(Duration::from_millis(5)));
        assert_eq!(q.in_flight(), 0);
    }

    #[test]
    fn test_wraparound() {
        let q = Quiescence::with_counters(u64::MAX - 1, u64::MAX - 1);
        let a = q.begin();
        let b = q.begin();
        let c = q.begin();
        // `started` wrapped past zero, `completed` did not.
        assert_eq!(q.in_flight(), 3);
        assert!(!q.wait_timeout(Duration::from_millis(5)));
        drop(a);
        drop(b);
        assert!(!q.wait_timeout(Duration::from_millis(5)));
        drop(c);
        assert!(q.wait_timeout(Duration::from_millis(5)));
        assert_eq!(q.in_flight(), 0);
    }

    #[test]
    fn test_wait_blocks_until_all_complete() {
        const N: usize = 4;

        let q = Quiescence::new();
        let barrier = Barrier::new(N + 1);
        let finished = AtomicBool::new(false);

        thread::scope(|s| {
            for _ in 0..N {
                s.spawn(|| {
                    let _guard = q.begin();
                    barrier.wait();
                    thread::sleep(Duration::from_millis(50));
                    finished.store(true, Ordering::SeqCst);
                });
            }

            barrier.wait();
            assert_eq!(q.in_flight(), N as u64);
            q.wait();
            assert!(finished.load(Ordering::SeqCst));
            assert_eq!(q.in_flight(), 0);
        });
    }

    #[test]
    fn test_wait_not_released_by_later_operations() {
        let q = Quiescence::new();
        let barrier = Barrier::new(2);
        let early_finished = AtomicBool::new(false);
        let stop = AtomicBool::new(false);

        thread::scope(|s| {
            s.spawn(|| {
                let _guard = q.begin();
                barrier.wait();
                thread::sleep(Duration::from_millis(200));
                early_finished.store(true, Ordering::SeqCst);
            });
            s.spawn(|| {
                while !stop.load(Ordering::SeqCst) {
                    drop(q.begin());
                }
            });

            barrier.wait();
            thread::sleep(Duration::from_millis(20));
            q.wait();
            let finished = early_finished.load(Ordering::SeqCst);
            stop.store(true, Ordering::SeqCst);
            assert!(finished, "wait returned while an earlier operation was running");
        });
    }
}
