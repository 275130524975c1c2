//! Single-writer spin lock serializing resize and close.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::utils::backoff;

#[derive(Debug, Default)]
pub struct ResizeLock {
    locked: AtomicBool,
}

impl ResizeLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock if it is free.
    pub fn try_lock(&self) -> Option<ResizeGuard<'_>> {
        self.locked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| ResizeGuard { lock: self })
    }

    /// Spins until the current holder (if any) releases the lock.
    ///
    /// Does not acquire it; callers retry their whole operation afterwards.
    pub fn wait_unlocked(&self) {
        let mut spins = 0u32;
        while self.is_locked() {
            backoff(&mut spins);
        }
    }

    /// Spins until the lock is acquired.
    pub fn lock(&self) -> ResizeGuard<'_> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            self.wait_unlocked();
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }
}

/// Holds the [`ResizeLock`]; releases it on drop, on every exit path.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ResizeGuard<'a> {
    lock: &'a ResizeLock,
}

impl Drop for ResizeGuard<'_> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    use test_log::test;

    use super::*;

    #[test]
    fn test_try_lock() {
        let lock = ResizeLock::new();
        let guard = lock.try_lock();
        assert!(guard.is_some());
        assert!(lock.is_locked());
        assert!(lock.try_lock().is_none());
        drop(guard);
        assert!(!lock.is_locked());
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn test_released_on_error_path() {
        fn fails(lock: &ResizeLock) -> Result<(), ()> {
            let _guard = lock.lock();
            Err(())
        }

        let lock = ResizeLock::new();
        assert!(fails(&lock).is_err());
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_mutual_exclusion() {
        let lock = ResizeLock::new();
        let inside = AtomicUsize::new(0);
        let max_inside = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        let _guard = lock.lock();
                        let n = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(n, Ordering::SeqCst);
                        thread::sleep(Duration::from_micros(10));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(!lock.is_locked());
    }
}
