//! A busy-wait mutual-exclusion lock for short, non-blocking critical
//! sections (`ptable_lock`, `pid_lock`, a pipe's own state lock).
//!
//! Ported from the teacher's IRQ-safe spinlock: same CAS-loop-with-backoff
//! acquire path and owner tracking, minus the `cli`/`sti` interrupt-disable
//! pair and the direct-UART deadlock reporter, both of which only make
//! sense wired into a real `hal` module — an externalized collaborator for
//! this subsystem (see DESIGN.md). Holding one of these across a blocking
//! call (a `WaitQueue` wait, or anything that can itself contend on this
//! same lock) is a bug; use `sync::waitqueue::WaitQueue` for anything that
//! needs to block.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

const NO_OWNER: u64 = u64::MAX;

/// Hands out a small unique tag per OS thread for the owner-tracking field
/// below. `std::thread::ThreadId` has no portable integer representation on
/// stable Rust, so this is a thread-local counter instead.
fn thread_tag() -> u64 {
    thread_local! {
        static TAG: u64 = NEXT_TAG.fetch_add(1, Ordering::Relaxed);
    }
    static NEXT_TAG: AtomicU64 = AtomicU64::new(0);
    TAG.with(|t| *t)
}

/// A spinlock protecting data of type `T`.
pub struct Spinlock<T> {
    lock: AtomicBool,
    owner: AtomicU64,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for Spinlock<T> {}
unsafe impl<T: Send> Send for Spinlock<T> {}

/// RAII guard for a held [`Spinlock`]. Releases on drop.
pub struct SpinlockGuard<'a, T> {
    lock: &'a Spinlock<T>,
}

impl<T> Spinlock<T> {
    pub const fn new(data: T) -> Self {
        Spinlock {
            lock: AtomicBool::new(false),
            owner: AtomicU64::new(NO_OWNER),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquire the lock, spinning with exponential backoff until it is free.
    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        let mut backoff: u32 = 1;
        while self
            .lock
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.lock.load(Ordering::Relaxed) {
                for _ in 0..backoff {
                    core::hint::spin_loop();
                }
                if backoff < 64 {
                    backoff <<= 1;
                }
            }
        }
        self.owner.store(thread_tag(), Ordering::Relaxed);
        SpinlockGuard { lock: self }
    }

    /// Try to acquire the lock without blocking.
    pub fn try_lock(&self) -> Option<SpinlockGuard<'_, T>> {
        if self
            .lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.owner.store(thread_tag(), Ordering::Relaxed);
            Some(SpinlockGuard { lock: self })
        } else {
            None
        }
    }

    /// Whether this lock is currently held by anyone.
    pub fn is_locked(&self) -> bool {
        self.lock.load(Ordering::Relaxed)
    }
}

impl<'a, T> Deref for SpinlockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for SpinlockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for SpinlockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.owner.store(NO_OWNER, Ordering::Relaxed);
        self.lock.lock.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn mutual_exclusion_under_contention() {
        let counter = Arc::new(Spinlock::new(0u64));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = counter.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..10_000 {
                    *c.lock() += 1;
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*counter.lock(), 80_000);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let lock = Spinlock::new(5);
        let guard = lock.lock();
        assert!(lock.try_lock().is_none());
        drop(guard);
        assert!(lock.try_lock().is_some());
    }
}
