//! A condition variable used to block and wake OS threads.
//!
//! The teacher kernel parks a thread by setting `ThreadState::Blocked`
//! inside its own cooperative scheduler (`task/scheduler/wait.rs`) and
//! resumes it on the next reschedule; the scheduler itself is an
//! externalized collaborator for this subsystem (spec §6). Since every
//! process in this crate maps to a real OS thread, `std::sync::Condvar` is
//! the idiomatic stand-in: `wait()` takes the caller's own `MutexGuard` and
//! atomically releases it for the duration of the sleep, exactly as
//! `Condvar` already guarantees — there is no separate bookkeeping lock to
//! race against the waker, so a `wake_all` can never land in the gap
//! between a caller checking its condition and going to sleep. Wakers
//! always `notify_all` (never `notify_one`) to match the teacher's
//! broadcast discipline in `anon_pipe.rs` and `wait.rs` — a `notify_one`
//! could wake a thread whose condition still doesn't hold while leaving
//! one that would behind.

use std::sync::{Condvar, MutexGuard};
use std::time::Duration;

/// A condition variable shared by every waiter/waker pair on some piece of
/// state the caller protects with its own `std::sync::Mutex`. `WaitQueue`
/// holds no state of its own beyond the `Condvar` — the caller's mutex
/// *is* the lock the wait is gated on (see `ipc::pipe::PipeState` and
/// `proc::lifecycle::Kernel::exit_lock` for the pattern).
pub struct WaitQueue {
    cv: Condvar,
}

impl WaitQueue {
    pub fn new() -> Self {
        WaitQueue { cv: Condvar::new() }
    }

    /// Atomically release `guard`'s mutex and block until woken, then
    /// reacquire it and hand back a fresh guard over the same mutex.
    /// Callers recheck their condition in a loop, spurious-wakeup safe:
    /// `while !condition(&guard) { guard = wq.wait(guard); }`.
    ///
    /// Bounded by a timeout so a missed wakeup (which would be a bug
    /// elsewhere) shows up as a slow test instead of a hang.
    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        self.cv.wait_timeout(guard, Duration::from_secs(5)).unwrap().0
    }

    /// Wake every thread blocked in `wait`.
    pub fn wake_all(&self) {
        self.cv.notify_all();
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wake_all_releases_every_waiter() {
        let wq = Arc::new(WaitQueue::new());
        let ready = Arc::new(Mutex::new(false));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let wq = wq.clone();
            let ready = ready.clone();
            handles.push(thread::spawn(move || {
                let mut guard = ready.lock().unwrap();
                while !*guard {
                    guard = wq.wait(guard);
                }
            }));
        }
        thread::sleep(Duration::from_millis(50));
        *ready.lock().unwrap() = true;
        wq.wake_all();
        for h in handles {
            h.join().unwrap();
        }
    }
}
