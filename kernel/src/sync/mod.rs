//! Synchronization primitives for the process/IPC core.
//!
//! Provides a busy-wait [`spinlock::Spinlock`] for short critical sections,
//! and a blocking [`waitqueue::WaitQueue`] for everything that needs to put
//! an OS thread to sleep until some other thread makes progress (pipe I/O,
//! `proc_wait`).

pub mod spinlock;
pub mod waitqueue;
