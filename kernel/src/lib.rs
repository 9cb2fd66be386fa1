//! Process lifecycle, per-process file descriptor tables, anonymous pipes,
//! and demand-paged/copy-on-write memory for a teaching-style kernel.
//!
//! This crate is the process-and-IPC core of a small teaching OS kernel:
//! it creates, clones, runs, and reaps user processes (`proc`); manages
//! their per-process file descriptor tables (`fs::fd_table`) over a
//! unified, refcounted file handle (`fs::file`); serves demand-paged and
//! copy-on-write memory on page fault (`vm::pgfault`); and provides
//! anonymous byte-stream pipes between processes (`ipc::pipe`).
//!
//! The filesystem, the physical/virtual memory primitives, and the thread
//! scheduler are external collaborators (see `SPEC_FULL.md` §0): this
//! crate defines their contracts as traits (`fs::contract::Filesystem`,
//! `vm::contract::{PhysicalMemory, AddressSpace}`) and ships one
//! self-contained reference backend for each (`fs::testfs::MemFs`,
//! `vm::sim`), so the crate builds and its test suite runs without a real
//! kernel underneath it. Every process is backed by a real `std::thread`;
//! blocking points (`proc_wait`, pipe read/write) use `sync::waitqueue`, a
//! condition variable wrapping `std::sync::{Mutex, Condvar}`.
//!
//! `proc::lifecycle::Kernel` is the crate's entry point: construct one
//! over a `PhysicalMemory`, an `AddressSpaceFactory`, and a `Filesystem`,
//! call `boot_init` once to create the init process, then drive
//! `fork`/`spawn`/`wait`/`exit` through the returned `ProcessHandle` (or,
//! for user-facing syscalls, through `syscall::facade`).

pub mod config;
pub mod error;
pub mod fs;
pub mod ipc;
pub mod proc;
pub mod sync;
pub mod syscall;
pub mod vm;

pub use error::{KResult, KernelError};
