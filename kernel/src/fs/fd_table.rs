//! Per-process file descriptor table (spec §4.A).
//!
//! Grounded on the teacher's `[FdEntry; MAX_FDS]` table: lowest-fd-first
//! allocation, an `alloc_at` for `dup2`, and a bulk close for exit. The
//! teacher's `FdKind` enum pointing into separate global VFS/pipe tables is
//! replaced by a slot that directly holds an `Arc<File>` — this crate's
//! `File` already unifies console/pipe/filesystem backing, so there's no
//! second table to index into.

use std::sync::Arc;

use crate::config::KernelConfig;
use crate::error::{KResult, KernelError};
use crate::fs::file::File;

/// A process's file descriptor table. Capacity is fixed at construction
/// time from `KernelConfig::max_files` (spec: `PROC_MAX_FILE`).
#[derive(Clone)]
pub struct FdTable {
    entries: Vec<Option<Arc<File>>>,
    count: usize,
    /// Lowest fd that *might* be free. Never authoritative — `alloc` always
    /// rechecks from here forward and only advances the hint when an
    /// allocation actually lands on it, so a `remove` at a lower fd is
    /// picked up on the next `alloc` without a full rescan from 0 every
    /// time (spec §4.A).
    first_avail: usize,
}

impl FdTable {
    pub fn new(cfg: &KernelConfig) -> Self {
        FdTable {
            entries: vec![None; cfg.max_files],
            count: 0,
            first_avail: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    fn in_range(&self, fd: i32) -> bool {
        fd >= 0 && (fd as usize) < self.entries.len()
    }

    /// True if `fd` is in range and currently open.
    pub fn validate(&self, fd: i32) -> bool {
        self.in_range(fd) && self.entries[fd as usize].is_some()
    }

    /// Allocate the lowest available fd for `file`. Returns the fd.
    pub fn alloc(&mut self, file: Arc<File>) -> KResult<i32> {
        for i in self.first_avail..self.entries.len() {
            if self.entries[i].is_none() {
                self.entries[i] = Some(file);
                self.count += 1;
                self.first_avail = i + 1;
                return Ok(i as i32);
            }
        }
        Err(KernelError::NoMem)
    }

    /// Place `file` at exactly `fd`, regardless of the lowest-available
    /// hint. Used by `dup2` and by `proc_init` seeding fd 0/1. If `fd` was
    /// already open, the previous handle is dropped (and, if it was the
    /// last reference, closed) here.
    pub fn alloc_at(&mut self, fd: i32, file: Arc<File>) -> KResult<()> {
        if !self.in_range(fd) {
            return Err(KernelError::Inval);
        }
        let slot = &mut self.entries[fd as usize];
        if slot.is_none() {
            self.count += 1;
        }
        *slot = Some(file);
        Ok(())
    }

    /// Remove and return the handle at `fd`, if any, lowering `first_avail`
    /// to `fd` when that frees an earlier slot.
    pub fn remove(&mut self, fd: i32) -> KResult<Arc<File>> {
        if !self.validate(fd) {
            return Err(KernelError::Inval);
        }
        let file = self.entries[fd as usize].take().unwrap();
        self.count -= 1;
        if (fd as usize) < self.first_avail {
            self.first_avail = fd as usize;
        }
        Ok(file)
    }

    /// Clone the `Arc<File>` at `fd` (a new reference to the same handle).
    pub fn get(&self, fd: i32) -> KResult<Arc<File>> {
        if !self.validate(fd) {
            return Err(KernelError::Inval);
        }
        Ok(Arc::clone(self.entries[fd as usize].as_ref().unwrap()))
    }

    /// `dup2`: make `new_fd` refer to the same handle as `old_fd`. If
    /// `new_fd == old_fd`, this is a no-op that still validates `old_fd`.
    pub fn dup2(&mut self, old_fd: i32, new_fd: i32) -> KResult<i32> {
        if !self.validate(old_fd) || !self.in_range(new_fd) {
            return Err(KernelError::Inval);
        }
        if old_fd == new_fd {
            return Ok(new_fd);
        }
        let file = Arc::clone(self.entries[old_fd as usize].as_ref().unwrap());
        self.alloc_at(new_fd, file)?;
        Ok(new_fd)
    }

    /// Close every open fd, lowest first (spec §2's deterministic
    /// close-on-exit ordering), returning the handles in closed order so
    /// the caller can drop them and observe any side effects (e.g. a pipe
    /// waking its other end) in a reproducible sequence.
    pub fn close_all(&mut self) -> Vec<Arc<File>> {
        let mut closed = Vec::with_capacity(self.count);
        for i in 0..self.entries.len() {
            if let Some(file) = self.entries[i].take() {
                closed.push(file);
            }
        }
        self.count = 0;
        self.first_avail = 0;
        closed
    }

    /// Iterate over `(fd, file)` for every open slot, in fd order. Used by
    /// `proc_fork` to clone the parent's open files into the child.
    pub fn iter_open(&self) -> impl Iterator<Item = (i32, &Arc<File>)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|f| (i as i32, f)))
    }
}
