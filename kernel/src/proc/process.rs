//! The process data model (spec §3).
//!
//! Grounded on `kernel/src/task/process.rs` (`pid`, `parent_pid`, a bounded
//! `name`, a monotonic PID counter) for the struct's shape, generalized with
//! the fields spec §3 adds that the teacher's `Process` has no counterpart
//! for: an owning `AddressSpace`, a cwd inode, a child list, and a wait
//! condition variable.
//!
//! Spec §9's redesign flag — "intrusive lists → owned collections... an
//! arena with index handles for the process table" — is applied here beyond
//! just the process table itself: a parent's child list is `Vec<u32>` (child
//! pids), not a list of nodes carrying a raw pointer into the child's exit
//! status. The exit status itself lives on the *child*, in its own
//! `exit_status` field, looked up by pid through `proc::table::ProcessTable`
//! when a parent waits. This sidesteps the exact hazard spec §9 calls out
//! ("no dangling write from a child to a freed entry"): there is no pointer
//! from a child into a parent's memory to dangle in the first place, and it
//! also breaks what would otherwise be a lock-ordering inversion between an
//! exiting parent re-parenting a live child and that same child exiting
//! concurrently and trying to report its status to the parent it still
//! thinks it has.

use std::sync::{Mutex, MutexGuard};

use crate::fs::contract::InodeHandle;
use crate::fs::fd_table::FdTable;
use crate::sync::waitqueue::WaitQueue;
use crate::vm::contract::AddressSpace;

/// A child's exit status, or `Alive` if it hasn't exited yet. Resolves spec
/// §9's `STATUS_ALIVE` sentinel to a tagged enum, per the design note's own
/// stated preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    Alive,
    Exited(i32),
}

/// A process: a uniquely identified execution context (spec §3).
pub struct Process {
    pub pid: u32,
    pub name: String,
    parent_pid: Mutex<Option<u32>>,
    address_space: Mutex<Box<dyn AddressSpace>>,
    cwd: Mutex<InodeHandle>,
    pub fd_table: Mutex<FdTable>,
    /// Pids of live or not-yet-reaped children. Spec §3's `ChildEntry` list,
    /// collapsed to bare pids — see the module doc comment.
    children: Mutex<Vec<u32>>,
    /// Broadcast by `proc_exit` (spec §4.E step 5), waited on by `proc_wait`.
    pub wait_cv: WaitQueue,
    exit_status: Mutex<ChildStatus>,
    /// Start address of the zero-size heap region `proc::elf::load` creates
    /// just past the highest `PT_LOAD` segment. `sbrk` extends from here.
    heap_start: std::sync::atomic::AtomicU32,
    /// Thread ids backing this process. The data model permits a set (spec
    /// §3) though this crate's Non-goals exclude multithreaded processes, so
    /// it only ever holds the one thread `proc_spawn`/`proc_fork` created.
    thread_ids: Mutex<Vec<std::thread::ThreadId>>,
}

impl Process {
    pub fn new(
        pid: u32,
        name: &str,
        name_cap: usize,
        parent_pid: Option<u32>,
        address_space: Box<dyn AddressSpace>,
        cwd: InodeHandle,
        fd_table: FdTable,
    ) -> Process {
        let truncated: String = name.chars().take(name_cap.saturating_sub(1)).collect();
        Process {
            pid,
            name: truncated,
            parent_pid: Mutex::new(parent_pid),
            address_space: Mutex::new(address_space),
            cwd: Mutex::new(cwd),
            fd_table: Mutex::new(fd_table),
            children: Mutex::new(Vec::new()),
            wait_cv: WaitQueue::new(),
            exit_status: Mutex::new(ChildStatus::Alive),
            thread_ids: Mutex::new(Vec::new()),
            heap_start: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn heap_start(&self) -> u32 {
        self.heap_start.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn set_heap_start(&self, addr: u32) {
        self.heap_start.store(addr, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn parent_pid(&self) -> Option<u32> {
        *self.parent_pid.lock().unwrap()
    }

    pub fn set_parent_pid(&self, pid: Option<u32>) {
        *self.parent_pid.lock().unwrap() = pid;
    }

    pub fn address_space(&self) -> MutexGuard<'_, Box<dyn AddressSpace>> {
        self.address_space.lock().unwrap()
    }

    pub fn cwd(&self) -> InodeHandle {
        *self.cwd.lock().unwrap()
    }

    pub fn set_cwd(&self, handle: InodeHandle) {
        *self.cwd.lock().unwrap() = handle;
    }

    pub fn exit_status(&self) -> ChildStatus {
        *self.exit_status.lock().unwrap()
    }

    fn set_exit_status(&self, status: ChildStatus) {
        *self.exit_status.lock().unwrap() = status;
    }

    pub fn record_thread(&self, tid: std::thread::ThreadId) {
        self.thread_ids.lock().unwrap().push(tid);
    }

    pub fn add_child(&self, child_pid: u32) {
        self.children.lock().unwrap().push(child_pid);
    }

    pub fn children(&self) -> MutexGuard<'_, Vec<u32>> {
        self.children.lock().unwrap()
    }

    /// Mark this process as exited. Internal to `proc::lifecycle::proc_exit`.
    pub(super) fn mark_exited(&self, status: i32) {
        self.set_exit_status(ChildStatus::Exited(status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::vm::sim::SimAddressSpace;

    fn process(pid: u32) -> Process {
        let cfg = KernelConfig::default();
        Process::new(
            pid,
            "this-name-is-definitely-longer-than-the-cap",
            32,
            None,
            Box::new(SimAddressSpace::new(&cfg)),
            InodeHandle(0),
            FdTable::new(&cfg),
        )
    }

    #[test]
    fn name_is_truncated_to_cap() {
        let p = process(1);
        assert!(p.name.len() < 32);
    }

    #[test]
    fn exit_status_starts_alive() {
        let p = process(1);
        assert_eq!(p.exit_status(), ChildStatus::Alive);
        p.mark_exited(7);
        assert_eq!(p.exit_status(), ChildStatus::Exited(7));
    }

    #[test]
    fn children_list_round_trips() {
        let p = process(1);
        p.add_child(2);
        p.add_child(3);
        assert_eq!(*p.children(), vec![2, 3]);
    }
}
