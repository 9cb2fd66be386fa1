//! The process table (spec §3's `PT`, §9's redesign flag applied).
//!
//! Spec §9: "a reimplementation should use an owning container keyed by
//! pid... for the process table" rather than the original's intrusive
//! list with raw back-pointers. `ProcessTable` is exactly that: a
//! `HashMap<pid, Arc<Process>>` behind `ptable_lock`, with PID allocation
//! under its own `pid_lock` as spec §5 requires them kept separate.

use std::collections::HashMap;
use std::sync::Arc;

use crate::proc::process::Process;
use crate::sync::spinlock::Spinlock;

pub struct ProcessTable {
    pid_lock: Spinlock<u32>,
    ptable_lock: Spinlock<HashMap<u32, Arc<Process>>>,
}

impl ProcessTable {
    pub fn new() -> Self {
        ProcessTable {
            pid_lock: Spinlock::new(0),
            ptable_lock: Spinlock::new(HashMap::new()),
        }
    }

    /// Hand out the next PID. Monotonic for the table's lifetime; never
    /// reused even after the process it named is reaped.
    pub fn alloc_pid(&self) -> u32 {
        let mut next = self.pid_lock.lock();
        *next += 1;
        *next
    }

    pub fn insert(&self, process: Arc<Process>) {
        self.ptable_lock.lock().insert(process.pid, process);
    }

    pub fn get(&self, pid: u32) -> Option<Arc<Process>> {
        self.ptable_lock.lock().get(&pid).cloned()
    }

    pub fn remove(&self, pid: u32) -> Option<Arc<Process>> {
        self.ptable_lock.lock().remove(&pid)
    }

    pub fn len(&self) -> usize {
        self.ptable_lock.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::fs::contract::InodeHandle;
    use crate::fs::fd_table::FdTable;
    use crate::vm::sim::SimAddressSpace;

    fn process(pid: u32) -> Arc<Process> {
        let cfg = KernelConfig::default();
        Arc::new(Process::new(
            pid,
            "p",
            32,
            None,
            Box::new(SimAddressSpace::new(&cfg)),
            InodeHandle(0),
            FdTable::new(&cfg),
        ))
    }

    #[test]
    fn pid_allocation_is_monotonic() {
        let table = ProcessTable::new();
        let a = table.alloc_pid();
        let b = table.alloc_pid();
        assert!(b > a);
    }

    #[test]
    fn insert_get_remove_round_trip() {
        let table = ProcessTable::new();
        let p = process(7);
        table.insert(Arc::clone(&p));
        assert!(table.get(7).is_some());
        let removed = table.remove(7).unwrap();
        assert_eq!(removed.pid, 7);
        assert!(table.get(7).is_none());
    }
}
