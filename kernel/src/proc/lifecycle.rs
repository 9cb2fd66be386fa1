//! Component E: process lifecycle (spec §4.E).
//!
//! Grounded on `task/process.rs` for the allocate-then-link shape and on
//! `task/scheduler/wait.rs`'s block-then-recheck-in-a-loop pattern for
//! `wait`. Two adaptations follow directly from §0's deployment shape
//! (every process is a real `std::thread`, not a scheduler-managed trap
//! frame):
//!
//! - `fork`/`spawn` take the *child's* body as a Rust closure rather than
//!   resuming a saved trap frame at the instruction after the syscall —
//!   there is no saved instruction pointer to resume here, since nothing
//!   in this crate ever executes raw machine code. The closure plays the
//!   role spec §4.E's "schedule the new/child thread" step plays: it's
//!   the code that runs once the new process's address space and FD table
//!   exist. `fork`'s closure return value becomes the argument to its own
//!   implicit `exit`, exactly as a real child's `main` returning would.
//! - The "current process" that `fork`/`wait`/`exit` implicitly operate
//!   on is tracked per OS thread via `CURRENT_PID`, standing in for
//!   `thread_current()->proc` (an externalized collaborator, spec §6).
//!
//! Re-parenting (spec §9's resolved design note) always targets whichever
//! process this `Kernel` first spawned with no parent of its own.

use std::cell::Cell;
use std::sync::{Arc, Mutex};

use crate::config::{KernelConfig, ANY_CHILD};
use crate::error::{KResult, KernelError};
use crate::fs::contract::Filesystem;
use crate::fs::fd_table::FdTable;
use crate::fs::file::{ConsoleOps, File, O_RDONLY, O_WRONLY};
use crate::proc::elf;
use crate::proc::process::{ChildStatus, Process};
use crate::proc::stack;
use crate::proc::table::ProcessTable;
use crate::sync::spinlock::Spinlock;
use crate::sync::waitqueue::WaitQueue;
use crate::vm::contract::{AddressSpace, AddressSpaceFactory, PhysicalMemory};
use crate::vm::pgfault::FaultCounter;

thread_local! {
    static CURRENT_PID: Cell<u32> = Cell::new(0);
}

fn set_current_pid(pid: u32) {
    CURRENT_PID.with(|c| c.set(pid));
}

/// The pid of the process running on the calling OS thread, or `0` if none
/// has been established (the thread that first constructs a `Kernel` and
/// calls `boot_init`, before doing so).
pub fn current_pid() -> u32 {
    CURRENT_PID.with(|c| c.get())
}

/// The shared kernel context: the process table plus every externalized
/// collaborator (spec §6) `proc::lifecycle` drives. Owns no process
/// directly — `ProcessTable` does — but is the handle every `ProcessHandle`
/// carries back into it.
pub struct Kernel {
    pub cfg: KernelConfig,
    pub pmem: Arc<dyn PhysicalMemory>,
    pub fs: Arc<dyn Filesystem>,
    as_factory: Arc<dyn AddressSpaceFactory>,
    table: ProcessTable,
    init_pid: Spinlock<Option<u32>>,
    /// Guards a child's write of its own exit status against a parent's
    /// read of it (spec §5). Paired with `exit_cv`: `WaitQueue::wait` takes
    /// this guard directly, so a `wake_all` landing between a waiter's
    /// condition check and its sleep is impossible — the mutex is never
    /// unlocked in between.
    exit_lock: Mutex<()>,
    exit_cv: WaitQueue,
    pub fault_counter: FaultCounter,
}

/// A live process's handle onto its `Kernel`, held by the OS thread
/// running that process's body. The analogue of `thread_current()->proc`.
#[derive(Clone)]
pub struct ProcessHandle {
    kernel: Arc<Kernel>,
    pid: u32,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    pub fn process(&self) -> Arc<Process> {
        self.kernel
            .table
            .get(self.pid)
            .expect("current process missing from its own process table")
    }

    /// `proc_fork`: see `Kernel::fork`.
    pub fn fork(
        &self,
        child_body: impl FnOnce(&ProcessHandle) -> i32 + Send + 'static,
    ) -> KResult<u32> {
        self.kernel.fork(self, child_body)
    }

    /// `proc_spawn`: see `Kernel::spawn`.
    pub fn spawn(
        &self,
        name: &str,
        path: &str,
        argv: &[String],
        body: impl FnOnce(&ProcessHandle) -> i32 + Send + 'static,
    ) -> KResult<u32> {
        self.kernel.spawn(self, name, path, argv, body)
    }

    /// `proc_wait`: see `Kernel::wait`.
    pub fn wait(&self, target: i32) -> KResult<(u32, i32)> {
        self.kernel.wait(self.pid, target)
    }

    pub fn getppid(&self) -> u32 {
        self.process().parent_pid().unwrap_or(self.pid)
    }
}

impl Kernel {
    pub fn new(
        cfg: KernelConfig,
        pmem: Arc<dyn PhysicalMemory>,
        as_factory: Arc<dyn AddressSpaceFactory>,
        fs: Arc<dyn Filesystem>,
    ) -> Arc<Kernel> {
        Arc::new(Kernel {
            cfg,
            pmem,
            fs,
            as_factory,
            table: ProcessTable::new(),
            init_pid: Spinlock::new(None),
            exit_lock: Mutex::new(()),
            exit_cv: WaitQueue::new(),
            fault_counter: FaultCounter::new(),
        })
    }

    pub fn process_table(&self) -> &ProcessTable {
        &self.table
    }

    fn init_pid(&self) -> Option<u32> {
        *self.init_pid.lock()
    }

    /// `proc_init(name)`: allocate a bare process with a fresh address
    /// space, seeded FD table (console at 0/1), and root cwd, running on
    /// the *calling* OS thread rather than a spawned one. The first call
    /// against a given `Kernel` establishes the re-parenting target (spec
    /// §4.E's `init_proc`, "spawned once at boot").
    pub fn boot_init(self: &Arc<Self>, name: &str) -> KResult<ProcessHandle> {
        let as_ = self.as_factory.as_init();
        let process = self.allocate(name, None, as_)?;
        let pid = process.pid;
        {
            let mut init_pid = self.init_pid.lock();
            if init_pid.is_none() {
                *init_pid = Some(pid);
            }
        }
        set_current_pid(pid);
        Ok(ProcessHandle {
            kernel: Arc::clone(self),
            pid,
        })
    }

    fn allocate(
        &self,
        name: &str,
        parent_pid: Option<u32>,
        address_space: Box<dyn AddressSpace>,
    ) -> KResult<Arc<Process>> {
        let pid = self.table.alloc_pid();
        let cwd = self.fs.root_inode();
        let mut fd_table = FdTable::new(&self.cfg);
        fd_table.alloc_at(0, File::new(O_RDONLY, None, ConsoleOps::stdio()))?;
        fd_table.alloc_at(1, File::new(O_WRONLY, None, ConsoleOps::stdio()))?;

        let process = Arc::new(Process::new(
            pid,
            name,
            self.cfg.proc_name_len,
            parent_pid,
            address_space,
            cwd,
            fd_table,
        ));
        self.table.insert(Arc::clone(&process));
        if let Some(ppid) = parent_pid {
            if let Some(parent) = self.table.get(ppid) {
                parent.add_child(pid);
            }
        }
        log::debug!("proc_init: pid={} parent={:?}", pid, parent_pid);
        Ok(process)
    }

    fn unwind_allocation(&self, pid: u32, parent_pid: u32) {
        self.table.remove(pid);
        if let Some(parent) = self.table.get(parent_pid) {
            parent.children().retain(|&p| p != pid);
        }
    }

    /// `proc_spawn(name, argv, &out)`: init a child, load `path`'s ELF
    /// image into its address space, lay out its stack, then run `body` on
    /// a freshly spawned OS thread standing in for "schedule the new
    /// thread". Returns the child's pid. On any failure before the thread
    /// starts, unwinds the partial allocation (spec §7).
    pub fn spawn(
        self: &Arc<Self>,
        parent: &ProcessHandle,
        name: &str,
        path: &str,
        argv: &[String],
        body: impl FnOnce(&ProcessHandle) -> i32 + Send + 'static,
    ) -> KResult<u32> {
        let as_ = self.as_factory.as_init();
        let process = self.allocate(name, Some(parent.pid), as_)?;
        let pid = process.pid;

        let loaded: KResult<(u32, u32)> = (|| {
            let mut as_guard = process.address_space();
            let (entry, heap_start) = elf::load(&mut **as_guard, &*self.pmem, &*self.fs, &self.cfg, path)?;
            stack::setup(&mut **as_guard, &*self.pmem, &self.cfg, argv)?;
            Ok((entry, heap_start))
        })();

        let (entry, heap_start) = match loaded {
            Ok(v) => v,
            Err(e) => {
                self.unwind_allocation(pid, parent.pid);
                return Err(e);
            }
        };
        process.set_heap_start(heap_start);
        log::debug!("proc_spawn: pid={} path={} entry={:#x}", pid, path, entry);

        let kernel = Arc::clone(self);
        std::thread::Builder::new()
            .name(format!("proc-{pid}"))
            .spawn(move || {
                set_current_pid(pid);
                let handle = ProcessHandle {
                    kernel: Arc::clone(&kernel),
                    pid,
                };
                let status = body(&handle);
                kernel.exit(pid, status);
            })
            .map_err(|_| KernelError::NoRes)?;
        Ok(pid)
    }

    /// `proc_fork()`: clone `parent`'s address space via `as_copy_as`
    /// (marking shared pages read-only and bumping frame refcounts, so the
    /// page-fault handler's COW path does the rest), inherit every fd
    /// except the process-scoped stdin/stdout singletons, then run
    /// `child_body` on a new OS thread standing in for the forked thread —
    /// its return value becomes the argument to the child's own `exit`.
    /// Returns the child's pid to the caller, mirroring the parent always
    /// seeing the non-zero return from a real `fork()`.
    pub fn fork(
        self: &Arc<Self>,
        parent: &ProcessHandle,
        child_body: impl FnOnce(&ProcessHandle) -> i32 + Send + 'static,
    ) -> KResult<u32> {
        let parent_proc = self.table.get(parent.pid).ok_or(KernelError::Child)?;
        let name = parent_proc.name.clone();

        let child_as = {
            let mut as_guard = parent_proc.address_space();
            as_guard.copy_as(&*self.pmem)?
        };
        let child = self.allocate(&name, Some(parent.pid), child_as)?;
        let pid = child.pid;

        {
            let parent_fds = parent_proc.fd_table.lock().unwrap();
            let mut child_fds = child.fd_table.lock().unwrap();
            for (fd, file) in parent_fds.iter_open() {
                if fd == 0 || fd == 1 {
                    continue;
                }
                if child_fds.alloc_at(fd, Arc::clone(file)).is_err() {
                    drop(child_fds);
                    drop(parent_fds);
                    self.unwind_allocation(pid, parent.pid);
                    return Err(KernelError::NoRes);
                }
            }
        }
        log::debug!("proc_fork: parent={} child={}", parent.pid, pid);

        let kernel = Arc::clone(self);
        std::thread::Builder::new()
            .name(format!("proc-{pid}"))
            .spawn(move || {
                set_current_pid(pid);
                let handle = ProcessHandle {
                    kernel: Arc::clone(&kernel),
                    pid,
                };
                let status = child_body(&handle);
                kernel.exit(pid, status);
            })
            .map_err(|_| KernelError::NoRes)?;
        Ok(pid)
    }

    /// `proc_wait(pid, status_out)`. `target == ANY_CHILD` scans for any
    /// exited child; otherwise waits on the specific pid. Spurious-wakeup
    /// safe: always re-checks under the loop (spec §4.E, §9).
    pub fn wait(&self, caller_pid: u32, target: i32) -> KResult<(u32, i32)> {
        let mut guard = self.exit_lock.lock().unwrap();
        loop {
            let parent = self.table.get(caller_pid).ok_or(KernelError::Child)?;
            let children = parent.children();
            if children.is_empty() {
                return Err(KernelError::Child);
            }

            if target == ANY_CHILD {
                let exited = children.iter().copied().find(|&pid| {
                    self.table
                        .get(pid)
                        .map(|c| matches!(c.exit_status(), ChildStatus::Exited(_)))
                        .unwrap_or(false)
                });
                if let Some(pid) = exited {
                    drop(children);
                    let mut children = parent.children();
                    children.retain(|&p| p != pid);
                    drop(children);
                    drop(guard);
                    let child = self.table.remove(pid).expect("exited child vanished before reaping");
                    let status = match child.exit_status() {
                        ChildStatus::Exited(s) => s,
                        ChildStatus::Alive => unreachable!("just observed exited"),
                    };
                    return Ok((pid, status));
                }
            } else {
                let target_pid = target as u32;
                if !children.contains(&target_pid) {
                    return Err(KernelError::Child);
                }
                if let Some(child) = self.table.get(target_pid) {
                    if let ChildStatus::Exited(status) = child.exit_status() {
                        drop(children);
                        let mut children = parent.children();
                        children.retain(|&p| p != target_pid);
                        drop(children);
                        drop(guard);
                        self.table.remove(target_pid);
                        return Ok((target_pid, status));
                    }
                }
            }
            drop(children);
            guard = self.exit_cv.wait(guard);
        }
    }

    /// `proc_exit(status)`: close every fd (lowest first), mark the
    /// process exited under `exit_lock`, re-parent any live children of
    /// its own to `init_proc`, release the lock, and broadcast the global
    /// wait condition variable. The `Process` struct itself stays in the
    /// table — and its address space alive — until a parent (or init)
    /// reaps it via `wait`.
    pub fn exit(&self, pid: u32, status: i32) {
        let process = match self.table.get(pid) {
            Some(p) => p,
            None => return,
        };

        let closed = process.fd_table.lock().unwrap().close_all();
        drop(closed);

        {
            let _guard = self.exit_lock.lock().unwrap();
            process.mark_exited(status);

            let mut kids = process.children();
            let orphans: Vec<u32> = kids.drain(..).collect();
            drop(kids);

            if let Some(init_pid) = self.init_pid() {
                if init_pid != pid {
                    if let Some(init) = self.table.get(init_pid) {
                        for child_pid in orphans {
                            if let Some(child) = self.table.get(child_pid) {
                                child.set_parent_pid(Some(init_pid));
                            }
                            init.add_child(child_pid);
                        }
                    }
                }
            }
        }

        log::debug!("proc_exit: pid={} status={}", pid, status);
        self.exit_cv.wake_all();
    }
}
