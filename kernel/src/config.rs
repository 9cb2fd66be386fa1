//! Kernel tunables.
//!
//! Grouped behind one struct (rather than bare `const`s, as the teacher
//! repository does throughout `task/loader.rs` and `memory/vma.rs`) so unit
//! tests can shrink `pipe_size` or `max_files` to exercise edge cases (a
//! full pipe, a full FD table) without touching the production defaults.

/// Sentinel marking a live (not-yet-exited) child in debug/display output.
/// The actual "is this child alive" question is answered by
/// `proc::process::ChildStatus`, a tagged enum — this constant exists only
/// for log lines and is never compared against for control flow.
pub const STATUS_ALIVE_DISPLAY: u32 = 0xBEEF_EEB;

/// `wait(-1)` - wait for any child.
pub const ANY_CHILD: i32 = -1;

#[derive(Debug, Clone, Copy)]
pub struct KernelConfig {
    /// Max number of file descriptors per process (spec: `PROC_MAX_FILE`).
    pub max_files: usize,
    /// Max number of argv entries `proc_spawn` will carry onto the stack
    /// (spec: `PROC_MAX_ARG`); additional args are silently truncated.
    pub max_argv: usize,
    /// Max bytes (including NUL) for a process name (spec: `PROC_NAME_LEN`).
    pub proc_name_len: usize,
    /// Pipe ring-buffer capacity in bytes (spec: `PIPESIZE`).
    pub pipe_size: usize,
    /// Page size in bytes, used for region rounding and stack layout.
    pub page_size: u32,
    /// Number of pages reserved for a process's initial stack region.
    pub stack_pages: u32,
    /// Highest user-space address; the stack region ends here.
    pub ustack_upperbound: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            max_files: 128,
            max_argv: 128,
            proc_name_len: 32,
            pipe_size: 512,
            page_size: 4096,
            stack_pages: 10,
            ustack_upperbound: 0xC000_0000,
        }
    }
}

impl KernelConfig {
    /// Round `addr` down to the start of its containing page.
    pub const fn page_round_down(&self, addr: u32) -> u32 {
        addr & !(self.page_size - 1)
    }

    /// Round `addr` up to the start of the next page (or itself, if already aligned).
    pub const fn page_round_up(&self, addr: u32) -> u32 {
        (addr + self.page_size - 1) & !(self.page_size - 1)
    }

    /// Offset of `addr` within its page.
    pub const fn page_offset(&self, addr: u32) -> u32 {
        addr & (self.page_size - 1)
    }

    /// Start (inclusive) of the stack region for this config.
    pub const fn stack_region_start(&self) -> u32 {
        self.ustack_upperbound - self.stack_pages * self.page_size
    }
}
