//! Syscall numbers (spec §4.F, §6's "User ABI").
//!
//! Narrowed from the teacher's `syscall::mod`'s sixty-five-entry table
//! (device/network/DLL/event-bus syscalls this subsystem doesn't own) down
//! to exactly the surface spec §4.F lists, plus the two corollaries §2 of
//! the expanded spec adds (`getppid`, `dup2`).

pub const SYS_FORK: u32 = 1;
pub const SYS_SPAWN: u32 = 2;
pub const SYS_WAIT: u32 = 3;
pub const SYS_EXIT: u32 = 4;
pub const SYS_GETPID: u32 = 5;
pub const SYS_GETPPID: u32 = 6;
/// Listed in spec §4.F as a dispatch entry; never implemented (spec §1's
/// Non-goals). Dispatching it returns `KernelError::Inval`.
pub const SYS_SLEEP: u32 = 7;
pub const SYS_OPEN: u32 = 8;
pub const SYS_CLOSE: u32 = 9;
pub const SYS_READ: u32 = 10;
pub const SYS_WRITE: u32 = 11;
pub const SYS_LINK: u32 = 12;
pub const SYS_UNLINK: u32 = 13;
pub const SYS_MKDIR: u32 = 14;
pub const SYS_CHDIR: u32 = 15;
pub const SYS_READDIR: u32 = 16;
pub const SYS_RMDIR: u32 = 17;
pub const SYS_FSTAT: u32 = 18;
pub const SYS_SBRK: u32 = 19;
pub const SYS_MEMINFO: u32 = 20;
pub const SYS_DUP: u32 = 21;
pub const SYS_DUP2: u32 = 22;
pub const SYS_PIPE: u32 = 23;
pub const SYS_INFO: u32 = 24;
pub const SYS_HALT: u32 = 25;
