//! The kernel's closed error taxonomy.
//!
//! Every fallible operation in this crate returns `Result<T, KernelError>`.
//! The syscall facade (`syscall::facade`) is the one place that turns a
//! `KernelError` back into the negative `i32` a user-space caller receives.

/// One variant per error code in the closed set (spec's external-interface
/// error list). No other error conditions exist in this subsystem; a new
/// failure mode always maps onto one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// Out of memory (frame, heap, or table-slot exhaustion).
    #[error("out of memory")]
    NoMem,
    /// Invalid argument (malformed flags, bad fd, not-lowest-alloc violation, etc).
    #[error("invalid argument")]
    Inval,
    /// A user pointer or string fails validation against its memory region.
    #[error("bad user-space address")]
    Fault,
    /// `wait()` called with no children (live or otherwise).
    #[error("no child processes")]
    Child,
    /// The opposite end of a pipe closed.
    #[error("pipe/file end closed")]
    End,
    /// A required object (inode, pipe, process) doesn't exist.
    #[error("object does not exist")]
    NotExist,
    /// Operation not valid for this file type (e.g. fstat on a pipe).
    #[error("wrong file type for this operation")]
    Ftype,
    /// Some other resource is exhausted (e.g. the pipe/process table is full).
    #[error("no resources available")]
    NoRes,
    /// A page fault could not be resolved because allocation failed.
    #[error("page fault allocation failure")]
    PgFaultAlloc,
    /// A page fault could not be resolved because the page mapper rejected the mapping.
    #[error("page table mapping failure")]
    VpmapMap,
}

impl KernelError {
    /// The negative `sysret` value a syscall handler returns for this error.
    pub const fn errno(self) -> i32 {
        match self {
            KernelError::NoMem => -1,
            KernelError::Inval => -2,
            KernelError::Fault => -3,
            KernelError::Child => -4,
            KernelError::End => -5,
            KernelError::NotExist => -6,
            KernelError::Ftype => -7,
            KernelError::NoRes => -8,
            KernelError::PgFaultAlloc => -9,
            KernelError::VpmapMap => -10,
        }
    }
}

/// This crate's standard result alias.
pub type KResult<T> = Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_values_are_distinct_and_negative() {
        let all = [
            KernelError::NoMem,
            KernelError::Inval,
            KernelError::Fault,
            KernelError::Child,
            KernelError::End,
            KernelError::NotExist,
            KernelError::Ftype,
            KernelError::NoRes,
            KernelError::PgFaultAlloc,
            KernelError::VpmapMap,
        ];
        for e in all {
            assert!(e.errno() < 0);
        }
        let mut codes: Vec<i32> = all.iter().map(|e| e.errno()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }
}
