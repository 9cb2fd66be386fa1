//! Filesystem-facing surface of the process/IPC core: the per-process fd
//! table, the unified file handle, the `Filesystem` contract a concrete
//! backing store must satisfy, and an in-memory reference implementation
//! of that contract used by tests and the ELF loader.

pub mod contract;
pub mod fd_table;
pub mod file;
pub mod fsfile;
pub mod testfs;
