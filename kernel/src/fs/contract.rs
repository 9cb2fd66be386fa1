//! The `Filesystem` external contract (spec §6).
//!
//! Everything in `proc::elf`, `syscall::facade`, and the FD/file layer that
//! needs to touch persistent storage goes through this trait rather than a
//! concrete filesystem. The teacher kernel instead wires `fs::vfs` directly
//! to on-disk FAT/exFAT/NTFS/iso9660/smbfs drivers — all of that is
//! hardware-facing and out of scope here; this trait is the seam spec §6
//! names, and `testfs::MemFs` is the one backend this crate ships.

use crate::error::KResult;

/// An opaque handle to a filesystem's internal inode representation. The
/// contract never interprets its contents; a `Filesystem` implementation
/// defines what it means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InodeHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub inode: InodeHandle,
    pub kind: FileKind,
}

/// A backing store a process can open, read, write, and traverse paths on.
/// Method names mirror the spec's `fs_*` functions; `fs_reopen_file` has no
/// counterpart here because in this crate that's just `Arc::clone` on the
/// `File` handle (see `fs::file`).
pub trait Filesystem: Send + Sync {
    /// Resolve `path` to an inode, following the same containing-directory
    /// semantics as spec's `fs_find_inode` — this does not open anything.
    fn find_inode(&self, path: &str) -> KResult<InodeHandle>;

    /// The root directory's inode.
    fn root_inode(&self) -> InodeHandle;

    /// Look up (and internally refcount) the inode for `handle`. Returns an
    /// error if it has been unlinked and has no remaining links or open
    /// handles.
    fn get_inode(&self, handle: InodeHandle) -> KResult<FileKind>;

    /// Release a reference taken by `get_inode` or `find_inode`. Dropping
    /// the last reference to an unlinked inode frees its storage.
    fn release_inode(&self, handle: InodeHandle);

    fn read_file(&self, handle: InodeHandle, pos: u64, buf: &mut [u8]) -> KResult<usize>;
    fn write_file(&self, handle: InodeHandle, pos: u64, buf: &[u8]) -> KResult<usize>;

    /// The `index`-th directory entry of `handle`, in a stable enumeration
    /// order, or `None` past the end.
    fn readdir(&self, handle: InodeHandle, index: usize) -> KResult<Option<DirEntry>>;

    fn link(&self, existing_path: &str, new_path: &str) -> KResult<()>;
    fn unlink(&self, path: &str) -> KResult<()>;
    fn mkdir(&self, path: &str) -> KResult<()>;
    fn rmdir(&self, path: &str) -> KResult<()>;
}
