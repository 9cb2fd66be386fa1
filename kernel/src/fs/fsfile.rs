//! Bridges the `Filesystem` contract to the unified `File`/`FileOps`
//! contract for regular files (spec §3's "File handle", backed by a real
//! inode rather than console or pipe state).
//!
//! Grounded on `fs::vfs`'s `vfs_read`/`vfs_write` shim in the teacher
//! kernel, which does the same job of turning a path-resolved inode into
//! something the fd layer can call `read`/`write`/`close` on uniformly.
//! The refcount that matters here is `get_inode`/`release_inode`'s, not
//! `Arc<File>`'s — a dup'd fd shares one `File`, hence one inode
//! reference, regardless of how many fds point at it.

use std::sync::Arc;

use crate::error::KResult;
use crate::fs::contract::{Filesystem, InodeHandle};
use crate::fs::file::{File, FileOps};

pub struct FsFileOps {
    fs: Arc<dyn Filesystem>,
    inode: InodeHandle,
}

impl FsFileOps {
    /// Wrap an already-`get_inode`'d handle. The caller (`syscall::facade::open`)
    /// is responsible for having taken the reference this struct's `close`
    /// will release.
    pub fn new(fs: Arc<dyn Filesystem>, inode: InodeHandle) -> Arc<dyn FileOps> {
        Arc::new(FsFileOps { fs, inode })
    }
}

impl FileOps for FsFileOps {
    fn read(&self, file: &File, buf: &mut [u8]) -> KResult<usize> {
        let pos = file.f_pos();
        let n = self.fs.read_file(self.inode, pos, buf)?;
        file.advance_f_pos(n as u64);
        Ok(n)
    }

    fn write(&self, file: &File, buf: &[u8]) -> KResult<usize> {
        let pos = file.f_pos();
        let n = self.fs.write_file(self.inode, pos, buf)?;
        file.advance_f_pos(n as u64);
        Ok(n)
    }

    fn close(&self, _file: &File) {
        self.fs.release_inode(self.inode);
    }
}
