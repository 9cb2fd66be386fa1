//! The unified, refcounted file handle (spec §3's "File handle" contract).
//!
//! A single `File` type represents console I/O, a pipe endpoint, or a
//! filesystem-backed open file — whichever `FileOps` implementation its
//! `ops` field holds. Multiple `Arc<File>` clones (from `dup`/`dup2`/`fork`)
//! share one `File`, so the refcount the spec describes is exactly
//! `Arc::strong_count`; nothing here hand-rolls it. The spec's separate
//! "opaque `info` pointer used by pipes" field is folded into the `ops`
//! trait object itself — a `Arc<dyn FileOps>` is data-plus-vtable already,
//! so a pipe's `FileOps` impl simply *is* the opaque pipe reference, with
//! no second field needed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::KResult;
use crate::fs::contract::InodeHandle;

/// Access-mode bits. Deliberately one-hot (rather than the POSIX `O_RDONLY
/// == 0` encoding) so the syscall facade's flag validation has something
/// concrete to check against — see spec §9's note on the `flags & (flags >>
/// 1)` heuristic and `syscall::facade::validate_open_flags`.
pub const O_RDONLY: u32 = 0x1;
pub const O_WRONLY: u32 = 0x2;
pub const O_RDWR: u32 = 0x4;
/// Mask of the three access-mode bits above; everything else (e.g. a future
/// `O_CREAT`) lives outside this mask.
pub const O_ACCESS_MASK: u32 = O_RDONLY | O_WRONLY | O_RDWR;

/// Per-open-file operations. Implemented once per kind of backing object
/// (console, pipe endpoint, filesystem file).
pub trait FileOps: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `file`'s current position,
    /// advancing it by the number of bytes actually read.
    fn read(&self, file: &File, buf: &mut [u8]) -> KResult<usize>;
    /// Write `buf` at `file`'s current position, advancing it.
    fn write(&self, file: &File, buf: &[u8]) -> KResult<usize>;
    /// Called exactly once, when the last `Arc<File>` referencing this
    /// handle is dropped.
    fn close(&self, file: &File);
}

/// A refcounted open file. Always held behind `Arc<File>`; cloning the Arc
/// *is* `fs_reopen_file`'s refcount bump, and dropping the last clone is
/// `fs_close_file`.
pub struct File {
    pub oflag: u32,
    pos: AtomicU64,
    pub inode: Option<InodeHandle>,
    ops: Arc<dyn FileOps>,
}

impl File {
    pub fn new(oflag: u32, inode: Option<InodeHandle>, ops: Arc<dyn FileOps>) -> Arc<File> {
        Arc::new(File {
            oflag,
            pos: AtomicU64::new(0),
            inode,
            ops,
        })
    }

    pub fn f_pos(&self) -> u64 {
        self.pos.load(Ordering::Relaxed)
    }

    pub fn set_f_pos(&self, value: u64) {
        self.pos.store(value, Ordering::Relaxed);
    }

    pub fn advance_f_pos(&self, by: u64) -> u64 {
        self.pos.fetch_add(by, Ordering::Relaxed) + by
    }

    pub fn read(&self, buf: &mut [u8]) -> KResult<usize> {
        self.ops.read(self, buf)
    }

    pub fn write(&self, buf: &[u8]) -> KResult<usize> {
        self.ops.write(self, buf)
    }
}

impl Drop for File {
    fn drop(&mut self) {
        self.ops.close(self);
    }
}

/// `FileOps` for the console (stdin/stdout, pre-populated at fd 0/1 by
/// `proc_init`). Backed by process-wide stdio streams rather than a real
/// TTY driver, which is out of scope for this subsystem.
pub struct ConsoleOps {
    reader: std::sync::Mutex<Box<dyn std::io::Read + Send>>,
    writer: std::sync::Mutex<Box<dyn std::io::Write + Send>>,
}

impl ConsoleOps {
    pub fn stdio() -> Arc<dyn FileOps> {
        Arc::new(ConsoleOps {
            reader: std::sync::Mutex::new(Box::new(std::io::stdin())),
            writer: std::sync::Mutex::new(Box::new(std::io::stdout())),
        })
    }

    /// A console backed by in-memory buffers, for deterministic tests.
    pub fn memory(input: Vec<u8>) -> Arc<dyn FileOps> {
        Arc::new(ConsoleOps {
            reader: std::sync::Mutex::new(Box::new(std::io::Cursor::new(input))),
            writer: std::sync::Mutex::new(Box::new(Vec::new())),
        })
    }
}

impl FileOps for ConsoleOps {
    fn read(&self, _file: &File, buf: &mut [u8]) -> KResult<usize> {
        use std::io::Read;
        Ok(self.reader.lock().unwrap().read(buf).unwrap_or(0))
    }

    fn write(&self, _file: &File, buf: &[u8]) -> KResult<usize> {
        use std::io::Write;
        let mut w = self.writer.lock().unwrap();
        let _ = w.write_all(buf);
        let _ = w.flush();
        Ok(buf.len())
    }

    fn close(&self, _file: &File) {}
}
