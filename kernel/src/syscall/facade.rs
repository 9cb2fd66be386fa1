//! Component F: the syscall facade (spec §4.F).
//!
//! Grounded on `syscall::handlers`'s per-call argument-fetch-then-dispatch
//! shape, generalized from the teacher's raw trap-frame `fetch_arg` to
//! plain typed parameters — there is no trap frame in this crate (spec
//! §1 externalizes `thread_create`/`tf_proc` entirely), so a syscall here
//! is just a function taking a `&ProcessHandle` and already-typed
//! arguments. What the teacher's `fetch_arg` validated for raw trap-frame
//! words, `validate_user_ptr`/`copy_from_user`/`copy_to_user`/
//! `read_user_string` validate here against the calling process's
//! simulated address space: every "user pointer" argument is a `u32`
//! virtual address, checked against its enclosing memregion exactly as
//! spec §4.F requires (no overflow, no wraparound, full buffer inside one
//! region), with missing pages faulted in through `vm::pgfault::resolve`
//! rather than assumed already resident.

use std::sync::Arc;

use crate::error::{KResult, KernelError};
use crate::fs::contract::{DirEntry, FileKind, Filesystem, InodeHandle};
use crate::fs::file::{File, O_ACCESS_MASK};
use crate::fs::fsfile::FsFileOps;
use crate::ipc::pipe;
use crate::proc::lifecycle::ProcessHandle;
use crate::proc::process::Process;
use crate::vm::contract::{AddressSpace, PhysicalMemory};
use crate::vm::pgfault;

/// `open`'s flag check (spec §9's resolved open question): exactly one of
/// `O_RDONLY`/`O_WRONLY`/`O_RDWR` must be set, checked by popcount against
/// the access-mode mask rather than the fragile `flags & (flags >> 1)`.
pub fn validate_open_flags(flags: u32) -> KResult<()> {
    if (flags & O_ACCESS_MASK).count_ones() == 1 {
        Ok(())
    } else {
        Err(KernelError::Inval)
    }
}

/// Read `len` bytes from the calling process's address space starting at
/// `va`, faulting in any not-yet-resident page along the way. Fails
/// `ERR_FAULT` if `[va, va+len)` doesn't fall inside one memregion.
pub fn copy_from_user(handle: &ProcessHandle, va: u32, len: u32) -> KResult<Vec<u8>> {
    let process = handle.process();
    let kernel = handle.kernel();
    let cfg = &kernel.cfg;
    let mut as_guard = process.address_space();
    let region = as_guard.find_memregion(va).ok_or(KernelError::Fault)?;
    if !region.contains_range(va, len) {
        return Err(KernelError::Fault);
    }

    let mut out = vec![0u8; len as usize];
    let mut off = 0u32;
    while off < len {
        let addr = va + off;
        let page = cfg.page_round_down(addr);
        if as_guard.lookup_page(page).is_none() {
            pgfault::resolve(&mut **as_guard, &*kernel.pmem, cfg, &kernel.fault_counter, page, false, false, true)?;
        }
        let (frame, _) = as_guard.lookup_page(page).expect("page fault just resolved it");
        let page_off = cfg.page_offset(addr);
        let n = (cfg.page_size - page_off).min(len - off);
        let mut chunk = vec![0u8; n as usize];
        kernel.pmem.read_at(frame, page_off as usize, &mut chunk);
        out[off as usize..(off + n) as usize].copy_from_slice(&chunk);
        off += n;
    }
    Ok(out)
}

/// Write `data` into the calling process's address space starting at
/// `va`. A read-only region fails outright; a present-but-read-only page
/// (the COW case) and a not-yet-resident page both go through
/// `vm::pgfault::resolve` with `write = true` before the copy lands.
pub fn copy_to_user(handle: &ProcessHandle, va: u32, data: &[u8]) -> KResult<()> {
    let process = handle.process();
    let kernel = handle.kernel();
    let cfg = &kernel.cfg;
    let len = data.len() as u32;
    let mut as_guard = process.address_space();
    let region = as_guard.find_memregion(va).ok_or(KernelError::Fault)?;
    if !region.perm.write || !region.contains_range(va, len) {
        return Err(KernelError::Fault);
    }

    let mut off = 0u32;
    while off < len {
        let addr = va + off;
        let page = cfg.page_round_down(addr);
        let existing = as_guard.lookup_page(page);
        let needs_fault = !matches!(existing, Some((_, perm)) if perm.write);
        if needs_fault {
            let present = existing.is_some();
            pgfault::resolve(&mut **as_guard, &*kernel.pmem, cfg, &kernel.fault_counter, page, present, true, true)?;
        }
        let (frame, _) = as_guard.lookup_page(page).expect("page fault just resolved it");
        let page_off = cfg.page_offset(addr);
        let n = (cfg.page_size - page_off).min(len - off);
        kernel.pmem.write_at(frame, page_off as usize, &data[off as usize..(off + n) as usize]);
        off += n;
    }
    Ok(())
}

/// Scan a NUL-terminated string out of user space, bounded by the
/// enclosing memregion (spec §4.F's "validate any user string by scanning
/// for a terminator within its memregion" — an unterminated string that
/// runs off the region's end is `ERR_FAULT`, not a runaway read).
pub fn read_user_string(handle: &ProcessHandle, va: u32, max_len: u32) -> KResult<String> {
    let process = handle.process();
    let kernel = handle.kernel();
    let cfg = &kernel.cfg;
    let mut as_guard = process.address_space();
    let region = as_guard.find_memregion(va).ok_or(KernelError::Fault)?;

    let mut bytes = Vec::new();
    let mut addr = va;
    loop {
        if addr >= region.end || addr - va >= max_len {
            return Err(KernelError::Fault);
        }
        let page = cfg.page_round_down(addr);
        if as_guard.lookup_page(page).is_none() {
            pgfault::resolve(&mut **as_guard, &*kernel.pmem, cfg, &kernel.fault_counter, page, false, false, true)?;
        }
        let (frame, _) = as_guard.lookup_page(page).expect("page fault just resolved it");
        let mut b = [0u8; 1];
        kernel.pmem.read_at(frame, cfg.page_offset(addr) as usize, &mut b);
        if b[0] == 0 {
            break;
        }
        bytes.push(b[0]);
        addr += 1;
    }
    String::from_utf8(bytes).map_err(|_| KernelError::Inval)
}

pub fn getpid(handle: &ProcessHandle) -> u32 {
    handle.pid()
}

pub fn getppid(handle: &ProcessHandle) -> u32 {
    handle.getppid()
}

pub fn fork(handle: &ProcessHandle, child_body: impl FnOnce(&ProcessHandle) -> i32 + Send + 'static) -> KResult<u32> {
    handle.fork(child_body)
}

pub fn spawn(
    handle: &ProcessHandle,
    name: &str,
    path: &str,
    argv: &[String],
    body: impl FnOnce(&ProcessHandle) -> i32 + Send + 'static,
) -> KResult<u32> {
    handle.spawn(name, path, argv, body)
}

pub fn wait(handle: &ProcessHandle, target: i32) -> KResult<(u32, i32)> {
    handle.wait(target)
}

pub fn exit(handle: &ProcessHandle, status: i32) {
    handle.kernel().exit(handle.pid(), status);
}

/// Listed in spec §4.F's dispatch surface; unimplemented (spec §1's
/// Non-goals exclude it). Always returns `ERR_INVAL`.
pub fn sleep(_handle: &ProcessHandle, _ms: u32) -> KResult<()> {
    Err(KernelError::Inval)
}

pub fn open(process: &Process, fs: &Arc<dyn Filesystem>, path: &str, flags: u32) -> KResult<i32> {
    validate_open_flags(flags)?;
    let inode = fs.find_inode(path)?;
    let kind = fs.get_inode(inode)?;
    if kind != FileKind::Regular {
        fs.release_inode(inode);
        return Err(KernelError::Ftype);
    }
    let ops = FsFileOps::new(Arc::clone(fs), inode);
    let file = File::new(flags, Some(inode), ops);
    process.fd_table.lock().unwrap().alloc(file)
}

pub fn close(process: &Process, fd: i32) -> KResult<()> {
    process.fd_table.lock().unwrap().remove(fd)?;
    Ok(())
}

pub fn read(process: &Process, fd: i32, buf: &mut [u8]) -> KResult<usize> {
    let file = process.fd_table.lock().unwrap().get(fd)?;
    file.read(buf)
}

pub fn write(process: &Process, fd: i32, buf: &[u8]) -> KResult<usize> {
    let file = process.fd_table.lock().unwrap().get(fd)?;
    file.write(buf)
}

pub fn link(fs: &Arc<dyn Filesystem>, existing_path: &str, new_path: &str) -> KResult<()> {
    fs.link(existing_path, new_path)
}

pub fn unlink(fs: &Arc<dyn Filesystem>, path: &str) -> KResult<()> {
    fs.unlink(path)
}

pub fn mkdir(fs: &Arc<dyn Filesystem>, path: &str) -> KResult<()> {
    fs.mkdir(path)
}

pub fn rmdir(fs: &Arc<dyn Filesystem>, path: &str) -> KResult<()> {
    fs.rmdir(path)
}

pub fn chdir(process: &Process, fs: &Arc<dyn Filesystem>, path: &str) -> KResult<()> {
    let inode = fs.find_inode(path)?;
    let kind = fs.get_inode(inode)?;
    if kind != FileKind::Directory {
        fs.release_inode(inode);
        return Err(KernelError::Ftype);
    }
    let old_cwd = process.cwd();
    process.set_cwd(inode);
    fs.release_inode(old_cwd);
    Ok(())
}

pub fn readdir(fs: &Arc<dyn Filesystem>, path: &str, index: usize) -> KResult<Option<DirEntry>> {
    let inode = fs.find_inode(path)?;
    let kind = fs.get_inode(inode)?;
    let result = if kind != FileKind::Directory {
        Err(KernelError::Ftype)
    } else {
        fs.readdir(inode, index)
    };
    fs.release_inode(inode);
    result
}

/// `fstat` on a console or pipe fd has no backing inode and fails
/// `ERR_FTYPE` (spec §4.F).
pub fn fstat(process: &Process, fs: &Arc<dyn Filesystem>, fd: i32) -> KResult<(InodeHandle, FileKind)> {
    let file = process.fd_table.lock().unwrap().get(fd)?;
    let inode = file.inode.ok_or(KernelError::Ftype)?;
    let kind = fs.get_inode(inode)?;
    fs.release_inode(inode);
    Ok((inode, kind))
}

/// Extend the caller's heap region by `increment` bytes, returning the
/// previous top (spec §4.F: "return the old top").
pub fn sbrk(handle: &ProcessHandle, increment: u32) -> KResult<u32> {
    let process = handle.process();
    let heap_start = process.heap_start();
    let mut as_guard = process.address_space();
    as_guard.extend_memregion(heap_start, increment)
}

/// `info`: the two counters spec §4.F and §6 call out — `num_pgfault`
/// (`user_pgfault`) and the frame allocator's in-use count, useful for
/// the same diagnostics the teacher exposes via `sched_diag`.
pub struct SysInfo {
    pub num_pgfault: u64,
    pub frames_in_use: usize,
}

pub fn info(handle: &ProcessHandle) -> SysInfo {
    let kernel = handle.kernel();
    SysInfo {
        num_pgfault: kernel.fault_counter.get(),
        frames_in_use: kernel.pmem.frames_in_use(),
    }
}

pub fn dup(process: &Process, fd: i32) -> KResult<i32> {
    let mut table = process.fd_table.lock().unwrap();
    let file = table.get(fd)?;
    table.alloc(file)
}

pub fn dup2(process: &Process, old_fd: i32, new_fd: i32) -> KResult<i32> {
    process.fd_table.lock().unwrap().dup2(old_fd, new_fd)
}

/// `pipe`: install the read end at the lowest free fd, then the write end
/// at the next lowest; if the second allocation fails, close the first
/// and propagate the error (spec §4.F).
pub fn pipe_syscall(process: &Process, pipe_size: usize) -> KResult<(i32, i32)> {
    let (read_end, write_end) = pipe::pipe_alloc(pipe_size);
    let mut table = process.fd_table.lock().unwrap();
    let rfd = table.alloc(read_end)?;
    match table.alloc(write_end) {
        Ok(wfd) => Ok((rfd, wfd)),
        Err(e) => {
            let _ = table.remove(rfd);
            Err(e)
        }
    }
}

/// No-op stub: shutting down the host process is out of scope for a
/// library crate.
pub fn halt(_handle: &ProcessHandle) {}
