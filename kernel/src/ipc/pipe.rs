//! Anonymous pipes (spec §4.B).
//!
//! One reader, one writer, a fixed-size ring buffer. Grounded on the
//! teacher's `ipc::anon_pipe`: same lock-protected ring, same "drain/fill
//! under the lock, wake outside it, block-and-retry" shape. Two things
//! differ because the spec's model differs from the teacher's:
//!
//! - The teacher lets many FDs reference either end (`read_refs`/
//!   `write_refs` counters, a blocked-TID list per side) because its fork
//!   model dup's raw pipe IDs across FD tables. This crate instead gives a
//!   pipe exactly one read-end `File` and one write-end `File`
//!   (`readopen`/`writeopen` booleans, spec §4.B) and relies on `Arc<File>`
//!   refcounting for "does this end still have any holder" — see
//!   `fs::fd_table`, where a `fork`'d child gets its own `Arc` clone onto
//!   the *same* pipe end rather than a second independent end.
//! - Blocking goes through `sync::waitqueue::WaitQueue` (a real
//!   `Condvar`) instead of a blocked-TID array plus the teacher's own
//!   cooperative scheduler, which is an externalized collaborator here.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::{KResult, KernelError};
use crate::fs::file::{File, FileOps, O_RDONLY, O_WRONLY};
use crate::sync::waitqueue::WaitQueue;

struct PipeState {
    buf: VecDeque<u8>,
    capacity: usize,
    /// Total bytes ever written. Spec §4.B's `nwrite` counter: combined
    /// with `buf.len()` it lets a reader distinguish "nothing written yet,
    /// could still block" from "writer closed with nothing left to drain".
    nwrite: u64,
    readopen: bool,
    writeopen: bool,
}

/// The shared pipe object. Never exposed directly — `pipe_alloc` hands back
/// a pair of `Arc<File>`s whose `ops` wrap this.
pub struct Pipe {
    state: Mutex<PipeState>,
    read_avail: WaitQueue,
    write_avail: WaitQueue,
}

impl Pipe {
    fn new(capacity: usize) -> Arc<Pipe> {
        Arc::new(Pipe {
            state: Mutex::new(PipeState {
                buf: VecDeque::with_capacity(capacity),
                capacity,
                nwrite: 0,
                readopen: true,
                writeopen: true,
            }),
            read_avail: WaitQueue::new(),
            write_avail: WaitQueue::new(),
        })
    }

    fn do_read(&self, buf: &mut [u8]) -> KResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut st = self.state.lock().unwrap();
        loop {
            if !st.buf.is_empty() {
                let n = buf.len().min(st.buf.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = st.buf.pop_front().unwrap();
                }
                drop(st);
                self.write_avail.wake_all();
                return Ok(n);
            }
            if !st.writeopen {
                // Writer gone, buffer drained: EOF.
                return Ok(0);
            }
            st = self.read_avail.wait(st);
        }
    }

    fn do_write(&self, data: &[u8]) -> KResult<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let mut written = 0;
        let mut st = self.state.lock().unwrap();
        while written < data.len() {
            if !st.readopen {
                return Err(KernelError::End);
            }
            let space = st.capacity.saturating_sub(st.buf.len());
            if space == 0 {
                self.read_avail.wake_all();
                st = self.write_avail.wait(st);
                continue;
            }
            let n = (data.len() - written).min(space);
            st.buf.extend(&data[written..written + n]);
            st.nwrite += n as u64;
            written += n;
        }
        drop(st);
        self.read_avail.wake_all();
        Ok(written)
    }

    fn close_read(&self) {
        {
            let mut st = self.state.lock().unwrap();
            st.readopen = false;
        }
        self.write_avail.wake_all();
    }

    fn close_write(&self) {
        {
            let mut st = self.state.lock().unwrap();
            st.writeopen = false;
        }
        self.read_avail.wake_all();
    }

    /// Bytes currently buffered, without blocking. Used by `fstat`/`info`.
    pub fn bytes_available(&self) -> usize {
        self.state.lock().unwrap().buf.len()
    }

    pub fn total_written(&self) -> u64 {
        self.state.lock().unwrap().nwrite
    }
}

struct PipeReadOps(Arc<Pipe>);
struct PipeWriteOps(Arc<Pipe>);

impl FileOps for PipeReadOps {
    fn read(&self, _file: &File, buf: &mut [u8]) -> KResult<usize> {
        self.0.do_read(buf)
    }
    fn write(&self, _file: &File, _buf: &[u8]) -> KResult<usize> {
        Err(KernelError::Inval)
    }
    fn close(&self, _file: &File) {
        self.0.close_read();
    }
}

impl FileOps for PipeWriteOps {
    fn read(&self, _file: &File, _buf: &mut [u8]) -> KResult<usize> {
        Err(KernelError::Inval)
    }
    fn write(&self, _file: &File, buf: &[u8]) -> KResult<usize> {
        self.0.do_write(buf)
    }
    fn close(&self, _file: &File) {
        self.0.close_write();
    }
}

/// `pipe()`: allocate a new pipe, returning its `(read_end, write_end)`
/// file handles. `capacity` is normally `KernelConfig::pipe_size`; tests
/// shrink it to exercise the full/blocked paths deterministically.
pub fn pipe_alloc(capacity: usize) -> (Arc<File>, Arc<File>) {
    let pipe = Pipe::new(capacity);
    let read_end = File::new(O_RDONLY, None, Arc::new(PipeReadOps(Arc::clone(&pipe))));
    let write_end = File::new(O_WRONLY, None, Arc::new(PipeWriteOps(pipe)));
    (read_end, write_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn write_then_read_round_trip() {
        let (r, w) = pipe_alloc(512);
        w.write(b"hello").unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(r.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn read_blocks_until_write_then_wakes() {
        let (r, w) = pipe_alloc(512);
        let reader = thread::spawn(move || {
            let mut buf = [0u8; 3];
            let n = r.read(&mut buf).unwrap();
            (n, buf)
        });
        thread::sleep(Duration::from_millis(30));
        w.write(b"abc").unwrap();
        let (n, buf) = reader.join().unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf, b"abc");
    }

    #[test]
    fn read_returns_eof_after_writer_closes() {
        let (r, w) = pipe_alloc(512);
        drop(w);
        let mut buf = [0u8; 4];
        assert_eq!(r.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn write_fails_after_reader_closes() {
        let (r, w) = pipe_alloc(512);
        drop(r);
        assert_eq!(w.write(b"x"), Err(KernelError::End));
    }

    #[test]
    fn write_blocks_when_full_until_reader_drains() {
        let (r, w) = pipe_alloc(4);
        w.write(b"abcd").unwrap();
        let writer = thread::spawn(move || w.write(b"ef").unwrap());
        thread::sleep(Duration::from_millis(30));
        let mut buf = [0u8; 2];
        assert_eq!(r.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"ab");
        let n = writer.join().unwrap();
        assert_eq!(n, 2);
    }
}
