//! `MemFs`: an in-memory reference implementation of the `Filesystem`
//! contract, for use by tests and by `proc::elf` when loading a program
//! image that isn't backed by real storage.
//!
//! Path splitting/normalization mirrors the teacher's `fs::path` helpers
//! (`.`/`..`/empty-component elision); everything else is new, since the
//! teacher wires its VFS straight to on-disk FAT/exFAT/NTFS drivers rather
//! than through a swappable contract.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::{KResult, KernelError};
use crate::fs::contract::{DirEntry, FileKind, Filesystem, InodeHandle};

struct Inode {
    kind: FileKind,
    data: Vec<u8>,
    /// Directory entries, in insertion order (what `readdir`'s stable
    /// enumeration order walks).
    entries: Vec<(String, InodeHandle)>,
    links: u32,
    opens: u32,
}

impl Inode {
    fn dead(&self) -> bool {
        self.links == 0 && self.opens == 0
    }
}

struct Inner {
    next_id: u64,
    inodes: HashMap<InodeHandle, Inode>,
    root: InodeHandle,
}

pub struct MemFs {
    inner: Mutex<Inner>,
}

fn split(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty() && *c != ".").collect()
}

impl MemFs {
    pub fn new() -> Self {
        let root = InodeHandle(0);
        let mut inodes = HashMap::new();
        inodes.insert(
            root,
            Inode {
                kind: FileKind::Directory,
                data: Vec::new(),
                entries: Vec::new(),
                links: 1,
                opens: 0,
            },
        );
        MemFs {
            inner: Mutex::new(Inner {
                next_id: 1,
                inodes,
                root,
            }),
        }
    }

    /// Convenience for building fixtures in tests: create `path` with
    /// `contents`, creating any missing parent directories.
    pub fn seed_file(&self, path: &str, contents: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        let parts = split(path);
        let (dir, name) = match parts.split_last() {
            Some((name, dir)) => (dir, *name),
            None => return,
        };
        let parent = Self::mkdir_p(&mut inner, dir);
        let id = InodeHandle(inner.next_id);
        inner.next_id += 1;
        inner.inodes.insert(
            id,
            Inode {
                kind: FileKind::Regular,
                data: contents.to_vec(),
                entries: Vec::new(),
                links: 1,
                opens: 0,
            },
        );
        inner.inodes.get_mut(&parent).unwrap().entries.push((name.to_string(), id));
    }

    fn mkdir_p(inner: &mut Inner, parts: &[&str]) -> InodeHandle {
        let mut cur = inner.root;
        for part in parts {
            let existing = inner.inodes[&cur]
                .entries
                .iter()
                .find(|(n, _)| n == part)
                .map(|(_, h)| *h);
            cur = match existing {
                Some(h) => h,
                None => {
                    let id = InodeHandle(inner.next_id);
                    inner.next_id += 1;
                    inner.inodes.insert(
                        id,
                        Inode {
                            kind: FileKind::Directory,
                            data: Vec::new(),
                            entries: Vec::new(),
                            links: 1,
                            opens: 0,
                        },
                    );
                    inner.inodes.get_mut(&cur).unwrap().entries.push((part.to_string(), id));
                    id
                }
            };
        }
        cur
    }

    fn resolve(inner: &Inner, path: &str) -> KResult<InodeHandle> {
        let mut cur = inner.root;
        for part in split(path) {
            if part == ".." {
                continue;
            }
            let dir = inner.inodes.get(&cur).ok_or(KernelError::NotExist)?;
            if dir.kind != FileKind::Directory {
                return Err(KernelError::Ftype);
            }
            cur = dir
                .entries
                .iter()
                .find(|(n, _)| n == part)
                .map(|(_, h)| *h)
                .ok_or(KernelError::NotExist)?;
        }
        Ok(cur)
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl Filesystem for MemFs {
    fn find_inode(&self, path: &str) -> KResult<InodeHandle> {
        let inner = self.inner.lock().unwrap();
        Self::resolve(&inner, path)
    }

    fn root_inode(&self) -> InodeHandle {
        self.inner.lock().unwrap().root
    }

    fn get_inode(&self, handle: InodeHandle) -> KResult<FileKind> {
        let mut inner = self.inner.lock().unwrap();
        let inode = inner.inodes.get_mut(&handle).ok_or(KernelError::NotExist)?;
        inode.opens += 1;
        Ok(inode.kind)
    }

    fn release_inode(&self, handle: InodeHandle) {
        let mut inner = self.inner.lock().unwrap();
        let dead = if let Some(inode) = inner.inodes.get_mut(&handle) {
            inode.opens = inode.opens.saturating_sub(1);
            inode.dead()
        } else {
            false
        };
        if dead {
            inner.inodes.remove(&handle);
        }
    }

    fn read_file(&self, handle: InodeHandle, pos: u64, buf: &mut [u8]) -> KResult<usize> {
        let inner = self.inner.lock().unwrap();
        let inode = inner.inodes.get(&handle).ok_or(KernelError::NotExist)?;
        if inode.kind != FileKind::Regular {
            return Err(KernelError::Ftype);
        }
        let pos = pos as usize;
        if pos >= inode.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(inode.data.len() - pos);
        buf[..n].copy_from_slice(&inode.data[pos..pos + n]);
        Ok(n)
    }

    fn write_file(&self, handle: InodeHandle, pos: u64, buf: &[u8]) -> KResult<usize> {
        let mut inner = self.inner.lock().unwrap();
        let inode = inner.inodes.get_mut(&handle).ok_or(KernelError::NotExist)?;
        if inode.kind != FileKind::Regular {
            return Err(KernelError::Ftype);
        }
        let pos = pos as usize;
        if inode.data.len() < pos + buf.len() {
            inode.data.resize(pos + buf.len(), 0);
        }
        inode.data[pos..pos + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn readdir(&self, handle: InodeHandle, index: usize) -> KResult<Option<DirEntry>> {
        let inner = self.inner.lock().unwrap();
        let inode = inner.inodes.get(&handle).ok_or(KernelError::NotExist)?;
        if inode.kind != FileKind::Directory {
            return Err(KernelError::Ftype);
        }
        Ok(inode.entries.get(index).map(|(name, h)| DirEntry {
            name: name.clone(),
            inode: *h,
            kind: inner.inodes[h].kind,
        }))
    }

    fn link(&self, existing_path: &str, new_path: &str) -> KResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let target = Self::resolve(&inner, existing_path)?;
        let parts = split(new_path);
        let (dir_parts, name) = match parts.split_last() {
            Some((name, dir)) => (dir, *name),
            None => return Err(KernelError::Inval),
        };
        let dir = Self::resolve(&inner, &dir_parts.join("/"))?;
        if inner.inodes[&dir].entries.iter().any(|(n, _)| n == name) {
            return Err(KernelError::Inval);
        }
        inner.inodes.get_mut(&dir).unwrap().entries.push((name.to_string(), target));
        inner.inodes.get_mut(&target).unwrap().links += 1;
        Ok(())
    }

    fn unlink(&self, path: &str) -> KResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let parts = split(path);
        let (dir_parts, name) = match parts.split_last() {
            Some((name, dir)) => (dir, *name),
            None => return Err(KernelError::Inval),
        };
        let dir = Self::resolve(&inner, &dir_parts.join("/"))?;
        let entries = &mut inner.inodes.get_mut(&dir).unwrap().entries;
        let pos = entries.iter().position(|(n, _)| n == name).ok_or(KernelError::NotExist)?;
        let (_, target) = entries.remove(pos);
        let dead = {
            let inode = inner.inodes.get_mut(&target).unwrap();
            inode.links = inode.links.saturating_sub(1);
            inode.dead()
        };
        if dead {
            inner.inodes.remove(&target);
        }
        Ok(())
    }

    fn mkdir(&self, path: &str) -> KResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let parts = split(path);
        let (dir_parts, name) = match parts.split_last() {
            Some((name, dir)) => (dir, *name),
            None => return Err(KernelError::Inval),
        };
        let dir = Self::resolve(&inner, &dir_parts.join("/"))?;
        if inner.inodes[&dir].entries.iter().any(|(n, _)| n == name) {
            return Err(KernelError::Inval);
        }
        let id = InodeHandle(inner.next_id);
        inner.next_id += 1;
        inner.inodes.insert(
            id,
            Inode {
                kind: FileKind::Directory,
                data: Vec::new(),
                entries: Vec::new(),
                links: 1,
                opens: 0,
            },
        );
        inner.inodes.get_mut(&dir).unwrap().entries.push((name.to_string(), id));
        Ok(())
    }

    fn rmdir(&self, path: &str) -> KResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let target = Self::resolve(&inner, path)?;
        if !inner.inodes[&target].entries.is_empty() {
            return Err(KernelError::Inval);
        }
        let parts = split(path);
        let (dir_parts, name) = match parts.split_last() {
            Some((name, dir)) => (dir, *name),
            None => return Err(KernelError::Inval),
        };
        let dir = Self::resolve(&inner, &dir_parts.join("/"))?;
        let entries = &mut inner.inodes.get_mut(&dir).unwrap().entries;
        let pos = entries.iter().position(|(n, _)| n == name).ok_or(KernelError::NotExist)?;
        entries.remove(pos);
        inner.inodes.remove(&target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_then_read_back() {
        let fs = MemFs::new();
        fs.seed_file("/bin/prog", b"elf-bytes");
        let inode = fs.find_inode("/bin/prog").unwrap();
        let mut buf = [0u8; 9];
        let n = fs.read_file(inode, 0, &mut buf).unwrap();
        assert_eq!(n, 9);
        assert_eq!(&buf, b"elf-bytes");
    }

    #[test]
    fn unlink_then_lookup_fails() {
        let fs = MemFs::new();
        fs.seed_file("/a", b"x");
        fs.unlink("/a").unwrap();
        assert_eq!(fs.find_inode("/a"), Err(KernelError::NotExist));
    }

    #[test]
    fn link_keeps_data_reachable_under_new_name() {
        let fs = MemFs::new();
        fs.seed_file("/a", b"shared");
        fs.link("/a", "/b").unwrap();
        fs.unlink("/a").unwrap();
        let inode = fs.find_inode("/b").unwrap();
        let mut buf = [0u8; 6];
        fs.read_file(inode, 0, &mut buf).unwrap();
        assert_eq!(&buf, b"shared");
    }

    #[test]
    fn mkdir_rmdir_round_trip() {
        let fs = MemFs::new();
        fs.mkdir("/d").unwrap();
        assert!(fs.find_inode("/d").is_ok());
        fs.rmdir("/d").unwrap();
        assert_eq!(fs.find_inode("/d"), Err(KernelError::NotExist));
    }

    #[test]
    fn readdir_enumerates_in_insertion_order() {
        let fs = MemFs::new();
        fs.seed_file("/dir/a", b"1");
        fs.seed_file("/dir/b", b"2");
        let dir = fs.find_inode("/dir").unwrap();
        let first = fs.readdir(dir, 0).unwrap().unwrap();
        let second = fs.readdir(dir, 1).unwrap().unwrap();
        assert_eq!(first.name, "a");
        assert_eq!(second.name, "b");
        assert!(fs.readdir(dir, 2).unwrap().is_none());
    }
}
