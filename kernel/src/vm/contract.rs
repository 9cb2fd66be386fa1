//! The external virtual-memory contract (spec §6): physical frame
//! allocation/refcounting and the per-process address space (memory
//! regions + page table). Neither trait is implemented against real
//! hardware here — `vm::sim` is the one backend this crate ships, grounded
//! on the teacher's `memory::physical` (bitmap frame allocator) and
//! `memory::vma` (`BTreeMap`-keyed region registry) — but `vm::pgfault` and
//! `proc::elf`/`proc::lifecycle` only ever see these trait objects, exactly
//! as the original kernel's `pgfault.c`/`proc.c` only ever call
//! `pmem_*`/`vpmap_*`/`as_*` and never touch the allocator/page-table
//! internals directly.

use crate::error::KResult;

/// A physical page frame, identified by an opaque id (an index in `vm::sim`;
/// a real backend would use a physical address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u64);

/// Page permission bits. Deliberately coarser than a real page-table entry
/// (no NX, no cacheability) — this subsystem only ever branches on
/// writability and the user/kernel split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Perm {
    pub write: bool,
    pub user: bool,
}

impl Perm {
    /// Read-only, user-accessible.
    pub const UR: Perm = Perm {
        write: false,
        user: true,
    };
    /// Read-write, user-accessible.
    pub const URW: Perm = Perm {
        write: true,
        user: true,
    };

    pub const fn read_only(self) -> Perm {
        Perm {
            write: false,
            user: self.user,
        }
    }
}

/// A contiguous virtual-address range with uniform permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemRegion {
    pub start: u32,
    pub end: u32,
    pub perm: Perm,
}

impl MemRegion {
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `[addr, addr+len)` falls entirely within this region, with no
    /// wraparound. Used by the syscall facade's user-pointer validation.
    pub fn contains_range(&self, addr: u32, len: u32) -> bool {
        match addr.checked_add(len) {
            Some(end) => addr >= self.start && end <= self.end,
            None => false,
        }
    }
}

/// The physical frame allocator and refcount table (`pmem_alloc`,
/// `pmem_free`, `pmem_dec_refcnt`, `paddr_to_page().refcnt`, §6).
pub trait PhysicalMemory: Send + Sync {
    fn alloc(&self) -> KResult<FrameId>;
    /// Free a frame unconditionally (refcount must already be zero, or the
    /// caller is tearing down without having shared it).
    fn free(&self, frame: FrameId);
    fn inc_refcnt(&self, frame: FrameId);
    /// Decrement the refcount, freeing the frame when it reaches zero.
    fn dec_refcnt(&self, frame: FrameId);
    fn refcnt(&self, frame: FrameId) -> u32;
    /// Total frames currently allocated (refcount > 0). Surfaced through
    /// the `info` syscall alongside `num_pgfault`.
    fn frames_in_use(&self) -> usize;
    fn zero(&self, frame: FrameId);
    fn write_at(&self, frame: FrameId, offset: usize, data: &[u8]);
    fn read_at(&self, frame: FrameId, offset: usize, buf: &mut [u8]);
    /// Copy the full contents of `src` into `dst` (used by the COW fault
    /// path when a shared frame's refcount is still >1 at write time).
    fn copy(&self, src: FrameId, dst: FrameId);
}

/// Constructs a fresh, empty address space (`as_init`, §6). Kept separate
/// from `PhysicalMemory` since address-space creation never touches a
/// frame — it's just a new region registry and an empty page table.
pub trait AddressSpaceFactory: Send + Sync {
    fn as_init(&self) -> Box<dyn AddressSpace>;
}

/// A process's address space: its memory regions (`as_find_memregion`,
/// `as_map_memregion`, `memregion_extend`) and its page table (`vpmap_map`,
/// `vpmap_lookup_vaddr`, `vpmap_flush_tlb`, §6).
pub trait AddressSpace: Send + Sync {
    fn find_memregion(&self, va: u32) -> Option<MemRegion>;
    fn map_memregion(&mut self, region: MemRegion) -> KResult<()>;
    /// Grow the region starting at `start` by `additional` bytes, returning
    /// its previous end address (`sbrk`'s "return the old top").
    fn extend_memregion(&mut self, start: u32, additional: u32) -> KResult<u32>;

    fn map_page(&mut self, va: u32, frame: FrameId, perm: Perm) -> KResult<()>;
    fn lookup_page(&self, va: u32) -> Option<(FrameId, Perm)>;
    fn unmap_page(&mut self, va: u32) -> Option<FrameId>;
    fn flush_tlb(&mut self, va: u32);

    /// `as_copy_as`: a copy-on-write clone of `self` into a fresh address
    /// space. Every currently-mapped page has its frame refcount bumped and
    /// is remapped read-only in *both* address spaces; memory regions are
    /// duplicated with their original (possibly writable) permission so a
    /// later COW fault knows what permission to restore.
    fn copy_as(&mut self, pmem: &dyn PhysicalMemory) -> KResult<Box<dyn AddressSpace>>;
}
