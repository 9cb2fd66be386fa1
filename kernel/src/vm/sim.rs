//! Host-memory reference implementation of the VM contract.
//!
//! `SimPhysicalMemory` is a bump-allocated, refcounted pool of page-sized
//! byte buffers — the same bitmap-allocator responsibilities as the
//! teacher's `memory::physical` (alloc/free/refcount a fixed frame pool),
//! implemented over a growable `Vec` instead of a static bitmap since there
//! is no real physical address space to bound it to. `SimAddressSpace`
//! mirrors `memory::vma`'s `BTreeMap<start, Vma>` region registry and adds
//! a page table as a plain `HashMap`, since this crate has no real MMU to
//! program.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::config::KernelConfig;
use crate::error::{KResult, KernelError};
use crate::vm::contract::{AddressSpace, AddressSpaceFactory, FrameId, MemRegion, Perm, PhysicalMemory};

struct FrameSlot {
    data: Vec<u8>,
    refcnt: u32,
    live: bool,
}

pub struct SimPhysicalMemory {
    page_size: usize,
    frames: Mutex<Vec<FrameSlot>>,
}

impl SimPhysicalMemory {
    pub fn new(cfg: &KernelConfig) -> Self {
        SimPhysicalMemory {
            page_size: cfg.page_size as usize,
            frames: Mutex::new(Vec::new()),
        }
    }
}

impl PhysicalMemory for SimPhysicalMemory {
    fn alloc(&self) -> KResult<FrameId> {
        let mut frames = self.frames.lock().unwrap();
        if let Some((i, slot)) = frames.iter_mut().enumerate().find(|(_, s)| !s.live) {
            slot.live = true;
            slot.refcnt = 1;
            slot.data.iter_mut().for_each(|b| *b = 0);
            return Ok(FrameId(i as u64));
        }
        let id = frames.len() as u64;
        frames.push(FrameSlot {
            data: vec![0u8; self.page_size],
            refcnt: 1,
            live: true,
        });
        Ok(FrameId(id))
    }

    fn free(&self, frame: FrameId) {
        let mut frames = self.frames.lock().unwrap();
        if let Some(slot) = frames.get_mut(frame.0 as usize) {
            slot.live = false;
            slot.refcnt = 0;
        }
    }

    fn inc_refcnt(&self, frame: FrameId) {
        let mut frames = self.frames.lock().unwrap();
        if let Some(slot) = frames.get_mut(frame.0 as usize) {
            slot.refcnt += 1;
        }
    }

    fn dec_refcnt(&self, frame: FrameId) {
        let mut frames = self.frames.lock().unwrap();
        if let Some(slot) = frames.get_mut(frame.0 as usize) {
            slot.refcnt = slot.refcnt.saturating_sub(1);
            if slot.refcnt == 0 {
                slot.live = false;
            }
        }
    }

    fn refcnt(&self, frame: FrameId) -> u32 {
        self.frames
            .lock()
            .unwrap()
            .get(frame.0 as usize)
            .map(|s| s.refcnt)
            .unwrap_or(0)
    }

    fn frames_in_use(&self) -> usize {
        self.frames.lock().unwrap().iter().filter(|s| s.live).count()
    }

    fn zero(&self, frame: FrameId) {
        let mut frames = self.frames.lock().unwrap();
        if let Some(slot) = frames.get_mut(frame.0 as usize) {
            slot.data.iter_mut().for_each(|b| *b = 0);
        }
    }

    fn write_at(&self, frame: FrameId, offset: usize, data: &[u8]) {
        let mut frames = self.frames.lock().unwrap();
        if let Some(slot) = frames.get_mut(frame.0 as usize) {
            let end = (offset + data.len()).min(slot.data.len());
            if offset < end {
                slot.data[offset..end].copy_from_slice(&data[..end - offset]);
            }
        }
    }

    fn read_at(&self, frame: FrameId, offset: usize, buf: &mut [u8]) {
        let frames = self.frames.lock().unwrap();
        if let Some(slot) = frames.get(frame.0 as usize) {
            let end = (offset + buf.len()).min(slot.data.len());
            if offset < end {
                buf[..end - offset].copy_from_slice(&slot.data[offset..end]);
            }
        }
    }

    fn copy(&self, src: FrameId, dst: FrameId) {
        let mut frames = self.frames.lock().unwrap();
        let data = frames[src.0 as usize].data.clone();
        frames[dst.0 as usize].data.copy_from_slice(&data);
    }
}

/// A process's address space: a region registry plus a flat page table.
pub struct SimAddressSpace {
    page_size: u32,
    regions: BTreeMap<u32, MemRegion>,
    page_table: HashMap<u32, (FrameId, Perm)>,
}

impl SimAddressSpace {
    pub fn new(cfg: &KernelConfig) -> Self {
        SimAddressSpace {
            page_size: cfg.page_size,
            regions: BTreeMap::new(),
            page_table: HashMap::new(),
        }
    }
}

impl AddressSpace for SimAddressSpace {
    fn find_memregion(&self, va: u32) -> Option<MemRegion> {
        self.regions
            .range(..=va)
            .next_back()
            .map(|(_, r)| *r)
            .filter(|r| va >= r.start && va < r.end)
    }

    fn map_memregion(&mut self, region: MemRegion) -> KResult<()> {
        if region.start >= region.end && !region.is_empty() {
            return Err(KernelError::Inval);
        }
        self.regions.insert(region.start, region);
        Ok(())
    }

    fn extend_memregion(&mut self, start: u32, additional: u32) -> KResult<u32> {
        let region = self.regions.get_mut(&start).ok_or(KernelError::Inval)?;
        let old_end = region.end;
        region.end = region
            .end
            .checked_add(additional)
            .ok_or(KernelError::Inval)?;
        Ok(old_end)
    }

    fn map_page(&mut self, va: u32, frame: FrameId, perm: Perm) -> KResult<()> {
        let page = va & !(self.page_size - 1);
        self.page_table.insert(page, (frame, perm));
        Ok(())
    }

    fn lookup_page(&self, va: u32) -> Option<(FrameId, Perm)> {
        let page = va & !(self.page_size - 1);
        self.page_table.get(&page).copied()
    }

    fn unmap_page(&mut self, va: u32) -> Option<FrameId> {
        let page = va & !(self.page_size - 1);
        self.page_table.remove(&page).map(|(f, _)| f)
    }

    fn flush_tlb(&mut self, _va: u32) {}

    fn copy_as(&mut self, pmem: &dyn PhysicalMemory) -> KResult<Box<dyn AddressSpace>> {
        let mut child = SimAddressSpace {
            page_size: self.page_size,
            regions: self.regions.clone(),
            page_table: HashMap::new(),
        };
        let pages: Vec<u32> = self.page_table.keys().copied().collect();
        for page in pages {
            let (frame, perm) = self.page_table[&page];
            pmem.inc_refcnt(frame);
            let ro = perm.read_only();
            self.page_table.insert(page, (frame, ro));
            child.page_table.insert(page, (frame, ro));
        }
        Ok(Box::new(child))
    }
}

/// `as_init`: hands out a fresh `SimAddressSpace` for every new process.
pub struct SimAddressSpaceFactory {
    cfg: KernelConfig,
}

impl SimAddressSpaceFactory {
    pub fn new(cfg: &KernelConfig) -> Self {
        SimAddressSpaceFactory { cfg: *cfg }
    }
}

impl AddressSpaceFactory for SimAddressSpaceFactory {
    fn as_init(&self) -> Box<dyn AddressSpace> {
        Box::new(SimAddressSpace::new(&self.cfg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_free_reuses_slot() {
        let cfg = KernelConfig::default();
        let pmem = SimPhysicalMemory::new(&cfg);
        let a = pmem.alloc().unwrap();
        pmem.dec_refcnt(a);
        let b = pmem.alloc().unwrap();
        assert_eq!(a, b, "freed frame must be reused rather than growing the pool");
    }

    #[test]
    fn refcount_reaches_zero_and_frees() {
        let cfg = KernelConfig::default();
        let pmem = SimPhysicalMemory::new(&cfg);
        let f = pmem.alloc().unwrap();
        pmem.inc_refcnt(f);
        assert_eq!(pmem.refcnt(f), 2);
        pmem.dec_refcnt(f);
        assert_eq!(pmem.refcnt(f), 1);
        assert_eq!(pmem.frames_in_use(), 1);
        pmem.dec_refcnt(f);
        assert_eq!(pmem.frames_in_use(), 0);
    }

    #[test]
    fn copy_as_shares_frame_and_downgrades_to_readonly() {
        let cfg = KernelConfig::default();
        let pmem = SimPhysicalMemory::new(&cfg);
        let mut parent = SimAddressSpace::new(&cfg);
        let frame = pmem.alloc().unwrap();
        parent.map_page(0x1000, frame, Perm::URW).unwrap();
        let child = parent.copy_as(&pmem).unwrap();
        assert_eq!(pmem.refcnt(frame), 2);
        let (pf, pp) = parent.lookup_page(0x1000).unwrap();
        let (cf, cp) = child.lookup_page(0x1000).unwrap();
        assert_eq!(pf, cf);
        assert!(!pp.write && !cp.write);
    }

    #[test]
    fn find_memregion_respects_exclusive_end() {
        let cfg = KernelConfig::default();
        let mut as_ = SimAddressSpace::new(&cfg);
        as_.map_memregion(MemRegion {
            start: 0x1000,
            end: 0x2000,
            perm: Perm::URW,
        })
        .unwrap();
        assert!(as_.find_memregion(0x1000).is_some());
        assert!(as_.find_memregion(0x1fff).is_some());
        assert!(as_.find_memregion(0x2000).is_none());
    }
}
