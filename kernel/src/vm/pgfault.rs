//! Component C: the page-fault handler (spec §4.C).
//!
//! Grounded on the policy in `original_source/kernel/pgfault.c` together
//! with spec §4.C's restatement of it, and on the teacher's demand-paged
//! stack precedent in `task/loader.rs` (map one page eagerly, leave the
//! rest to later faults). The original's copy-on-write branch is a stub
//! (`error(user)`); spec §4.C and §9 require it actually be implemented,
//! which is what `resolve` does below.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::KernelConfig;
use crate::error::{KResult, KernelError};
use crate::vm::contract::{AddressSpace, PhysicalMemory};

/// Global count of faults taken on behalf of user code, surfaced through
/// the `info` syscall as `num_pgfault`.
#[derive(Default)]
pub struct FaultCounter(AtomicU64);

impl FaultCounter {
    pub const fn new() -> Self {
        FaultCounter(AtomicU64::new(0))
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

/// Resolve a page fault at `va`. `user` selects whether this counts toward
/// `num_pgfault`; both kernel and user faults share the same resolution
/// policy here since this crate has no separate kernel address space.
pub fn resolve(
    as_: &mut dyn AddressSpace,
    pmem: &dyn PhysicalMemory,
    cfg: &KernelConfig,
    counter: &FaultCounter,
    va: u32,
    present: bool,
    write: bool,
    user: bool,
) -> KResult<()> {
    if user {
        counter.increment();
    }

    let region = as_.find_memregion(va).ok_or(KernelError::Fault)?;
    if va == region.end {
        return Err(KernelError::Fault);
    }
    if write && !region.perm.write {
        return Err(KernelError::Fault);
    }

    let page = cfg.page_round_down(va);

    if !present {
        let frame = pmem.alloc().map_err(|_| KernelError::PgFaultAlloc)?;
        pmem.zero(frame);
        if as_.map_page(page, frame, region.perm).is_err() {
            pmem.dec_refcnt(frame);
            return Err(KernelError::VpmapMap);
        }
        as_.flush_tlb(page);
        return Ok(());
    }

    if !write {
        // Present and not a write: nothing in this subsystem's policy
        // produces a fault here other than a protection violation.
        return Err(KernelError::Fault);
    }

    // Present + write: must be a copy-on-write fault.
    let (frame, _old_perm) = as_.lookup_page(page).ok_or(KernelError::Fault)?;
    let new_frame = if pmem.refcnt(frame) > 1 {
        let nf = pmem.alloc().map_err(|_| KernelError::PgFaultAlloc)?;
        pmem.copy(frame, nf);
        pmem.dec_refcnt(frame);
        nf
    } else {
        frame
    };
    if as_.map_page(page, new_frame, region.perm).is_err() {
        return Err(KernelError::VpmapMap);
    }
    as_.flush_tlb(page);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::contract::{MemRegion, Perm};
    use crate::vm::sim::{SimAddressSpace, SimPhysicalMemory};

    fn region(cfg: &KernelConfig) -> MemRegion {
        MemRegion {
            start: 0x1000,
            end: 0x1000 + cfg.page_size * 4,
            perm: Perm::URW,
        }
    }

    #[test]
    fn not_present_fault_zero_fills_and_maps() {
        let cfg = KernelConfig::default();
        let pmem = SimPhysicalMemory::new(&cfg);
        let mut as_ = SimAddressSpace::new(&cfg);
        as_.map_memregion(region(&cfg)).unwrap();
        let counter = FaultCounter::new();

        resolve(&mut as_, &pmem, &cfg, &counter, 0x1000, false, false, true).unwrap();
        assert_eq!(counter.get(), 1);
        let (frame, perm) = as_.lookup_page(0x1000).unwrap();
        assert!(perm.write);
        let mut buf = [0xffu8; 4];
        pmem.read_at(frame, 0, &mut buf);
        assert_eq!(buf, [0, 0, 0, 0]);
    }

    #[test]
    fn fault_outside_any_region_is_rejected() {
        let cfg = KernelConfig::default();
        let pmem = SimPhysicalMemory::new(&cfg);
        let mut as_ = SimAddressSpace::new(&cfg);
        let counter = FaultCounter::new();
        assert_eq!(
            resolve(&mut as_, &pmem, &cfg, &counter, 0x9000, false, false, true),
            Err(KernelError::Fault)
        );
    }

    #[test]
    fn cow_fault_with_shared_frame_copies_and_keeps_parent_untouched() {
        let cfg = KernelConfig::default();
        let pmem = SimPhysicalMemory::new(&cfg);
        let mut parent = SimAddressSpace::new(&cfg);
        parent.map_memregion(region(&cfg)).unwrap();
        let counter = FaultCounter::new();
        resolve(&mut parent, &pmem, &cfg, &counter, 0x1000, false, false, true).unwrap();
        let (frame, _) = parent.lookup_page(0x1000).unwrap();
        pmem.write_at(frame, 0, &[0x11; 1]);

        let mut child = parent.copy_as(&pmem).unwrap();
        assert_eq!(pmem.refcnt(frame), 2);

        resolve(&mut *child, &pmem, &cfg, &counter, 0x1000, true, true, true).unwrap();
        let (child_frame, child_perm) = child.lookup_page(0x1000).unwrap();
        assert!(child_perm.write);
        assert_ne!(child_frame, frame, "write must fork off a private frame while shared");

        pmem.write_at(child_frame, 0, &[0x22; 1]);
        let mut parent_byte = [0u8; 1];
        pmem.read_at(frame, 0, &mut parent_byte);
        assert_eq!(parent_byte, [0x11], "parent's frame must be unaffected by child's write");
    }

    #[test]
    fn cow_fault_with_sole_owner_just_upgrades_permission() {
        let cfg = KernelConfig::default();
        let pmem = SimPhysicalMemory::new(&cfg);
        let mut as_ = SimAddressSpace::new(&cfg);
        as_.map_memregion(region(&cfg)).unwrap();
        let counter = FaultCounter::new();
        resolve(&mut as_, &pmem, &cfg, &counter, 0x1000, false, false, true).unwrap();
        let (frame_before, _) = as_.lookup_page(0x1000).unwrap();
        // Downgrade to read-only as copy_as would, without actually sharing.
        as_.map_page(0x1000, frame_before, Perm::UR).unwrap();

        resolve(&mut as_, &pmem, &cfg, &counter, 0x1000, true, true, true).unwrap();
        let (frame_after, perm_after) = as_.lookup_page(0x1000).unwrap();
        assert_eq!(frame_before, frame_after, "sole owner must not fork a new frame");
        assert!(perm_after.write);
    }
}
