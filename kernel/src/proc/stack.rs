//! Component D, part 2: `stack_setup` (spec §4.D).
//!
//! The design note (spec §9) resolves its own "two versions disagree"
//! open question in favor of the full layout, which is what this builds:
//! a 10-page stack region, one eagerly-mapped top page, argv strings
//! packed downward from its end, then a word-aligned
//! `{fake_return_pc, argc, argv_ptr}` header immediately followed by the
//! `char*` array — all written with a single block copy into that page,
//! mirroring `task/loader.rs`'s eager-top-page/demand-paged-rest split.

use crate::config::KernelConfig;
use crate::error::{KResult, KernelError};
use crate::vm::contract::{AddressSpace, MemRegion, Perm, PhysicalMemory};

/// Bitwise-NOT of 1: spec §6's fake-return sentinel, pushed as the return
/// address a freshly-spawned program would "return into" if it ever did.
const FAKE_RETURN_PC: u32 = !1u32;

/// Build the initial stack for a process about to run, returning the user
/// stack pointer. `argv` is capped at `cfg.max_argv` entries; anything
/// beyond that is silently truncated (spec §4.D).
pub fn setup(
    as_: &mut dyn AddressSpace,
    pmem: &dyn PhysicalMemory,
    cfg: &KernelConfig,
    argv: &[String],
) -> KResult<u32> {
    let region = MemRegion {
        start: cfg.stack_region_start(),
        end: cfg.ustack_upperbound,
        perm: Perm::URW,
    };
    as_.map_memregion(region)?;

    let top_page = cfg.ustack_upperbound - cfg.page_size;
    let frame = pmem.alloc().map_err(|_| KernelError::NoMem)?;
    pmem.zero(frame);
    if as_.map_page(top_page, frame, Perm::URW).is_err() {
        pmem.dec_refcnt(frame);
        return Err(KernelError::VpmapMap);
    }

    let argv: Vec<&str> = argv.iter().take(cfg.max_argv).map(|s| s.as_str()).collect();
    let mut local = vec![0u8; cfg.page_size as usize];
    let page_top = cfg.ustack_upperbound;
    let mut cursor = page_top;

    let mut arg_addrs = Vec::with_capacity(argv.len());
    for s in argv.iter().rev() {
        let bytes = s.as_bytes();
        let needed = bytes.len() as u32 + 1;
        if cursor < top_page + needed {
            return Err(KernelError::NoMem);
        }
        cursor -= needed;
        let off = (cursor - top_page) as usize;
        local[off..off + bytes.len()].copy_from_slice(bytes);
        local[off + bytes.len()] = 0;
        arg_addrs.push(cursor);
    }
    arg_addrs.reverse();

    cursor &= !0x3;
    let argc = arg_addrs.len() as u32;
    let header_words = 3 + argc;
    let header_bytes = header_words * 4;
    if cursor < top_page + header_bytes {
        return Err(KernelError::NoMem);
    }
    cursor -= header_bytes;
    let block_base = cursor;
    let argv_ptr = block_base + 12;

    let mut off = (block_base - top_page) as usize;
    local[off..off + 4].copy_from_slice(&FAKE_RETURN_PC.to_le_bytes());
    off += 4;
    local[off..off + 4].copy_from_slice(&argc.to_le_bytes());
    off += 4;
    local[off..off + 4].copy_from_slice(&argv_ptr.to_le_bytes());
    off += 4;
    for addr in &arg_addrs {
        local[off..off + 4].copy_from_slice(&addr.to_le_bytes());
        off += 4;
    }

    pmem.write_at(frame, 0, &local);
    Ok(block_base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::sim::{SimAddressSpace, SimPhysicalMemory};

    #[test]
    fn stack_region_and_top_page_are_mapped() {
        let cfg = KernelConfig::default();
        let pmem = SimPhysicalMemory::new(&cfg);
        let mut as_ = SimAddressSpace::new(&cfg);
        let sp = setup(&mut as_, &pmem, &cfg, &[]).unwrap();
        assert!(sp < cfg.ustack_upperbound);
        assert!(sp >= cfg.stack_region_start());
        assert!(as_.lookup_page(cfg.ustack_upperbound - cfg.page_size).is_some());
    }

    #[test]
    fn argv_layout_round_trips_through_frame() {
        let cfg = KernelConfig::default();
        let pmem = SimPhysicalMemory::new(&cfg);
        let mut as_ = SimAddressSpace::new(&cfg);
        let argv = vec!["echo".to_string(), "hi".to_string()];
        let sp = setup(&mut as_, &pmem, &cfg, &argv).unwrap();

        let (frame, _) = as_.lookup_page(cfg.ustack_upperbound - cfg.page_size).unwrap();
        let off = (sp - (cfg.ustack_upperbound - cfg.page_size)) as usize;
        let mut header = [0u8; 12];
        pmem.read_at(frame, off, &mut header);
        let fake_ret = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let argc = u32::from_le_bytes(header[4..8].try_into().unwrap());
        assert_eq!(fake_ret, FAKE_RETURN_PC);
        assert_eq!(argc, 2);
    }

    #[test]
    fn argv_beyond_cap_is_truncated() {
        let mut cfg = KernelConfig::default();
        cfg.max_argv = 1;
        let pmem = SimPhysicalMemory::new(&cfg);
        let mut as_ = SimAddressSpace::new(&cfg);
        let argv = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let sp = setup(&mut as_, &pmem, &cfg, &argv).unwrap();

        let (frame, _) = as_.lookup_page(cfg.ustack_upperbound - cfg.page_size).unwrap();
        let off = (sp - (cfg.ustack_upperbound - cfg.page_size)) as usize;
        let mut header = [0u8; 8];
        pmem.read_at(frame, off, &mut header);
        let argc = u32::from_le_bytes(header[4..8].try_into().unwrap());
        assert_eq!(argc, 1);
    }
}
