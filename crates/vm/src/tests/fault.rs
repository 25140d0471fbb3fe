use super::{Fixture, PAGE};
use crate::address::{UsizeConvert, Vaddr};
use crate::error::VmError;
use crate::fault::{FaultClass, FaultKind, FAULT_EXIT_STATUS};
use crate::page_table::PteFlags;
use crate::stats::VmStat;
use crate::tlb::TlbOps;
use crate::address_space::SharedSpace;

const READ: usize = 0;
const WRITE: usize = 1;
const READONLY: usize = 2;

fn rw() -> PteFlags {
    PteFlags::READABLE | PteFlags::WRITABLE
}

/// 区域 `[0x1000, 0x1000 + pages * PAGE)` 加用户栈，并激活
fn space_with_region(fx: &Fixture, pages: usize, flags: PteFlags) -> SharedSpace {
    let space = fx.handler.create_space();
    {
        let mut s = space.lock();
        s.define_region(Vaddr::from_usize(0x1000), pages * PAGE, flags)
            .unwrap();
        s.define_stack().unwrap();
    }
    fx.handler.activate(&space);
    space
}

#[test]
fn test_fault_kind_from_raw() {
    assert_eq!(FaultKind::try_from(READ), Ok(FaultKind::Read));
    assert_eq!(FaultKind::try_from(WRITE), Ok(FaultKind::Write));
    assert_eq!(FaultKind::try_from(READONLY), Ok(FaultKind::ReadOnly));
    assert_eq!(FaultKind::try_from(3), Err(VmError::InvalidFaultKind));
}

#[test]
fn test_first_touch_then_reload() {
    let fx = Fixture::new(16, 8);
    let space = space_with_region(&fx, 2, rw());
    assert_eq!(space.lock().page_table().len(), 14);

    let first = fx.handler.vm_fault(WRITE, 0x1000).unwrap();
    assert_eq!(first.class, FaultClass::FirstTouch);
    assert_eq!(first.vpage.as_usize(), 0x1000);
    let stats = fx.handler.stats();
    assert_eq!(stats.get(VmStat::TlbFault), 1);
    assert_eq!(stats.get(VmStat::PageFaultZero), 1);
    assert_eq!(stats.get(VmStat::TlbReload), 0);

    let second = fx.handler.vm_fault(READ, 0x1008).unwrap();
    assert_eq!(second.class, FaultClass::Reload);
    assert_eq!(second.paddr, first.paddr);
    assert_eq!(stats.get(VmStat::TlbReload), 1);
    assert_eq!(stats.get(VmStat::PageFaultZero), 1);
    assert_eq!(fx.handler.frames().get_stats().1, 1);
}

#[test]
fn test_first_touch_frame_is_zero_filled() {
    let fx = Fixture::new(4, 8);
    let base = fx.ram.base();
    for i in 0..4 {
        fx.ram.fill_page(base + i * PAGE, 0xaa);
    }
    space_with_region(&fx, 1, rw());

    let res = fx.handler.vm_fault(READ, 0x1abc).unwrap();
    for off in 0..PAGE {
        assert_eq!(fx.byte_at(res.paddr + off), 0);
    }
}

#[test]
fn test_unmapped_address_always_fails() {
    let fx = Fixture::new(4, 8);
    space_with_region(&fx, 1, rw());

    for (kind, addr) in [(READ, 0x0), (WRITE, 0x2000), (READ, 0x40_0000), (WRITE, 0x8000_0000)] {
        assert_eq!(fx.handler.vm_fault(kind, addr), Err(VmError::UnmappedAddress));
    }
    assert_eq!(fx.process.0.kills(), 4);
    assert_eq!(fx.process.0.last_status(), FAULT_EXIT_STATUS);
    assert_eq!(fx.handler.stats().get(VmStat::TlbFault), 0);
    assert_eq!(fx.handler.frames().free_frames(), 4);
}

#[test]
fn test_write_to_read_only_page_kills() {
    let fx = Fixture::new(4, 8);
    space_with_region(&fx, 1, PteFlags::READABLE | PteFlags::EXECUTABLE);

    assert_eq!(fx.handler.vm_fault(WRITE, 0x1000), Err(VmError::ReadOnlyViolation));
    assert_eq!(fx.process.0.kills(), 1);
    assert_eq!(fx.handler.frames().free_frames(), 4);

    // 读访问正常，TLB 表项不可写
    let res = fx.handler.vm_fault(READ, 0x1000).unwrap();
    let entry = fx.tlb.read(res.slot);
    assert!(entry.is_valid());
    assert!(!entry.is_dirty());
    assert_eq!(entry.paddr(), res.paddr);
}

#[test]
fn test_hardware_read_only_fault_kills() {
    let fx = Fixture::new(4, 8);
    space_with_region(&fx, 1, rw());
    fx.handler.vm_fault(WRITE, 0x1000).unwrap();

    assert_eq!(fx.handler.vm_fault(READONLY, 0x1000), Err(VmError::ReadOnlyViolation));
    assert_eq!(fx.process.0.kills(), 1);
}

#[test]
fn test_writable_page_sets_dirty_bit() {
    let fx = Fixture::new(4, 8);
    space_with_region(&fx, 1, rw());
    let res = fx.handler.vm_fault(READ, 0x1000).unwrap();
    let entry = fx.tlb.read(res.slot);
    assert!(entry.is_valid());
    assert!(entry.is_dirty());
    assert_eq!(entry.vaddr().as_usize(), 0x1000);
}

#[test]
fn test_invalid_fault_kind_does_not_kill() {
    let fx = Fixture::new(4, 8);
    space_with_region(&fx, 1, rw());
    assert_eq!(fx.handler.vm_fault(7, 0x1000), Err(VmError::InvalidFaultKind));
    assert_eq!(fx.process.0.kills(), 0);
}

#[test]
fn test_fault_without_address_space() {
    let fx = Fixture::new(4, 8);
    assert_eq!(fx.handler.vm_fault(READ, 0x1000), Err(VmError::NoAddressSpace));

    let space = space_with_region(&fx, 1, rw());
    fx.handler.deactivate();
    assert_eq!(fx.handler.vm_fault(READ, 0x1000), Err(VmError::NoAddressSpace));
    assert_eq!(fx.tlb.0.writes(), 8);
    assert_eq!(space.lock().page_table().resident_pages(), 0);
}

#[test]
fn test_out_of_memory_is_surfaced() {
    let fx = Fixture::new(1, 8);
    space_with_region(&fx, 2, rw());

    fx.handler.vm_fault(WRITE, 0x1000).unwrap();
    assert_eq!(fx.handler.vm_fault(WRITE, 0x2000), Err(VmError::OutOfMemory));
    assert_eq!(fx.process.0.kills(), 0);
    assert_eq!(fx.handler.stats().get(VmStat::PageFaultZero), 1);
}

#[test]
fn test_fills_are_round_robin() {
    let fx = Fixture::new(16, 4);
    space_with_region(&fx, 6, rw());

    for k in 0..6 {
        let res = fx.handler.vm_fault(READ, 0x1000 + k * PAGE).unwrap();
        assert_eq!(res.slot, k % 4, "fill {}", k);
    }
    let stats = fx.handler.stats();
    assert_eq!(stats.get(VmStat::TlbFault), 6);
    assert_eq!(stats.get(VmStat::TlbFaultFree), 4);
    assert_eq!(stats.get(VmStat::TlbFaultReplace), 2);
    assert_eq!(fx.handler.tlb().fills(), 6);
}

#[test]
fn test_fill_reuses_slot_on_probe_hit() {
    let fx = Fixture::new(16, 4);
    space_with_region(&fx, 2, rw());

    let a = fx.handler.vm_fault(READ, 0x1000).unwrap();
    fx.handler.vm_fault(READ, 0x2000).unwrap();
    let again = fx.handler.vm_fault(WRITE, 0x1000).unwrap();
    assert_eq!(again.slot, a.slot);

    let hits = (0..fx.tlb.slot_count())
        .filter(|&slot| fx.tlb.read(slot).hi == 0x1000)
        .count();
    assert_eq!(hits, 1);
}

#[test]
fn test_activate_invalidates_every_slot() {
    let fx = Fixture::new(16, 4);
    let space = space_with_region(&fx, 3, rw());
    for k in 0..3 {
        fx.handler.vm_fault(READ, 0x1000 + k * PAGE).unwrap();
    }

    fx.handler.activate(&space);
    let mut his = alloc::vec::Vec::new();
    for slot in 0..fx.tlb.slot_count() {
        let entry = fx.tlb.read(slot);
        assert!(!entry.is_valid());
        his.push(entry.hi);
    }
    his.sort();
    his.dedup();
    assert_eq!(his.len(), 4);
    assert_eq!(fx.handler.stats().get(VmStat::TlbInvalidate), 2);

    // 已驻留的页在新一轮缺页中是重新装入
    let res = fx.handler.vm_fault(READ, 0x2000).unwrap();
    assert_eq!(res.class, FaultClass::Reload);
}

/// 终止进程时尝试获取当前地址空间的锁，记录是否成功
struct LockCheckingProcess {
    space: sync::SpinLock<Option<SharedSpace>>,
    kills: core::sync::atomic::AtomicUsize,
    space_was_free: core::sync::atomic::AtomicBool,
}

impl crate::arch_ops::ProcessControl for LockCheckingProcess {
    fn kill_current(&self, _status: i32) {
        use core::sync::atomic::Ordering;
        let space = self.space.lock().clone();
        if let Some(space) = space {
            let free = space.try_lock().is_some();
            self.space_was_free.store(free, Ordering::SeqCst);
        }
        self.kills.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_kill_runs_after_space_lock_is_released() {
    use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use test_support::mock::vm::MockTlb;

    let (_ram, frames) = super::ready_allocator(4);
    let process = alloc::sync::Arc::new(LockCheckingProcess {
        space: sync::SpinLock::new(None),
        kills: AtomicUsize::new(0),
        space_was_free: AtomicBool::new(false),
    });
    let handler = crate::fault::FaultHandler::new(
        frames,
        alloc::sync::Arc::new(super::TestTlb(MockTlb::new(4))),
        process.clone(),
    );

    let space = handler.create_space();
    space
        .lock()
        .define_region(Vaddr::from_usize(0x1000), PAGE, PteFlags::READABLE)
        .unwrap();
    handler.activate(&space);
    *process.space.lock() = Some(space.clone());

    assert_eq!(handler.vm_fault(WRITE, 0x1000), Err(VmError::ReadOnlyViolation));
    assert!(process.space_was_free.swap(false, Ordering::SeqCst));

    assert_eq!(handler.vm_fault(READ, 0x9000), Err(VmError::UnmappedAddress));
    assert!(process.space_was_free.load(Ordering::SeqCst));
    assert_eq!(process.kills.load(Ordering::SeqCst), 2);
}
