//! 硬件 TLB 的抽象与填充策略
//!
//! 槽位替换采用严格轮转：第 k 次填充写入槽位 `k mod N`，
//! 计数器在每次填充时递增，不区分首次访问与重新装入。
//! 如果探测发现该虚拟页已经在某个槽位中，则直接复用该槽位，
//! 避免 TLB 中出现重复的表项。
//!
//! 不做任何基于最近使用情况的替换；这就是预期行为。

use crate::address::{AlignOps, Paddr, UsizeConvert, Vaddr};
use crate::stats::{VmStat, VmStats};
use crate::vm_config;
use alloc::sync::Arc;
use bitflags::bitflags;
use core::sync::atomic::{AtomicUsize, Ordering};
use sync::IntrGuard;

bitflags! {
    /// TLB 表项低位字中的标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TlbLoFlags: usize {
        /// 有效
        const VALID = 1 << 9;
        /// 可写（硬件称为 dirty）；未置位时写访问触发只读异常
        const DIRTY = 1 << 10;
    }
}

/// 无效表项使用的高位字基址，位于内核段，不会与任何用户地址匹配
const INVALID_HI_BASE: usize = 0x8000_0000;

/// 一个 TLB 表项：虚拟页 (hi) 与物理帧加标志 (lo)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlbEntry {
    /// 虚拟页起始地址
    pub hi: usize,
    /// 物理帧起始地址与 [`TlbLoFlags`]
    pub lo: usize,
}

impl TlbEntry {
    /// 构造一个有效表项
    pub fn new(vaddr: Vaddr, paddr: Paddr, dirty: bool) -> Self {
        let mut flags = TlbLoFlags::VALID;
        flags.set(TlbLoFlags::DIRTY, dirty);
        Self {
            hi: vaddr.align_down_to_page().as_usize(),
            lo: paddr.align_down_to_page().as_usize() | flags.bits(),
        }
    }

    /// 槽位 `slot` 的无效表项；每个槽位的高位字互不相同
    pub fn invalid(slot: usize) -> Self {
        Self {
            hi: INVALID_HI_BASE + slot * vm_config().page_size(),
            lo: 0,
        }
    }

    /// 低位字中的标志
    pub fn flags(&self) -> TlbLoFlags {
        TlbLoFlags::from_bits_truncate(self.lo)
    }

    /// 是否有效
    pub fn is_valid(&self) -> bool {
        self.flags().contains(TlbLoFlags::VALID)
    }

    /// 是否可写
    pub fn is_dirty(&self) -> bool {
        self.flags().contains(TlbLoFlags::DIRTY)
    }

    /// 虚拟页地址
    pub fn vaddr(&self) -> Vaddr {
        Vaddr::from_usize(self.hi)
    }

    /// 物理帧地址
    pub fn paddr(&self) -> Paddr {
        Paddr::from_usize(self.lo).align_down_to_page()
    }
}

/// 硬件 TLB 操作
pub trait TlbOps: Send + Sync {
    /// 槽位数量 N
    fn slot_count(&self) -> usize;

    /// 读取槽位
    fn read(&self, slot: usize) -> TlbEntry;

    /// 写入槽位
    fn write(&self, slot: usize, entry: TlbEntry);

    /// 查找高位字为 `hi` 的槽位
    fn probe(&self, hi: usize) -> Option<usize>;
}

/// 带轮转替换策略的 TLB
pub struct Tlb {
    hw: Arc<dyn TlbOps>,
    fills: AtomicUsize,
    stats: Arc<VmStats>,
}

impl Tlb {
    /// 包装硬件 TLB
    ///
    /// # Panics
    /// 硬件报告的槽位数为 0 时 panic。
    pub fn new(hw: Arc<dyn TlbOps>, stats: Arc<VmStats>) -> Self {
        assert!(hw.slot_count() > 0, "tlb: hardware reports no slots");
        Self {
            hw,
            fills: AtomicUsize::new(0),
            stats,
        }
    }

    /// 槽位数量
    pub fn slot_count(&self) -> usize {
        self.hw.slot_count()
    }

    /// 读取槽位
    pub fn read(&self, slot: usize) -> TlbEntry {
        self.hw.read(slot)
    }

    /// 迄今为止的填充次数
    pub fn fills(&self) -> usize {
        self.fills.load(Ordering::Relaxed)
    }

    /// 使所有槽位失效
    pub fn invalidate_all(&self) {
        let _guard = IntrGuard::new();
        for slot in 0..self.hw.slot_count() {
            self.hw.write(slot, TlbEntry::invalid(slot));
        }
        self.stats.inc(VmStat::TlbInvalidate);
    }

    /// 装入 `vaddr -> paddr`，返回写入的槽位
    ///
    /// `writable` 决定 dirty 位。调用者需保证中断已关闭。
    pub fn fill(&self, vaddr: Vaddr, paddr: Paddr, writable: bool) -> usize {
        let entry = TlbEntry::new(vaddr, paddr, writable);
        let k = self.fills.fetch_add(1, Ordering::Relaxed);
        let slot = match self.hw.probe(entry.hi) {
            Some(slot) => slot,
            None => k % self.hw.slot_count(),
        };

        self.stats.inc(VmStat::TlbFault);
        if self.hw.read(slot).is_valid() {
            self.stats.inc(VmStat::TlbFaultReplace);
        } else {
            self.stats.inc(VmStat::TlbFaultFree);
        }

        self.hw.write(slot, entry);
        slot
    }
}
