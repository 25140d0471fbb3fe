//! 虚拟内存相关硬件的 Mock 实现
//!
//! 注意：这里不直接依赖 `vm` crate（避免循环依赖）。
//! `vm` crate 在 `cfg(test)` 下为这些类型实现其 trait（例如 `ArchVmOps` / `TlbOps`）。

use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};

/// Mock 页大小
pub const MOCK_PAGE_SIZE: usize = 4096;

/// Mock 的虚拟内存配置
pub struct MockVmConfig;

impl MockVmConfig {
    pub const fn new() -> Self {
        Self
    }

    pub fn page_size(&self) -> usize {
        MOCK_PAGE_SIZE
    }

    pub fn user_stack_top(&self) -> usize {
        0x8000_0000
    }

    pub fn user_stack_pages(&self) -> usize {
        12
    }
}

/// 全局 Mock 实例
pub static MOCK_VM_CONFIG: MockVmConfig = MockVmConfig::new();

/// 模拟物理内存
///
/// 在宿主堆上申请一块按页对齐的内存，并把宿主地址直接当作“物理地址”
/// （恒等映射，paddr == kvaddr），这样测试可以直接读写帧内容。
///
/// `ram_stealmem` 是一个只增不减的 bump 分配器，与引导期的行为一致。
pub struct MockRam {
    base: usize,
    layout: Layout,
    first: AtomicUsize,
    last: usize,
}

impl MockRam {
    /// 创建一块包含 `frames` 个页帧的模拟内存
    pub fn new(frames: usize) -> Self {
        let size = frames.max(1) * MOCK_PAGE_SIZE;
        let layout = Layout::from_size_align(size, MOCK_PAGE_SIZE).expect("mock ram layout");
        // SAFETY: layout 大小非零
        let base = unsafe { alloc_zeroed(layout) } as usize;
        assert!(base != 0, "mock ram: host allocation failed");
        Self {
            base,
            layout,
            first: AtomicUsize::new(base),
            last: base + frames * MOCK_PAGE_SIZE,
        }
    }

    /// 当前可用物理内存范围 `[first, last)`
    pub fn ram_getsize(&self) -> (usize, usize) {
        (self.first.load(Ordering::SeqCst), self.last)
    }

    /// 引导期分配：从低端切走 `npages` 页，永不归还
    pub fn ram_stealmem(&self, npages: usize) -> Option<usize> {
        let size = npages * MOCK_PAGE_SIZE;
        self.first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |first| {
                (first + size <= self.last).then_some(first + size)
            })
            .ok()
    }

    /// 整块内存的起始物理地址（不随 steal 变化）
    pub fn base(&self) -> usize {
        self.base
    }

    pub fn paddr_to_kvaddr(&self, paddr: usize) -> usize {
        paddr
    }

    pub fn kvaddr_to_paddr(&self, kvaddr: usize) -> usize {
        kvaddr
    }

    /// 读取一个物理地址处的字节
    pub fn read_byte(&self, paddr: usize) -> u8 {
        self.check(paddr);
        // SAFETY: 地址位于本 MockRam 的宿主分配内
        unsafe { core::ptr::read_volatile(paddr as *const u8) }
    }

    /// 向一个物理地址写入字节
    pub fn write_byte(&self, paddr: usize, value: u8) {
        self.check(paddr);
        // SAFETY: 地址位于本 MockRam 的宿主分配内
        unsafe { core::ptr::write_volatile(paddr as *mut u8, value) }
    }

    /// 用 `value` 填满从 `paddr` 开始的一页
    pub fn fill_page(&self, paddr: usize, value: u8) {
        for off in 0..MOCK_PAGE_SIZE {
            self.write_byte(paddr + off, value);
        }
    }

    fn check(&self, paddr: usize) {
        assert!(
            paddr >= self.base && paddr < self.base + self.layout.size(),
            "mock ram: paddr {:#x} out of range",
            paddr
        );
    }
}

impl Drop for MockRam {
    fn drop(&mut self) {
        // SAFETY: base/layout 来自 new 中的 alloc_zeroed
        unsafe { dealloc(self.base as *mut u8, self.layout) };
    }
}

/// 模拟 TLB
///
/// 每个槽位保存原始的 (hi, lo) 两个字；`probe` 只按 hi 匹配，与硬件一致。
pub struct MockTlb {
    hi: Vec<AtomicUsize>,
    lo: Vec<AtomicUsize>,
    writes: AtomicUsize,
}

impl MockTlb {
    pub fn new(slots: usize) -> Self {
        Self {
            hi: (0..slots).map(|_| AtomicUsize::new(0)).collect(),
            lo: (0..slots).map(|_| AtomicUsize::new(0)).collect(),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.hi.len()
    }

    pub fn read(&self, slot: usize) -> (usize, usize) {
        (
            self.hi[slot].load(Ordering::SeqCst),
            self.lo[slot].load(Ordering::SeqCst),
        )
    }

    pub fn write(&self, slot: usize, hi: usize, lo: usize) {
        self.hi[slot].store(hi, Ordering::SeqCst);
        self.lo[slot].store(lo, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    pub fn probe(&self, hi: usize) -> Option<usize> {
        self.hi
            .iter()
            .position(|slot| slot.load(Ordering::SeqCst) == hi)
    }

    /// 累计写入次数
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

/// 模拟进程控制：记录被终止的次数和最后一次的退出码
pub struct MockProcess {
    kills: AtomicUsize,
    last_status: AtomicIsize,
}

impl MockProcess {
    pub const fn new() -> Self {
        Self {
            kills: AtomicUsize::new(0),
            last_status: AtomicIsize::new(0),
        }
    }

    pub fn kill_current(&self, status: i32) {
        self.last_status.store(status as isize, Ordering::SeqCst);
        self.kills.fetch_add(1, Ordering::SeqCst);
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub fn last_status(&self) -> i32 {
        self.last_status.load(Ordering::SeqCst) as i32
    }
}
