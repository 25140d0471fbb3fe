//! 帧分配器模块
//!
//! 本模块提供物理内存帧的分配和回收功能。
//!
//! ## 生命周期
//!
//! 分配器有两个状态：
//!
//! - **Uninitialized**：帧表尚未建立。此时 [`FrameAllocator::allocate`] 直接委托给
//!   引导期的 bump 分配器（[`ArchVmOps::ram_stealmem`]），分配出的内存永不归还，
//!   只适合存放常驻的引导期数据结构。
//! - **Ready**：[`FrameAllocator::initialize`] 建立帧表之后，所有分配都只经过帧表。
//!
//! ## 分配策略（帧表）
//!
//! 帧表按物理地址升序保存每个帧的记录：
//!
//! - **used**：该帧是否已被占用
//! - **run_len**：仅在一次分配的首帧上记录本次分配的帧数，其余帧为 `None`
//!
//! 分配时从头线性扫描，找到第一段足够长的连续空闲帧（first-fit）。
//! 状态只有“占用/空闲”两种，不做合并；碎片由每次的完整扫描处理。
//!
//! 释放时必须传入某次分配返回的首地址。释放非首帧、未分配的帧或引导期内存
//! 都属于调用者违约，直接 panic，而不是悄悄破坏帧表。
//!
//! ## 并发
//!
//! 帧表由 [`SpinLock`] 保护，持锁期间本地中断关闭。

use crate::address::{Paddr, UsizeConvert};
use crate::arch_ops::ArchVmOps;
use crate::vm_config;
use alloc::sync::Arc;
use alloc::vec::Vec;
use sync::SpinLock;

/// 帧表中的一条记录
#[derive(Debug, Clone, Copy)]
struct Frame {
    /// 帧的起始物理地址
    paddr: Paddr,
    /// 是否已占用
    used: bool,
    /// 以本帧为首的分配长度；非首帧为 `None`
    run_len: Option<usize>,
}

/// 帧表：分配器进入 Ready 状态后的全部数据
struct FrameTable {
    /// 第一个帧的物理地址
    base: Paddr,
    /// 按地址升序排列的帧记录
    frames: Vec<Frame>,
    /// 已占用的帧数（含引导期占用的帧）
    used_count: usize,
}

impl FrameTable {
    /// 物理地址对应的帧下标
    fn index_of(&self, paddr: Paddr, page_size: usize) -> Option<usize> {
        let addr = paddr.as_usize();
        let base = self.base.as_usize();
        if addr < base || (addr - base) % page_size != 0 {
            return None;
        }
        let idx = (addr - base) / page_size;
        (idx < self.frames.len()).then_some(idx)
    }

    /// first-fit 查找 `npages` 个连续空闲帧
    fn alloc_run(&mut self, npages: usize) -> Option<Paddr> {
        let mut count = 0;
        for i in 0..self.frames.len() {
            if self.frames[i].used {
                count = 0;
                continue;
            }
            count += 1;
            if count == npages {
                let head = i + 1 - npages;
                for frame in &mut self.frames[head..=i] {
                    frame.used = true;
                }
                self.frames[head].run_len = Some(npages);
                self.used_count += npages;
                return Some(self.frames[head].paddr);
            }
        }
        None
    }

    /// 释放以 `paddr` 为首的一次分配
    fn release_run(&mut self, paddr: Paddr, page_size: usize) -> usize {
        let head = self
            .index_of(paddr, page_size)
            .unwrap_or_else(|| panic!("release: {} is not a frame managed by this allocator", paddr));
        let len = self.frames[head]
            .run_len
            .unwrap_or_else(|| panic!("release: {} is not the head of an allocated run", paddr));

        for frame in &mut self.frames[head..head + len] {
            assert!(frame.used, "release: frame {} in run is already free", frame.paddr);
            frame.used = false;
        }
        self.frames[head].run_len = None;
        self.used_count -= len;
        len
    }
}

/// 分配器的生命周期状态
enum AllocatorState {
    /// 帧表尚未建立；记录创建分配器时物理内存的起点
    Uninitialized { ram_base: Paddr },
    /// 帧表已建立
    Ready(FrameTable),
}

/// 物理帧分配器。
///
/// 以 [`Arc`] 的形式注入到 [`crate::AddressSpace`] 与 [`crate::FaultHandler`] 中。
pub struct FrameAllocator {
    arch: Arc<dyn ArchVmOps>,
    state: SpinLock<AllocatorState>,
}

impl FrameAllocator {
    /// 创建一个处于 Uninitialized 状态的分配器。
    ///
    /// 此时物理内存的起点被记录下来；此后经由本分配器做出的引导期分配，
    /// 会在 [`FrameAllocator::initialize`] 时被标记为已占用。
    pub fn new(arch: Arc<dyn ArchVmOps>) -> Self {
        let (first, _) = arch.ram_getsize();
        let page_size = vm_config().page_size();
        let ram_base = Paddr::from_usize(first.div_ceil(page_size) * page_size);
        FrameAllocator {
            arch,
            state: SpinLock::new(AllocatorState::Uninitialized { ram_base }),
        }
    }

    /// 建立帧表并进入 Ready 状态。
    ///
    /// # Panics
    /// 重复调用时 panic。
    pub fn initialize(&self) {
        let page_size = vm_config().page_size();
        let mut state = self.state.lock();
        let ram_base = match &*state {
            AllocatorState::Uninitialized { ram_base } => *ram_base,
            AllocatorState::Ready(_) => panic!("frame allocator initialized twice"),
        };

        // 再次读取：first 之前的部分已经被引导期分配占用
        let (first, last) = self.arch.ram_getsize();
        let end = last / page_size * page_size;
        let nframes = end.saturating_sub(ram_base.as_usize()) / page_size;

        let mut frames = Vec::with_capacity(nframes);
        let mut used_count = 0;
        for i in 0..nframes {
            let paddr = ram_base + i * page_size;
            let used = paddr.as_usize() < first;
            used_count += used as usize;
            frames.push(Frame {
                paddr,
                used,
                run_len: None,
            });
        }

        log::info!(
            "frame allocator: {} frames at {}, {} consumed during boot",
            nframes,
            ram_base,
            used_count
        );

        *state = AllocatorState::Ready(FrameTable {
            base: ram_base,
            frames,
            used_count,
        });
    }

    /// 帧表是否已建立
    pub fn is_ready(&self) -> bool {
        matches!(&*self.state.lock(), AllocatorState::Ready(_))
    }

    /// 分配 `npages` 个连续物理帧，返回首帧的物理地址。
    ///
    /// 没有足够长的连续空闲帧时返回 `None`，由调用者转换为
    /// [`crate::VmError::OutOfMemory`]。`npages == 0` 同样返回 `None`。
    pub fn allocate(&self, npages: usize) -> Option<Paddr> {
        if npages == 0 {
            return None;
        }
        let mut state = self.state.lock();
        match &mut *state {
            AllocatorState::Uninitialized { .. } => {
                let paddr = self.arch.ram_stealmem(npages).map(Paddr::from_usize);
                log::debug!("frame allocator: stole {} pages at {:?}", npages, paddr);
                paddr
            }
            AllocatorState::Ready(table) => table.alloc_run(npages),
        }
    }

    /// 回收一次分配。
    ///
    /// # Panics
    /// `paddr` 不是某次分配返回的首地址，或分配器尚未进入 Ready 状态时 panic。
    pub fn release(&self, paddr: Paddr) {
        let page_size = vm_config().page_size();
        let mut state = self.state.lock();
        match &mut *state {
            AllocatorState::Uninitialized { .. } => {
                panic!("release: {} before the frame table exists; boot memory is permanent", paddr)
            }
            AllocatorState::Ready(table) => {
                table.release_run(paddr, page_size);
            }
        }
    }

    /// 查询某个帧是否已占用；不属于帧表的地址返回 `None`
    pub fn is_frame_used(&self, paddr: Paddr) -> Option<bool> {
        let page_size = vm_config().page_size();
        match &*self.state.lock() {
            AllocatorState::Uninitialized { .. } => None,
            AllocatorState::Ready(table) => table
                .index_of(paddr, page_size)
                .map(|idx| table.frames[idx].used),
        }
    }

    /// `paddr` 是否是帧表中某次分配的首地址，即可以交给 [`FrameAllocator::release`]
    ///
    /// 引导期分配出的内存不属于任何一次帧表分配，返回 `false`。
    pub fn owns_run(&self, paddr: Paddr) -> bool {
        let page_size = vm_config().page_size();
        match &*self.state.lock() {
            AllocatorState::Uninitialized { .. } => false,
            AllocatorState::Ready(table) => table
                .index_of(paddr, page_size)
                .is_some_and(|idx| table.frames[idx].run_len.is_some()),
        }
    }

    /// 获取帧分配器的当前状态
    /// # 返回值
    /// - 总帧数
    /// - 已占用的帧数
    /// - 空闲的帧数
    pub fn get_stats(&self) -> (usize, usize, usize) {
        match &*self.state.lock() {
            AllocatorState::Uninitialized { .. } => (0, 0, 0),
            AllocatorState::Ready(table) => {
                let total = table.frames.len();
                (total, table.used_count, total - table.used_count)
            }
        }
    }

    /// 获取空闲的帧数
    pub fn free_frames(&self) -> usize {
        self.get_stats().2
    }

    /// 注入的机器操作
    pub fn arch(&self) -> &Arc<dyn ArchVmOps> {
        &self.arch
    }

    /// 将指定的物理页帧清零。
    pub(crate) fn zero_frame(&self, paddr: Paddr) {
        let page_size = vm_config().page_size();
        let kva = self.arch.paddr_to_kvaddr(paddr.as_usize());
        // SAFETY: paddr 是本分配器刚交出的帧，内核直接映射区域覆盖全部物理内存
        unsafe { core::ptr::write_bytes(kva as *mut u8, 0, page_size) };
    }

    /// 将 `src` 帧的内容完整复制到 `dst` 帧。
    pub(crate) fn copy_frame(&self, src: Paddr, dst: Paddr) {
        let page_size = vm_config().page_size();
        let src_va = self.arch.paddr_to_kvaddr(src.as_usize());
        let dst_va = self.arch.paddr_to_kvaddr(dst.as_usize());
        // SAFETY: 两个帧都已被占用且互不相同
        unsafe {
            core::ptr::copy_nonoverlapping(src_va as *const u8, dst_va as *mut u8, page_size);
        }
    }
}
