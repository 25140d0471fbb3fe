//! 内核页分配
//!
//! 内核自身的多页分配走全局帧分配器，返回内核直接映射区域中的虚拟地址。

use crate::address::{Paddr, UsizeConvert};
use crate::frame_allocator::FrameAllocator;
use alloc::sync::Arc;
use lazy_static::lazy_static;
use sync::SpinLock;

lazy_static! {
    /// 内核使用的帧分配器，由 [`crate::vm_bootstrap`] 安装
    static ref KERNEL_FRAMES: SpinLock<Option<Arc<FrameAllocator>>> = SpinLock::new(None);
}

/// 安装内核使用的帧分配器，替换之前安装的分配器
pub fn install_kernel_frames(frames: Arc<FrameAllocator>) {
    *KERNEL_FRAMES.lock() = Some(frames);
}

/// 当前安装的内核帧分配器
pub fn kernel_frames() -> Option<Arc<FrameAllocator>> {
    KERNEL_FRAMES.lock().clone()
}

/// 分配 `npages` 个连续的内核页，返回内核虚拟地址。
///
/// 尚未安装分配器或内存不足时返回 `None`。
pub fn alloc_kpages(npages: usize) -> Option<usize> {
    let frames = kernel_frames()?;
    let paddr = frames.allocate(npages)?;
    Some(frames.arch().paddr_to_kvaddr(paddr.as_usize()))
}

/// 释放 [`alloc_kpages`] 返回的内核页。
///
/// # Panics
/// 尚未安装分配器，或 `kvaddr` 不是某次分配的首地址时 panic。
pub fn free_kpages(kvaddr: usize) {
    let frames = kernel_frames().unwrap_or_else(|| panic!("free_kpages: no kernel frame allocator"));
    let paddr = Paddr::from_usize(frames.arch().kvaddr_to_paddr(kvaddr));
    frames.release(paddr);
}
