//! 子系统的启动与关闭

use crate::arch_ops::{ArchVmOps, ProcessControl};
use crate::fault::FaultHandler;
use crate::frame_allocator::FrameAllocator;
use crate::kpages::install_kernel_frames;
use crate::tlb::TlbOps;
use alloc::sync::Arc;

/// 启动虚拟内存子系统。
///
/// 建立帧表，把分配器安装为内核页的来源，返回缺页处理器。
/// 调用前必须已经注册 [`crate::VmConfig`] 与 `sync` 的架构操作。
pub fn vm_bootstrap(
    arch: Arc<dyn ArchVmOps>,
    tlb: Arc<dyn TlbOps>,
    process: Arc<dyn ProcessControl>,
) -> Arc<FaultHandler> {
    let frames = Arc::new(FrameAllocator::new(arch));
    frames.initialize();
    install_kernel_frames(frames.clone());

    let handler = Arc::new(FaultHandler::new(frames, tlb, process));
    log::info!(
        "vm: bootstrap done, {} free frames, {} TLB slots",
        handler.frames().free_frames(),
        handler.tlb().slot_count()
    );
    handler
}

/// 关闭虚拟内存子系统，输出统计信息
pub fn vm_shutdown(handler: &FaultHandler) {
    handler.stats().print();
    let (total, used, free) = handler.frames().get_stats();
    log::info!("vm: shutdown, frames total {} used {} free {}", total, used, free);
}
