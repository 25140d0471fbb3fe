//! 由内核其余部分提供的外部操作
//!
//! 与 [`crate::VmConfig`] 不同，这些操作以 trait 对象的形式注入到
//! [`crate::FrameAllocator`] 与 [`crate::FaultHandler`] 中，而不是全局注册，
//! 这样每个分配器都可以管理各自的物理内存。

/// 物理内存相关的机器操作
pub trait ArchVmOps: Send + Sync {
    /// 当前尚未被引导分配器占用的物理内存范围 `[first, last)`
    ///
    /// 每次 [`ArchVmOps::ram_stealmem`] 成功后，`first` 都会增长。
    fn ram_getsize(&self) -> (usize, usize);

    /// 引导期分配器：从低端切走 `npages` 个连续页，永不归还
    ///
    /// 内存不足时返回 `None`。
    fn ram_stealmem(&self, npages: usize) -> Option<usize>;

    /// 将物理地址转换为内核直接映射区域中的虚拟地址
    fn paddr_to_kvaddr(&self, paddr: usize) -> usize;

    /// 将内核直接映射区域中的虚拟地址转换为物理地址
    fn kvaddr_to_paddr(&self, kvaddr: usize) -> usize;
}

/// 进程控制
///
/// 缺页处理遇到非法访问时，通过它终止当前进程。
pub trait ProcessControl: Send + Sync {
    /// 以 `status` 作为退出码终止当前进程
    ///
    /// 调用时不持有任何虚拟内存子系统的锁，实现可以不返回。
    fn kill_current(&self, status: i32);
}
