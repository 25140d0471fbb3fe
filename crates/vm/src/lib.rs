//! 按需分页的虚拟内存子系统
//!
//! 提供物理帧分配、每个进程一张的平坦软件页表，以及填充硬件 TLB 的缺页处理。
//!
//! - [`FrameAllocator`]：以帧为单位管理物理内存，租出与回收连续的帧
//! - [`AddressSpace`]：页表加区域与用户栈描述符
//! - [`FaultHandler`]：针对当前激活的地址空间处理 TLB 缺失
//!
//! # 架构解耦
//!
//! 通过 trait 抽象与架构特定组件解耦：
//! - [`VmConfig`]：页大小与用户栈布局，全局注册一次
//! - [`ArchVmOps`]：物理内存范围、引导期分配、地址转换
//! - [`TlbOps`]：硬件 TLB 的读、写与探测
//! - [`ProcessControl`]：终止当前进程
//!
//! 使用前必须调用 [`register_config`] 以及 `sync::register_arch_ops` 注册实现，
//! 然后通过 [`vm_bootstrap`] 启动。

#![no_std]

extern crate alloc;

mod arch_ops;
mod bootstrap;
mod config;
mod error;
mod kpages;

pub mod address;
pub mod address_space;
pub mod fault;
pub mod frame_allocator;
pub mod page_table;
pub mod stats;
pub mod tlb;

#[cfg(test)]
mod tests;

pub use arch_ops::{ArchVmOps, ProcessControl};
pub use bootstrap::{vm_bootstrap, vm_shutdown};
pub use config::{register_config, vm_config, VmConfig};
pub use error::{VmError, VmResult};
pub use kpages::{alloc_kpages, free_kpages, install_kernel_frames, kernel_frames};

// Re-export 常用类型
pub use address::{AlignOps, PageNum, Paddr, Ppn, PpnRange, UsizeConvert, Vaddr, Vpn, VpnRange};
pub use address_space::{AddressSpace, Segment, SharedSpace};
pub use fault::{FaultClass, FaultHandler, FaultKind, FaultResolution};
pub use frame_allocator::FrameAllocator;
pub use page_table::{PageTable, PageTableEntry, PteFlags};
pub use stats::{VmStat, VmStats};
pub use tlb::{Tlb, TlbEntry, TlbLoFlags, TlbOps};
