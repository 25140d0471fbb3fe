//! 地址模块
//!
//! 此模块提供了用于处理物理地址和虚拟地址，
//! 以及页表与帧分配器中使用的页码的抽象。
//!
//! # 地址类型
//!
//! - [`Paddr`] - 物理地址类型
//! - [`Vaddr`] - 虚拟地址类型
//!
//! # 页码
//!
//! - [`PageNum`] - 表示页码的 Trait
//! - [`Ppn`] - 物理页码（Physical Page Number）
//! - [`Vpn`] - 虚拟页码（Virtual Page Number）
//! - [`PpnRange`] / [`VpnRange`] - 半开区间 `[start, end)`
//!
//! # 操作
//!
//! - [`UsizeConvert`] - 在类型和 usize 之间进行转换
//! - CalcOps - 与 usize 的加减
//! - [`AlignOps`] - 按页对齐
pub mod operations;
pub mod page_num;
pub mod types;

pub use operations::{AlignOps, UsizeConvert};
pub use page_num::{PageNum, Ppn, PpnRange, Vpn, VpnRange};
pub use types::{Paddr, Vaddr};
