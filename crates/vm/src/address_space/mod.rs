//! 地址空间模块
//!
//! 一个 [`AddressSpace`] 描述一个用户进程看到的全部虚拟内存：
//! 最多两个由加载器声明的区域（代码、数据），加上一段固定深度的用户栈。
//!
//! 声明区域只会创建未驻留的页表项；物理帧在第一次缺页时才分配
//! （见 [`crate::FaultHandler`]）。
mod segment;
mod space;

pub use segment::Segment;
pub use space::{AddressSpace, SharedSpace, MAX_SEGMENTS};
