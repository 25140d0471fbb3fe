//! 页表模块
//!
//! 每个地址空间一张平坦的软件页表：一组无序、可增长的 [`PageTableEntry`]。
//! 表项在声明区域时一次性创建，但只在第一次缺页时才绑定物理帧（按需分页）。
//!
//! 不支持多级页表；查找就是线性扫描，区域数量很少，这已经足够。
mod entry;
mod table;

pub use entry::*;
pub use table::*;
