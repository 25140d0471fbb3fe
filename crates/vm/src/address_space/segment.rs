//! 区域描述符

use crate::address::{PageNum, Vaddr, VpnRange};
use crate::page_table::PteFlags;

/// 一段连续的虚拟页，以及这些页共同的访问权限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    range: VpnRange,
    flags: PteFlags,
}

impl Segment {
    /// 创建区域描述符
    pub fn new(range: VpnRange, flags: PteFlags) -> Self {
        Self { range, flags }
    }

    /// 覆盖的虚拟页范围
    pub fn range(&self) -> VpnRange {
        self.range
    }

    /// 起始虚拟地址（页对齐）
    pub fn vbase(&self) -> Vaddr {
        self.range.start().start_addr()
    }

    /// 结束虚拟地址（不包含）
    pub fn vend(&self) -> Vaddr {
        self.range.end().start_addr()
    }

    /// 页数
    pub fn npages(&self) -> usize {
        self.range.len()
    }

    /// 访问权限
    pub fn flags(&self) -> PteFlags {
        self.flags
    }

    /// 是否与另一个区域重叠
    pub fn overlaps(&self, other: &Segment) -> bool {
        self.range.overlaps(&other.range)
    }
}
