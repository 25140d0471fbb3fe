//! 页码抽象模块
//!
//! 此模块定义了表示页码 (Page Number) 的 Trait 和具体的页码类型 (Ppn, Vpn)，
//! 以及用于处理连续页码的范围结构 (PageNumRange)。
//!
//! 页表项以 [`Vpn`] 为键，帧分配器以 [`Ppn`] 为下标，
//! 二者都与页大小解耦，页大小由 [`crate::VmConfig`] 提供。

use crate::address::operations::{page_size, AlignOps, CalcOps, UsizeConvert};
use crate::address::types::{Address, Paddr, Vaddr};

/// [PageNum] Trait
/// ---------------------
/// 表示一个页码的 Trait。所有页码类型 (如 Ppn 和 Vpn) 必须实现此 Trait。
pub trait PageNum:
    CalcOps + UsizeConvert + Copy + Clone + PartialEq + PartialOrd + Eq + Ord
{
    /// 此页码类型关联的地址类型（例如 Ppn 关联 Paddr，Vpn 关联 Vaddr）。
    type TAddress: Address;

    /// 将页码增加 1。
    fn step(&mut self) {
        *self = Self::from_usize(self.as_usize() + 1);
    }

    /// 将地址转换为页码 (向下取整，即包含该地址的页)。
    fn from_addr_floor(addr: Self::TAddress) -> Self {
        Self::from_usize(addr.align_down_to_page().as_usize() / page_size())
    }

    /// 将地址转换为页码 (向上取整)。
    ///
    /// 如果地址是页的结束（例如 0x1000），则返回下一页的页码（例如 1）。
    fn from_addr_ceil(addr: Self::TAddress) -> Self {
        Self::from_usize(addr.align_up_to_page().as_usize() / page_size())
    }

    /// 获取该页码对应的起始地址。
    fn start_addr(self) -> Self::TAddress {
        Self::TAddress::from_usize(self.as_usize() * page_size())
    }

    /// 获取该页码对应的结束地址 (即下一页的起始地址，不包含在页内)。
    fn end_addr(self) -> Self::TAddress {
        Self::TAddress::from_usize((self.as_usize() + 1) * page_size())
    }
}

/// `impl_page_num!` 宏
/// ---------------------
/// 快速为给定类型实现 `UsizeConvert`、`CalcOps` 和 `PageNum` Trait。
#[macro_export]
macro_rules! impl_page_num {
    ($type:ty, $addr_type:ty) => {
        impl $crate::address::operations::UsizeConvert for $type {
            fn as_usize(&self) -> usize {
                self.0
            }

            fn from_usize(value: usize) -> Self {
                Self(value)
            }
        }

        $crate::impl_calc_ops!($type);

        impl $crate::address::page_num::PageNum for $type {
            type TAddress = $addr_type;
        }
    };
}

/// [Ppn] (Physical Page Number)
/// ---------------------
/// 物理页码，对应物理地址 (Paddr)。
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct Ppn(pub usize);
impl_page_num!(Ppn, Paddr);

/// [Vpn] (Virtual Page Number)
/// ---------------------
/// 虚拟页码，对应虚拟地址 (Vaddr)。
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct Vpn(pub usize);
impl_page_num!(Vpn, Vaddr);

/// [PageNumRange]
/// ---------------------
/// 泛型页码范围结构，表示一个半开区间 `[start, end)`。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageNumRange<T>
where
    T: PageNum,
{
    /// 范围的起始页码 (包含)。
    pub start: T,
    /// 范围的结束页码 (不包含)。
    pub end: T,
}

impl<T> PageNumRange<T>
where
    T: PageNum,
{
    /// 创建一个新的页码范围。
    pub fn new(start: T, end: T) -> Self {
        Self { start, end }
    }

    /// 从起始页码和长度 (页数) 创建一个页码范围。
    pub fn from_start_len(start: T, len: usize) -> Self {
        Self {
            start,
            end: start + len,
        }
    }

    /// 获取起始页码。
    pub fn start(&self) -> T {
        self.start
    }

    /// 获取结束页码 (不包含)。
    pub fn end(&self) -> T {
        self.end
    }

    /// 获取范围内的页数。
    pub fn len(&self) -> usize {
        debug_assert!(self.end.as_usize() >= self.start.as_usize());
        self.end.as_usize() - self.start.as_usize()
    }

    /// 检查范围是否为空 (即 start == end)。
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// 检查范围是否包含给定的页码。
    pub fn contains(&self, pn: T) -> bool {
        pn >= self.start && pn < self.end
    }

    /// 检查两个范围是否重叠。
    ///
    /// 注意: PageNumRange 是 [start, end)，相邻的范围不视为重叠。
    pub fn overlaps(&self, other: &Self) -> bool {
        !(self.end <= other.start || self.start >= other.end)
    }

    /// 获取范围的迭代器。
    pub fn iter(&self) -> PageNumRangeIterator<T> {
        PageNumRangeIterator {
            end: self.end,
            current: self.start,
        }
    }
}

impl<T> IntoIterator for PageNumRange<T>
where
    T: PageNum,
{
    type Item = T;
    type IntoIter = PageNumRangeIterator<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// [PageNumRangeIterator]
/// ---------------------
/// 页码范围的迭代器，按升序返回范围内的每个页码。
pub struct PageNumRangeIterator<T>
where
    T: PageNum,
{
    end: T,
    current: T,
}

impl<T> Iterator for PageNumRangeIterator<T>
where
    T: PageNum,
{
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.end {
            return None;
        }
        let result = self.current;
        self.current.step();
        Some(result)
    }
}

/// 物理页码范围的类型别名
pub type PpnRange = PageNumRange<Ppn>;
/// 虚拟页码范围的类型别名
pub type VpnRange = PageNumRange<Vpn>;
