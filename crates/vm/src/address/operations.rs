//! 地址与页码的基础操作 trait

use core::ops::{Add, Sub};

/// 页大小
#[inline]
pub(crate) fn page_size() -> usize {
    crate::vm_config().page_size()
}

/// 与 usize 互相转换
pub trait UsizeConvert {
    /// 转换为 usize
    fn as_usize(&self) -> usize;
    /// 从 usize 构造
    fn from_usize(value: usize) -> Self;
}

/// 与 usize 的加减运算
pub trait CalcOps: Add<usize, Output = Self> + Sub<usize, Output = Self> + Sized {}

/// 按页对齐的操作
pub trait AlignOps: UsizeConvert + Sized {
    /// 向下对齐到页边界
    fn align_down_to_page(&self) -> Self {
        Self::from_usize(self.as_usize() & !(page_size() - 1))
    }

    /// 向上对齐到页边界
    fn align_up_to_page(&self) -> Self {
        let mask = page_size() - 1;
        Self::from_usize((self.as_usize() + mask) & !mask)
    }

    /// 向上对齐到页边界；越过地址空间末端时返回 `None`
    fn checked_align_up_to_page(&self) -> Option<Self> {
        let mask = page_size() - 1;
        self.as_usize()
            .checked_add(mask)
            .map(|v| Self::from_usize(v & !mask))
    }

    /// 页内偏移
    fn page_offset(&self) -> usize {
        self.as_usize() & (page_size() - 1)
    }

    /// 是否按页对齐
    fn is_page_aligned(&self) -> bool {
        self.page_offset() == 0
    }
}

/// `impl_calc_ops!` 宏
/// ---------------------
/// 为 `usize` 包装类型实现与 usize 的加减。
#[macro_export]
macro_rules! impl_calc_ops {
    ($type:ty) => {
        impl core::ops::Add<usize> for $type {
            type Output = Self;

            fn add(self, rhs: usize) -> Self {
                Self(self.0 + rhs)
            }
        }

        impl core::ops::Sub<usize> for $type {
            type Output = Self;

            fn sub(self, rhs: usize) -> Self {
                Self(self.0 - rhs)
            }
        }

        impl $crate::address::operations::CalcOps for $type {}
    };
}
