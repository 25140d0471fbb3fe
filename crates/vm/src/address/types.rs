//! 物理地址与虚拟地址

use crate::address::operations::{AlignOps, UsizeConvert};
use core::fmt;

/// 地址 Trait，由 [`Paddr`] 与 [`Vaddr`] 实现
pub trait Address: AlignOps + Copy + Clone + PartialEq + Eq + PartialOrd + Ord {}

macro_rules! impl_address {
    ($type:ident) => {
        impl UsizeConvert for $type {
            fn as_usize(&self) -> usize {
                self.0
            }

            fn from_usize(value: usize) -> Self {
                Self(value)
            }
        }

        $crate::impl_calc_ops!($type);

        impl AlignOps for $type {}

        impl Address for $type {}

        impl fmt::Display for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }
    };
}

/// 物理地址
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct Paddr(pub usize);
impl_address!(Paddr);

/// 虚拟地址
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct Vaddr(pub usize);
impl_address!(Vaddr);
