//! 虚拟内存子系统的错误类型

use core::fmt;
use uapi::errno;

/// 虚拟内存操作中可能发生的错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// 没有空闲帧，或没有足够长的连续空闲帧
    OutOfMemory,
    /// 访问的地址不在任何已声明的区域内（进程被终止）
    UnmappedAddress,
    /// 对只读页进行写访问（进程被终止）
    ReadOnlyViolation,
    /// 已经声明了两个非栈区域，不支持更多
    TooManySegments,
    /// 区域与已有区域或用户栈重叠
    RegionOverlap,
    /// 缺页类型既不是读、写，也不是只读异常
    InvalidFaultKind,
    /// 当前没有激活的地址空间（通常是引导早期的内核缺页）
    NoAddressSpace,
}

impl VmError {
    /// 转换为系统调用层使用的错误码
    pub fn to_errno(self) -> i32 {
        match self {
            VmError::OutOfMemory => errno::ENOMEM,
            VmError::UnmappedAddress | VmError::ReadOnlyViolation | VmError::NoAddressSpace => {
                errno::EFAULT
            }
            VmError::TooManySegments => errno::ENOSYS,
            VmError::RegionOverlap | VmError::InvalidFaultKind => errno::EINVAL,
        }
    }

    /// 该错误是否意味着当前进程已被终止
    pub fn is_fatal(self) -> bool {
        matches!(self, VmError::UnmappedAddress | VmError::ReadOnlyViolation)
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            VmError::OutOfMemory => "out of physical memory",
            VmError::UnmappedAddress => "address outside every region",
            VmError::ReadOnlyViolation => "write to read-only page",
            VmError::TooManySegments => "too many regions",
            VmError::RegionOverlap => "region overlaps an existing region",
            VmError::InvalidFaultKind => "invalid fault type",
            VmError::NoAddressSpace => "no active address space",
        };
        f.write_str(msg)
    }
}

/// 虚拟内存操作的结果类型
pub type VmResult<T> = Result<T, VmError>;
