//! Mock 实现模块
//!
//! 提供架构相关操作和虚拟内存硬件的 Mock 实现，用于测试

pub mod arch;
pub mod vm;
