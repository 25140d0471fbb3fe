//! 测试支持 crate
//!
//! 提供架构操作与虚拟内存硬件（物理内存、TLB、进程控制）的 Mock 实现

#![no_std]

extern crate alloc;

pub mod mock;
