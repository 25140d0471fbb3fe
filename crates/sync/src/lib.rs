//! 同步原语
//!
//! 向虚拟内存子系统提供自旋锁和中断保护。
//!
//! 单纯关中断只在单处理器上构成互斥。
//! [`SpinLock`] 在关闭本地中断的同时持有一把真正的锁，
//! 帧分配器和页表因此可以在多个执行上下文之间共享。
//!
//! # 架构依赖
//!
//! 此 crate 通过 `ArchOps` trait 抽象架构相关操作。
//! 使用前必须调用 `register_arch_ops` 注册实现。

#![no_std]

mod intr_guard;
mod raw_spin_lock;
mod spin_lock;

pub use intr_guard::*;
pub use raw_spin_lock::*;
pub use spin_lock::*;

use core::sync::atomic::{AtomicUsize, Ordering};

/// 架构相关操作的 trait
///
/// 由内核实现并注册，提供中断优先级的提升与恢复。
pub trait ArchOps: Send + Sync {
    /// 读取并禁用中断，返回之前的状态
    ///
    /// # Safety
    /// 调用者必须确保在适当的上下文中调用
    unsafe fn read_and_disable_interrupts(&self) -> usize;

    /// 恢复中断状态
    ///
    /// # Safety
    /// flags 必须是之前 read_and_disable_interrupts 返回的值
    unsafe fn restore_interrupts(&self, flags: usize);

    /// 中断使能位在 flags 中的掩码
    fn interrupt_enable_bit(&self) -> usize;
}

/// 全局架构操作实例（存储 fat pointer 的两个部分）
static ARCH_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static ARCH_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册架构操作实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_arch_ops(ops: &'static dyn ArchOps) {
    let ptr = ops as *const dyn ArchOps;
    // SAFETY: transmute 在这里是安全的，因为 fat pointer 的布局是 (data, vtable)
    let (data, vtable) = unsafe { core::mem::transmute::<*const dyn ArchOps, (usize, usize)>(ptr) };
    // 先写 vtable，读者以 data 非零作为“已注册”的判据
    ARCH_OPS_VTABLE.store(vtable, Ordering::Release);
    ARCH_OPS_DATA.store(data, Ordering::Release);
}

/// 获取架构操作实例
#[inline]
pub(crate) fn arch_ops() -> &'static dyn ArchOps {
    let data = ARCH_OPS_DATA.load(Ordering::Acquire);
    let vtable = ARCH_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("sync: ArchOps not registered, call register_arch_ops first");
    }
    // SAFETY: data 和 vtable 是通过 register_arch_ops 设置的有效指针
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ArchOps>((data, vtable)) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_support::mock::arch::MOCK_ARCH_OPS;

    extern crate std;

    struct TestArch;

    impl ArchOps for TestArch {
        unsafe fn read_and_disable_interrupts(&self) -> usize {
            unsafe { MOCK_ARCH_OPS.read_and_disable_interrupts() }
        }

        unsafe fn restore_interrupts(&self, flags: usize) {
            unsafe { MOCK_ARCH_OPS.restore_interrupts(flags) }
        }

        fn interrupt_enable_bit(&self) -> usize {
            MOCK_ARCH_OPS.interrupt_enable_bit()
        }
    }

    static TEST_ARCH: TestArch = TestArch;
    static INIT: std::sync::Once = std::sync::Once::new();

    pub(crate) fn setup() {
        INIT.call_once(|| unsafe { register_arch_ops(&TEST_ARCH) });
    }

    #[test]
    fn test_spin_lock_mutual_exclusion() {
        setup();
        let lock = std::sync::Arc::new(SpinLock::new(0usize));
        let handles: std::vec::Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        *lock.lock() += 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(), 4000);
    }

    #[test]
    fn test_try_lock_fails_while_held() {
        setup();
        let lock = SpinLock::new(7u32);
        let guard = lock.lock();
        assert!(lock.is_locked());
        assert!(lock.try_lock().is_none());
        drop(guard);
        assert!(!lock.is_locked());
        assert_eq!(*lock.try_lock().unwrap(), 7);
    }

    #[test]
    fn test_intr_guard_was_enabled_reads_saved_flags() {
        setup();
        let bit = TEST_ARCH.interrupt_enable_bit();
        let enabled = IntrGuard { flags: bit };
        let disabled = IntrGuard { flags: 0 };
        assert!(enabled.was_enabled());
        assert!(!disabled.was_enabled());
        // 手工构造的守卫不应写回中断状态
        core::mem::forget(enabled);
        core::mem::forget(disabled);
    }
}
