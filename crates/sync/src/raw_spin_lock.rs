//! 原始自旋锁
//!
//! 实现 [`lock_api::RawMutex`]，持锁期间本地中断保持关闭。

use crate::arch_ops;
use core::{
    hint,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};
use lock_api::{GuardNoSend, RawMutex};

/// 自旋锁结构体，提供互斥访问临界区的能力。
///
/// 加锁时先关闭本地中断再自旋，解锁时先释放锁标志再恢复中断。
/// 不可重入（即不能在持锁时再次对同一把锁调用 `lock()`）。
#[derive(Debug)]
pub struct RawSpinLock {
    lock: AtomicBool,
    /// 持锁者进入临界区前的中断状态，只有持锁者会读写
    saved_flags: AtomicUsize,
}

impl RawSpinLock {
    /// 创建一个新的 RawSpinLock 实例。
    pub const fn new() -> Self {
        RawSpinLock {
            lock: AtomicBool::new(false),
            saved_flags: AtomicUsize::new(0),
        }
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawSpinLock::new();

    // 守卫恢复的是当前 CPU 的中断状态，不能跨线程移动
    type GuardMarker = GuardNoSend;

    fn lock(&self) {
        // SAFETY: 保存的 flags 在 unlock 中恢复
        let flags = unsafe { arch_ops().read_and_disable_interrupts() };

        while self
            .lock
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
        }

        self.saved_flags.store(flags, Ordering::Relaxed);
    }

    fn try_lock(&self) -> bool {
        // SAFETY: 失败时立即恢复；成功时在 unlock 中恢复
        let flags = unsafe { arch_ops().read_and_disable_interrupts() };

        if self
            .lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.saved_flags.store(flags, Ordering::Relaxed);
            true
        } else {
            unsafe { arch_ops().restore_interrupts(flags) };
            false
        }
    }

    unsafe fn unlock(&self) {
        let flags = self.saved_flags.load(Ordering::Relaxed);
        self.lock.store(false, Ordering::Release);
        // SAFETY: flags 来自本次加锁时的 read_and_disable_interrupts
        unsafe { arch_ops().restore_interrupts(flags) };
    }

    fn is_locked(&self) -> bool {
        self.lock.load(Ordering::Relaxed)
    }
}
