//! 缺页处理
//!
//! 每次 TLB 缺失都会进入 [`FaultHandler::vm_fault`]。按照当前激活的地址空间中
//! 对应表项的状态，分为三种情况：
//!
//! - **没有表项**：访问了任何区域之外的地址，终止进程
//! - **未驻留**：首次访问，分配并清零一个新帧后绑定
//! - **已驻留**：只需把已有的绑定重新装入 TLB
//!
//! 对不可写页的写访问，或硬件报告的只读异常，同样终止进程；
//! 不存在“升级为可写”的路径。

use crate::address::{Paddr, PageNum, UsizeConvert, Vaddr, Vpn};
use crate::address_space::{AddressSpace, SharedSpace};
use crate::arch_ops::ProcessControl;
use crate::error::{VmError, VmResult};
use crate::frame_allocator::FrameAllocator;
use crate::stats::{VmStat, VmStats};
use crate::tlb::{Tlb, TlbOps};
use alloc::sync::Arc;
use sync::{IntrGuard, SpinLock};

/// 进程因非法访问被终止时使用的退出码
pub const FAULT_EXIT_STATUS: i32 = -1;

/// 缺页类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// 读访问缺失
    Read,
    /// 写访问缺失
    Write,
    /// 写访问命中了不可写的 TLB 表项
    ReadOnly,
}

impl TryFrom<usize> for FaultKind {
    type Error = VmError;

    fn try_from(raw: usize) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(FaultKind::Read),
            1 => Ok(FaultKind::Write),
            2 => Ok(FaultKind::ReadOnly),
            _ => Err(VmError::InvalidFaultKind),
        }
    }
}

/// 一次缺页属于哪一类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// 首次访问，新分配了帧
    FirstTouch,
    /// 页已驻留，仅重新装入 TLB
    Reload,
}

/// 一次成功处理的缺页
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultResolution {
    /// 缺页类别
    pub class: FaultClass,
    /// 缺页所在虚拟页的起始地址
    pub vpage: Vaddr,
    /// 装入 TLB 的物理帧
    pub paddr: Paddr,
    /// 写入的 TLB 槽位
    pub slot: usize,
}

/// 缺页处理器
pub struct FaultHandler {
    frames: Arc<FrameAllocator>,
    tlb: Tlb,
    stats: Arc<VmStats>,
    process: Arc<dyn ProcessControl>,
    current: SpinLock<Option<SharedSpace>>,
}

impl FaultHandler {
    /// 创建缺页处理器；此时没有激活的地址空间
    pub fn new(
        frames: Arc<FrameAllocator>,
        tlb: Arc<dyn TlbOps>,
        process: Arc<dyn ProcessControl>,
    ) -> Self {
        let stats = Arc::new(VmStats::new());
        FaultHandler {
            frames,
            tlb: Tlb::new(tlb, stats.clone()),
            stats,
            process,
            current: SpinLock::new(None),
        }
    }

    /// 帧分配器
    pub fn frames(&self) -> &Arc<FrameAllocator> {
        &self.frames
    }

    /// TLB
    pub fn tlb(&self) -> &Tlb {
        &self.tlb
    }

    /// 统计计数
    pub fn stats(&self) -> &VmStats {
        &self.stats
    }

    /// 创建一个使用本处理器帧分配器的空地址空间
    pub fn create_space(&self) -> SharedSpace {
        Arc::new(SpinLock::new(AddressSpace::create(self.frames.clone())))
    }

    /// 激活地址空间：之后的缺页都针对它处理，同时清空 TLB
    pub fn activate(&self, space: &SharedSpace) {
        *self.current.lock() = Some(space.clone());
        space.lock().activate(&self.tlb);
    }

    /// 取消激活；之后的缺页返回 [`VmError::NoAddressSpace`]
    pub fn deactivate(&self) {
        *self.current.lock() = None;
    }

    /// 当前激活的地址空间
    pub fn current(&self) -> Option<SharedSpace> {
        self.current.lock().clone()
    }

    /// 缺页入口。
    ///
    /// `fault_type` 为硬件报告的原始类型：0 读，1 写，2 只读异常。
    pub fn vm_fault(&self, fault_type: usize, fault_address: usize) -> VmResult<FaultResolution> {
        let kind = FaultKind::try_from(fault_type)?;
        self.handle(kind, Vaddr::from_usize(fault_address))
    }

    /// 处理一次已分类的缺页
    ///
    /// 非法访问会终止当前进程。[`ProcessControl::kill_current`] 在地址空间的锁
    /// 释放、中断恢复之后才被调用，因此它可以不返回，也可以回头访问该地址空间。
    pub fn handle(&self, kind: FaultKind, vaddr: Vaddr) -> VmResult<FaultResolution> {
        let space = self.current().ok_or(VmError::NoAddressSpace)?;

        let result = {
            // 查找、绑定与 TLB 的读-改-写必须连续完成
            let _guard = IntrGuard::new();
            let mut space = space.lock();
            self.resolve_in(&mut *space, kind, vaddr)
        };

        if let Err(err) = result {
            if err.is_fatal() {
                log::warn!("vm_fault: {} at {}, terminating process", err, vaddr);
                self.process.kill_current(FAULT_EXIT_STATUS);
            }
        }
        result
    }

    /// 在持有地址空间锁、关闭中断的情况下完成分类、绑定与 TLB 填充
    fn resolve_in(
        &self,
        space: &mut AddressSpace,
        kind: FaultKind,
        vaddr: Vaddr,
    ) -> VmResult<FaultResolution> {
        let vpn = Vpn::from_addr_floor(vaddr);
        let writable = space
            .page_table()
            .find(vpn)
            .ok_or(VmError::UnmappedAddress)?
            .is_writable();
        let violates = match kind {
            FaultKind::ReadOnly => true,
            FaultKind::Write => !writable,
            FaultKind::Read => false,
        };
        if violates {
            return Err(VmError::ReadOnlyViolation);
        }

        let (paddr, first_touch) = space.resolve(vpn)?;
        let class = if first_touch {
            self.stats.inc(VmStat::PageFaultZero);
            FaultClass::FirstTouch
        } else {
            self.stats.inc(VmStat::TlbReload);
            FaultClass::Reload
        };

        let vpage = vpn.start_addr();
        let slot = self.tlb.fill(vpage, paddr, writable);
        log::trace!("vm_fault: {:?} {} -> {} slot {} ({:?})", kind, vaddr, paddr, slot, class);

        Ok(FaultResolution {
            class,
            vpage,
            paddr,
            slot,
        })
    }
}
