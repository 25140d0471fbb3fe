//! 页表项

use crate::address::{Paddr, PageNum, Ppn, Vaddr, Vpn};
use bitflags::bitflags;

bitflags! {
    /// 页的访问权限
    ///
    /// 位布局与 ELF 程序头的 `p_flags` 相同（PF_X = 1, PF_W = 2, PF_R = 4），
    /// 加载器可以直接传入。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PteFlags: u8 {
        /// 可执行
        const EXECUTABLE = 1 << 0;
        /// 可写
        const WRITABLE = 1 << 1;
        /// 可读
        const READABLE = 1 << 2;
    }
}

impl PteFlags {
    /// 读写执行全部允许（用户栈使用）
    pub const fn rwx() -> Self {
        Self::all()
    }

    /// 由三个独立的布尔权限构造
    pub fn from_rwx(readable: bool, writable: bool, executable: bool) -> Self {
        let mut flags = Self::empty();
        flags.set(Self::READABLE, readable);
        flags.set(Self::WRITABLE, writable);
        flags.set(Self::EXECUTABLE, executable);
        flags
    }
}

/// 一个虚拟页的绑定
///
/// 物理帧为 `None` 表示该页尚未驻留。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTableEntry {
    vpn: Vpn,
    ppn: Option<Ppn>,
    flags: PteFlags,
}

impl PageTableEntry {
    /// 创建一个尚未驻留的表项
    pub fn new(vpn: Vpn, flags: PteFlags) -> Self {
        Self {
            vpn,
            ppn: None,
            flags,
        }
    }

    /// 虚拟页号
    pub fn vpn(&self) -> Vpn {
        self.vpn
    }

    /// 虚拟页起始地址
    pub fn vaddr(&self) -> Vaddr {
        self.vpn.start_addr()
    }

    /// 访问权限
    pub fn flags(&self) -> PteFlags {
        self.flags
    }

    /// 是否可写；决定 TLB 表项的 dirty 位
    pub fn is_writable(&self) -> bool {
        self.flags.contains(PteFlags::WRITABLE)
    }

    /// 是否已驻留
    pub fn is_resident(&self) -> bool {
        self.ppn.is_some()
    }

    /// 已绑定的物理帧地址
    pub fn paddr(&self) -> Option<Paddr> {
        self.ppn.map(|ppn| ppn.start_addr())
    }

    /// 绑定物理帧并标记为驻留
    ///
    /// # Panics
    /// 表项已经驻留时 panic。
    pub fn bind(&mut self, paddr: Paddr) {
        assert!(
            self.ppn.is_none(),
            "pte {}: already bound to {:?}",
            self.vaddr(),
            self.paddr()
        );
        self.ppn = Some(Ppn::from_addr_floor(paddr));
    }

    /// 解除绑定，返回原来的物理帧地址
    pub fn unbind(&mut self) -> Option<Paddr> {
        self.ppn.take().map(|ppn| ppn.start_addr())
    }
}
