//! 平坦页表

use super::{PageTableEntry, PteFlags};
use crate::address::{Paddr, Vpn, VpnRange};
use alloc::vec::Vec;

/// 一个地址空间的软件页表
#[derive(Debug, Default)]
pub struct PageTable {
    entries: Vec<PageTableEntry>,
}

impl PageTable {
    /// 创建空页表
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// 表项数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否没有任何表项
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 为 `range` 中的每一页追加一个未驻留的表项
    pub fn insert_range(&mut self, range: VpnRange, flags: PteFlags) {
        self.entries.reserve(range.len());
        self.entries
            .extend(range.iter().map(|vpn| PageTableEntry::new(vpn, flags)));
    }

    /// 追加一个表项
    ///
    /// # Panics
    /// 该虚拟页已有表项时 panic。
    pub fn push(&mut self, entry: PageTableEntry) {
        assert!(
            self.find(entry.vpn()).is_none(),
            "page table: duplicate entry for {}",
            entry.vaddr()
        );
        self.entries.push(entry);
    }

    /// 按虚拟页号查找表项
    pub fn find(&self, vpn: Vpn) -> Option<&PageTableEntry> {
        self.entries.iter().find(|e| e.vpn() == vpn)
    }

    /// 按虚拟页号查找表项（可变）
    pub fn find_mut(&mut self, vpn: Vpn) -> Option<&mut PageTableEntry> {
        self.entries.iter_mut().find(|e| e.vpn() == vpn)
    }

    /// 遍历所有表项
    pub fn iter(&self) -> impl Iterator<Item = &PageTableEntry> {
        self.entries.iter()
    }

    /// 遍历所有表项（可变）
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PageTableEntry> {
        self.entries.iter_mut()
    }

    /// 已驻留的页数
    pub fn resident_pages(&self) -> usize {
        self.entries.iter().filter(|e| e.is_resident()).count()
    }

    /// 解除所有绑定，返回被释放出来的物理帧
    pub fn unbind_all(&mut self) -> Vec<Paddr> {
        self.entries.iter_mut().filter_map(|e| e.unbind()).collect()
    }
}
