//! 地址空间核心实现

use super::Segment;
use crate::address::{AlignOps, Paddr, PageNum, UsizeConvert, Vaddr, Vpn, VpnRange};
use crate::error::{VmError, VmResult};
use crate::frame_allocator::FrameAllocator;
use crate::page_table::{PageTable, PageTableEntry, PteFlags};
use crate::tlb::Tlb;
use crate::vm_config;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use sync::SpinLock;

/// 每个地址空间最多可声明的非栈区域数量
pub const MAX_SEGMENTS: usize = 2;

/// 在进程与缺页处理之间共享的地址空间
pub type SharedSpace = Arc<SpinLock<AddressSpace>>;

/// 一个用户进程的地址空间
///
/// 销毁（drop）时释放所有已驻留页的物理帧。
pub struct AddressSpace {
    /// 平坦页表
    page_table: PageTable,

    /// 加载器声明的区域，按声明顺序占据槽位
    segments: [Option<Segment>; MAX_SEGMENTS],

    /// 用户栈
    stack: Option<Segment>,

    /// 物理帧来源
    frames: Arc<FrameAllocator>,
}

impl AddressSpace {
    /// 创建一个空地址空间：没有表项、没有区域、没有栈
    pub fn create(frames: Arc<FrameAllocator>) -> Self {
        AddressSpace {
            page_table: PageTable::new(),
            segments: [None; MAX_SEGMENTS],
            stack: None,
            frames,
        }
    }

    /// 返回页表的引用
    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    /// 已声明的区域（不含栈），按声明顺序
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().flatten()
    }

    /// 用户栈区域
    pub fn stack(&self) -> Option<&Segment> {
        self.stack.as_ref()
    }

    /// 该地址空间使用的帧分配器
    pub fn frames(&self) -> &Arc<FrameAllocator> {
        &self.frames
    }

    /// 声明一个区域 `[vaddr, vaddr + size)`。
    ///
    /// 起点向下、终点向上对齐到页边界，每一页创建一个未驻留的表项。
    ///
    /// # 错误
    /// - [`VmError::TooManySegments`]：已经有两个区域
    /// - [`VmError::RegionOverlap`]：与已有区域或用户栈重叠，或地址越界
    ///
    /// 出错时地址空间保持不变。
    pub fn define_region(&mut self, vaddr: Vaddr, size: usize, flags: PteFlags) -> VmResult<()> {
        let slot = self
            .segments
            .iter()
            .position(Option::is_none)
            .ok_or(VmError::TooManySegments)?;

        // 终点向上取整后仍须落在地址空间之内
        let end = vaddr
            .as_usize()
            .checked_add(size)
            .and_then(|end| Vaddr::from_usize(end).checked_align_up_to_page())
            .ok_or(VmError::RegionOverlap)?;
        let range = VpnRange::new(Vpn::from_addr_floor(vaddr), Vpn::from_addr_floor(end));
        let segment = Segment::new(range, flags);
        if self.conflicts(&segment) {
            return Err(VmError::RegionOverlap);
        }

        self.page_table.insert_range(range, flags);
        self.segments[slot] = Some(segment);
        log::debug!(
            "as: region {} [{}, {}) {:?}",
            slot,
            segment.vbase(),
            segment.vend(),
            flags
        );
        Ok(())
    }

    /// 声明用户栈，返回初始栈指针。
    ///
    /// 栈覆盖栈顶之下的固定页数，可读写执行。重复调用只返回同一个栈指针。
    pub fn define_stack(&mut self) -> VmResult<Vaddr> {
        let config = vm_config();
        let top = Vaddr::from_usize(config.user_stack_top());
        if self.stack.is_some() {
            return Ok(top);
        }

        let end = Vpn::from_addr_floor(top);
        let npages = config.user_stack_pages();
        let start = Vpn::from_usize(end.as_usize().saturating_sub(npages));
        let segment = Segment::new(VpnRange::new(start, end), PteFlags::rwx());
        if self.conflicts(&segment) {
            return Err(VmError::RegionOverlap);
        }

        self.page_table.insert_range(segment.range(), segment.flags());
        self.stack = Some(segment);
        Ok(top)
    }

    /// 开始加载程序映像。
    ///
    /// 按需分页下不预先分配任何物理帧。
    pub fn prepare_load(&mut self) -> VmResult<()> {
        Ok(())
    }

    /// 结束加载程序映像。
    pub fn complete_load(&mut self) -> VmResult<()> {
        Ok(())
    }

    /// 复制出一个独立的地址空间。
    ///
    /// 副本的每一页在返回时都已驻留：源中已驻留的页逐字节复制到新帧，
    /// 尚未访问过的页得到清零的新帧。权限与区域描述符原样保留。
    ///
    /// 任何一次分配失败都会使整个操作返回 [`VmError::OutOfMemory`]，
    /// 已经构造的部分副本被丢弃，其帧随之释放。
    pub fn duplicate(&self) -> VmResult<AddressSpace> {
        let mut copy = AddressSpace {
            page_table: PageTable::new(),
            segments: self.segments,
            stack: self.stack,
            frames: self.frames.clone(),
        };

        for pte in self.page_table.iter() {
            let dst = self.frames.allocate(1).ok_or(VmError::OutOfMemory)?;
            match pte.paddr() {
                Some(src) => self.frames.copy_frame(src, dst),
                None => self.frames.zero_frame(dst),
            }
            let mut entry = PageTableEntry::new(pte.vpn(), pte.flags());
            entry.bind(dst);
            copy.page_table.push(entry);
        }

        Ok(copy)
    }

    /// 切换到该地址空间：使整个 TLB 失效
    pub fn activate(&self, tlb: &Tlb) {
        tlb.invalidate_all();
    }

    /// 查询已驻留页的物理地址；未声明或未驻留时返回 `None`
    pub fn translate(&self, vaddr: Vaddr) -> Option<Paddr> {
        self.page_table
            .find(Vpn::from_addr_floor(vaddr))
            .and_then(PageTableEntry::paddr)
            .map(|paddr| paddr + vaddr.page_offset())
    }

    /// 区域中最低的已驻留页所对应的物理帧
    ///
    /// `index` 为声明顺序；区域不存在或没有任何驻留页时返回 `None`。
    pub fn segment_first_frame(&self, index: usize) -> Option<Paddr> {
        let segment = self.segments.get(index).copied().flatten()?;
        segment
            .range()
            .iter()
            .find_map(|vpn| self.page_table.find(vpn).and_then(PageTableEntry::paddr))
    }

    /// 取得 `vpn` 的物理帧，必要时分配并清零一个新帧。
    ///
    /// 返回物理帧地址，以及这次调用是否进行了首次绑定。
    /// 不检查访问权限。
    pub fn resolve(&mut self, vpn: Vpn) -> VmResult<(Paddr, bool)> {
        let pte = self
            .page_table
            .find_mut(vpn)
            .ok_or(VmError::UnmappedAddress)?;
        if let Some(paddr) = pte.paddr() {
            return Ok((paddr, false));
        }

        let paddr = self.frames.allocate(1).ok_or(VmError::OutOfMemory)?;
        self.frames.zero_frame(paddr);
        pte.bind(paddr);
        Ok((paddr, true))
    }

    /// 以内核身份向用户地址写入数据，途经的页按需绑定。
    ///
    /// 供加载器把程序映像复制进尚未驻留的地址空间。
    pub fn write_bytes_at(&mut self, vaddr: Vaddr, data: &[u8]) -> VmResult<()> {
        let page_size = vm_config().page_size();
        let mut done = 0;
        while done < data.len() {
            let va = vaddr + done;
            let (paddr, _) = self.resolve(Vpn::from_addr_floor(va))?;
            let offset = va.page_offset();
            let n = (page_size - offset).min(data.len() - done);
            let kva = self.frames.arch().paddr_to_kvaddr(paddr.as_usize() + offset);
            // SAFETY: [kva, kva + n) 位于刚解析出的帧内
            unsafe {
                core::ptr::copy_nonoverlapping(data[done..].as_ptr(), kva as *mut u8, n);
            }
            done += n;
        }
        Ok(())
    }

    /// 以内核身份从用户地址读出数据，途经的页按需绑定。
    pub fn read_bytes_at(&mut self, vaddr: Vaddr, buf: &mut [u8]) -> VmResult<()> {
        let page_size = vm_config().page_size();
        let mut done = 0;
        while done < buf.len() {
            let va = vaddr + done;
            let (paddr, _) = self.resolve(Vpn::from_addr_floor(va))?;
            let offset = va.page_offset();
            let n = (page_size - offset).min(buf.len() - done);
            let kva = self.frames.arch().paddr_to_kvaddr(paddr.as_usize() + offset);
            // SAFETY: 同上
            unsafe {
                core::ptr::copy_nonoverlapping(kva as *const u8, buf[done..].as_mut_ptr(), n);
            }
            done += n;
        }
        Ok(())
    }

    fn conflicts(&self, segment: &Segment) -> bool {
        self.segments()
            .chain(self.stack.iter())
            .any(|other| other.overlaps(segment))
    }
}

impl fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressSpace")
            .field("segments", &self.segments)
            .field("stack", &self.stack)
            .field("ptes", &self.page_table.len())
            .field("resident", &self.page_table.resident_pages())
            .finish()
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        let (owned, boot): (Vec<Paddr>, Vec<Paddr>) = self
            .page_table
            .unbind_all()
            .into_iter()
            .partition(|paddr| self.frames.owns_run(*paddr));

        for paddr in &owned {
            self.frames.release(*paddr);
        }
        if !boot.is_empty() {
            // 引导期内存永不归还
            log::warn!("as: keeping {} boot-time frames", boot.len());
        }
        if !owned.is_empty() {
            log::debug!("as: released {} frames", owned.len());
        }
    }
}
