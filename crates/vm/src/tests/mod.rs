// vm 的单元测试。
//
// 硬件相关的部分全部由 test-support 中的 mock 提供：
// 物理内存是宿主堆上的一块页对齐内存（paddr == kvaddr），TLB 是一组原子变量。
// 由于孤儿规则，这里用本地的包装类型为 mock 实现 vm 的 trait。

extern crate std;

use crate::address::{Paddr, UsizeConvert};
use crate::arch_ops::{ArchVmOps, ProcessControl};
use crate::config::{register_config, VmConfig};
use crate::fault::FaultHandler;
use crate::frame_allocator::FrameAllocator;
use crate::tlb::{TlbEntry, TlbOps};
use alloc::sync::Arc;
use test_support::mock::arch::MOCK_ARCH_OPS;
use test_support::mock::vm::{MockProcess, MockRam, MockTlb, MOCK_PAGE_SIZE, MOCK_VM_CONFIG};

mod fault;

pub(crate) const PAGE: usize = MOCK_PAGE_SIZE;

struct TestArch;

impl sync::ArchOps for TestArch {
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

struct TestConfig;

impl VmConfig for TestConfig {
    fn page_size(&self) -> usize {
        MOCK_VM_CONFIG.page_size()
    }

    fn user_stack_top(&self) -> usize {
        MOCK_VM_CONFIG.user_stack_top()
    }

    fn user_stack_pages(&self) -> usize {
        MOCK_VM_CONFIG.user_stack_pages()
    }
}

static TEST_ARCH: TestArch = TestArch;
static TEST_CONFIG: TestConfig = TestConfig;
static INIT: std::sync::Once = std::sync::Once::new();

/// 注册 mock 的架构操作与配置，可重复调用
pub(crate) fn setup() {
    INIT.call_once(|| unsafe {
        sync::register_arch_ops(&TEST_ARCH);
        register_config(&TEST_CONFIG);
    });
}

pub(crate) struct TestRam(pub Arc<MockRam>);

impl ArchVmOps for TestRam {
    fn ram_getsize(&self) -> (usize, usize) {
        self.0.ram_getsize()
    }

    fn ram_stealmem(&self, npages: usize) -> Option<usize> {
        self.0.ram_stealmem(npages)
    }

    fn paddr_to_kvaddr(&self, paddr: usize) -> usize {
        self.0.paddr_to_kvaddr(paddr)
    }

    fn kvaddr_to_paddr(&self, kvaddr: usize) -> usize {
        self.0.kvaddr_to_paddr(kvaddr)
    }
}

pub(crate) struct TestTlb(pub MockTlb);

impl TlbOps for TestTlb {
    fn slot_count(&self) -> usize {
        self.0.slot_count()
    }

    fn read(&self, slot: usize) -> TlbEntry {
        let (hi, lo) = self.0.read(slot);
        TlbEntry { hi, lo }
    }

    fn write(&self, slot: usize, entry: TlbEntry) {
        self.0.write(slot, entry.hi, entry.lo);
    }

    fn probe(&self, hi: usize) -> Option<usize> {
        self.0.probe(hi)
    }
}

pub(crate) struct TestProcess(pub MockProcess);

impl ProcessControl for TestProcess {
    fn kill_current(&self, status: i32) {
        self.0.kill_current(status);
    }
}

/// 一块 `nframes` 帧的模拟内存，以及尚未初始化的分配器
pub(crate) fn allocator(nframes: usize) -> (Arc<MockRam>, Arc<FrameAllocator>) {
    setup();
    let ram = Arc::new(MockRam::new(nframes));
    let frames = Arc::new(FrameAllocator::new(Arc::new(TestRam(ram.clone()))));
    (ram, frames)
}

/// 同上，但分配器已经进入 Ready 状态
pub(crate) fn ready_allocator(nframes: usize) -> (Arc<MockRam>, Arc<FrameAllocator>) {
    let (ram, frames) = allocator(nframes);
    frames.initialize();
    (ram, frames)
}

/// 一套完整的缺页处理环境
pub(crate) struct Fixture {
    pub ram: Arc<MockRam>,
    pub tlb: Arc<TestTlb>,
    pub process: Arc<TestProcess>,
    pub handler: FaultHandler,
}

impl Fixture {
    pub fn new(nframes: usize, slots: usize) -> Self {
        let (ram, frames) = ready_allocator(nframes);
        let tlb = Arc::new(TestTlb(MockTlb::new(slots)));
        let process = Arc::new(TestProcess(MockProcess::new()));
        let handler = FaultHandler::new(frames, tlb.clone(), process.clone());
        Fixture {
            ram,
            tlb,
            process,
            handler,
        }
    }

    /// 读取物理地址处的字节
    pub fn byte_at(&self, paddr: Paddr) -> u8 {
        self.ram.read_byte(paddr.as_usize())
    }
}
