//! 虚拟内存统计
//!
//! 只用于观测，任何正确性判断都不依赖这些计数。

use core::sync::atomic::{AtomicUsize, Ordering};

/// 统计项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum VmStat {
    /// TLB 填充次数（每次缺页成功解析后各一次）
    TlbFault = 0,
    /// 填充时选中的槽位原本无效
    TlbFaultFree,
    /// 填充时选中的槽位原本有效，被覆盖
    TlbFaultReplace,
    /// 整个 TLB 失效的次数（每次激活地址空间一次）
    TlbInvalidate,
    /// 缺页时页已驻留，只需重新装入 TLB
    TlbReload,
    /// 缺页时页尚未驻留，分配并清零了新帧（首次访问）
    PageFaultZero,
}

impl VmStat {
    /// 统计项数量
    pub const COUNT: usize = 6;

    /// 所有统计项，按打印顺序排列
    pub const ALL: [VmStat; Self::COUNT] = [
        VmStat::TlbFault,
        VmStat::TlbFaultFree,
        VmStat::TlbFaultReplace,
        VmStat::TlbInvalidate,
        VmStat::TlbReload,
        VmStat::PageFaultZero,
    ];

    /// 统计项名称
    pub fn name(self) -> &'static str {
        match self {
            VmStat::TlbFault => "TLB Faults",
            VmStat::TlbFaultFree => "TLB Faults with Free",
            VmStat::TlbFaultReplace => "TLB Faults with Replace",
            VmStat::TlbInvalidate => "TLB Invalidations",
            VmStat::TlbReload => "TLB Reloads",
            VmStat::PageFaultZero => "Page Faults (Zeroed)",
        }
    }
}

/// 一组统计计数器
#[derive(Debug, Default)]
pub struct VmStats {
    counters: [AtomicUsize; VmStat::COUNT],
}

impl VmStats {
    /// 创建全零的计数器
    pub fn new() -> Self {
        Self::default()
    }

    /// 计数加一
    #[inline]
    pub fn inc(&self, stat: VmStat) {
        self.counters[stat as usize].fetch_add(1, Ordering::Relaxed);
    }

    /// 读取计数
    #[inline]
    pub fn get(&self, stat: VmStat) -> usize {
        self.counters[stat as usize].load(Ordering::Relaxed)
    }

    /// 通过日志输出所有计数，并检查 TLB 计数之间的一致性
    pub fn print(&self) {
        for stat in VmStat::ALL {
            log::info!("vmstats: {:<26}{:>10}", stat.name(), self.get(stat));
        }

        let faults = self.get(VmStat::TlbFault);
        let free = self.get(VmStat::TlbFaultFree);
        let replace = self.get(VmStat::TlbFaultReplace);
        if free + replace != faults {
            log::warn!(
                "vmstats: TLB faults ({}) != free ({}) + replace ({})",
                faults,
                free,
                replace
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_independent() {
        let stats = VmStats::new();
        stats.inc(VmStat::TlbFault);
        stats.inc(VmStat::TlbFault);
        stats.inc(VmStat::TlbReload);
        assert_eq!(stats.get(VmStat::TlbFault), 2);
        assert_eq!(stats.get(VmStat::TlbReload), 1);
        assert_eq!(stats.get(VmStat::PageFaultZero), 0);
    }

    #[test]
    fn test_all_covers_every_stat() {
        for (i, stat) in VmStat::ALL.iter().enumerate() {
            assert_eq!(*stat as usize, i);
        }
    }
}
