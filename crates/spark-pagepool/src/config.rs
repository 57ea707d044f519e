use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, Result};

/// 默认页大小：1 MiB，与服务端默认的读写缓冲页保持一致。
pub const DEFAULT_PAGE_SIZE: usize = 1024 * 1024;

/// 默认清扫间隔（毫秒）。
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 500;

/// 单页允许的最大字节数；超过后无法构造页对齐的 `Layout`。
pub const MAX_PAGE_SIZE: usize = isize::MAX as usize - (crate::backing::OFF_HEAP_ALIGN - 1);

/// 分页缓冲池配置。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把“页数量 / 页大小 / 是否走堆外 / 清扫频率”四个调优旋钮集中在一个可序列化结构里，
///   宿主可以直接从 TOML/JSON 配置段反序列化，而不必在代码里硬编码常量；
/// - 缺省值沿用服务端的经验值：页数等于可用并行度、每页 1 MiB、堆外、每 500ms 清扫一次。
///
/// ## 契约（What）
/// - `page_count`：页数量，推荐与工作线程数相同；为 0 时所有请求都走独立分配；
/// - `page_size`：每页字节数，不得超过 [`MAX_PAGE_SIZE`]；
/// - `off_heap`：`true` 时底层存储来自页对齐的全局分配器块，否则为普通堆上 `Box<[u8]>`；
/// - `sweep_interval_ms`：后台清扫间隔，`None` 表示不启动清扫线程（由宿主自行调用 `Pool::sweep`）。
///
/// ## 注意事项（Trade-offs）
/// - 使用毫秒整数而非 `Duration`，让配置文件保持扁平、可读。
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    pub page_count: usize,
    pub page_size: usize,
    pub off_heap: bool,
    pub sweep_interval_ms: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            page_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            page_size: DEFAULT_PAGE_SIZE,
            off_heap: true,
            sweep_interval_ms: Some(DEFAULT_SWEEP_INTERVAL_MS),
        }
    }
}

impl PoolConfig {
    /// 以显式的页参数创建配置，不启动后台清扫。
    pub fn new(page_count: usize, page_size: usize, off_heap: bool) -> Self {
        Self {
            page_count,
            page_size,
            off_heap,
            sweep_interval_ms: None,
        }
    }

    pub fn with_page_count(mut self, page_count: usize) -> Self {
        self.page_count = page_count;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_off_heap(mut self, off_heap: bool) -> Self {
        self.off_heap = off_heap;
        self
    }

    /// 设置后台清扫间隔；传入 `None` 关闭清扫线程。
    pub fn with_sweep_interval(mut self, interval: Option<Duration>) -> Self {
        self.sweep_interval_ms =
            interval.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// 清扫间隔的 `Duration` 视图。
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_ms.map(Duration::from_millis)
    }

    /// 校验配置。
    ///
    /// - `page_size` 超过 [`MAX_PAGE_SIZE`] 时返回 [`PoolError::BackingLayout`]；
    /// - `sweep_interval_ms == Some(0)` 时返回 [`PoolError::InvalidConfig`]，避免清扫线程空转。
    pub fn validate(&self) -> Result<()> {
        if self.page_size > MAX_PAGE_SIZE {
            return Err(PoolError::BackingLayout {
                page_size: self.page_size,
            });
        }
        if self.sweep_interval_ms == Some(0) {
            return Err(PoolError::InvalidConfig {
                field: "sweep_interval_ms",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }
}
