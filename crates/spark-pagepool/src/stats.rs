//! 页与池的运行时统计。
//!
//! # 设计概要（How）
//! - 计数器全部使用 `Relaxed` 原子操作：统计只用于观测，不参与任何同步决策；
//! - 快照类型派生 `Serialize`，宿主可以直接导出为 JSON 或挂到监控端点；
//! - 在有并发租借/归还时读取的快照只是近似值，静止时各字节数之和严格等于页容量。

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub(crate) struct PageMetrics {
    allocations: AtomicU64,
    fast_reuses: AtomicU64,
    drains: AtomicU64,
    misses: AtomicU64,
    leased_bytes: AtomicUsize,
    pending_bytes: AtomicUsize,
}

impl PageMetrics {
    pub(crate) fn record_lease(&self, bytes: usize) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.leased_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_fast_reuse(&self) {
        self.fast_reuses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drain(&self) {
        self.drains.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// 区间从租借方转入归还队列。
    pub(crate) fn record_return(&self, bytes: usize) {
        saturating_sub(&self.leased_bytes, bytes);
        self.pending_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// 区间离开归还队列（被复用或被合并进空闲表）。
    pub(crate) fn record_dequeue(&self, bytes: usize) {
        saturating_sub(&self.pending_bytes, bytes);
    }

    pub(crate) fn snapshot(
        &self,
        index: usize,
        capacity: usize,
        free_bytes: usize,
        free_entries: usize,
    ) -> PageStats {
        PageStats {
            index,
            capacity,
            free_bytes,
            free_entries,
            leased_bytes: self.leased_bytes.load(Ordering::Relaxed),
            pending_bytes: self.pending_bytes.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
            fast_reuses: self.fast_reuses.load(Ordering::Relaxed),
            drains: self.drains.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// 单页统计快照。
///
/// - `free_bytes` / `free_entries`：空闲表中已合并的字节数与条目数，条目数越多碎片越严重；
/// - `leased_bytes`：仍被切片占用的字节数（无锁复用路径按整段区间计）；
/// - `pending_bytes`：已归还但尚未合并的字节数；
/// - `allocations`：该页成功服务的租借次数，其中 `fast_reuses` 次走了无锁复用路径；
/// - `drains`：持锁清空归还队列的次数；`misses`：容量不足、交由池降级的次数。
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct PageStats {
    pub index: usize,
    pub capacity: usize,
    pub free_bytes: usize,
    pub free_entries: usize,
    pub leased_bytes: usize,
    pub pending_bytes: usize,
    pub allocations: u64,
    pub fast_reuses: u64,
    pub drains: u64,
    pub misses: u64,
}

impl PageStats {
    /// 已合并空闲 + 待合并 + 已租借，静止时应等于 `capacity`。
    pub fn accounted_bytes(&self) -> usize {
        self.free_bytes + self.pending_bytes + self.leased_bytes
    }
}

/// 池级统计快照。
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct PoolStats {
    pub pages: Vec<PageStats>,
    pub standalone_allocations: u64,
    pub standalone_bytes: u64,
}

impl PoolStats {
    pub fn capacity(&self) -> usize {
        self.pages.iter().map(|page| page.capacity).sum()
    }

    pub fn free_bytes(&self) -> usize {
        self.pages.iter().map(|page| page.free_bytes).sum()
    }

    pub fn leased_bytes(&self) -> usize {
        self.pages.iter().map(|page| page.leased_bytes).sum()
    }

    pub fn pending_bytes(&self) -> usize {
        self.pages.iter().map(|page| page.pending_bytes).sum()
    }
}

#[derive(Debug, Default)]
pub(crate) struct StandaloneMetrics {
    allocations: AtomicU64,
    bytes: AtomicU64,
}

impl StandaloneMetrics {
    pub(crate) fn record(&self, bytes: usize) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }

    pub(crate) fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

fn saturating_sub(target: &AtomicUsize, value: usize) {
    let _ = target.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_sub(value))
    });
}
