//! 页内空闲区间表。
//!
//! # 模块定位（Why）
//! - 页的“已合并空闲区间”以按偏移排序的 `Vec<FreeRange>` 保存，取代链式节点，
//!   从而避免互相引用的可变节点带来的别名问题；
//! - 本模块只负责纯算法：切分（carve）与合并（coalesce），不关心锁与并发，
//!   调用方（`Page`）保证只在持有页互斥锁时修改它。
//!
//! # 不变量（What）
//! - 所有条目非空、两两不相交，并按 `start` 严格递增；
//! - 每次 `coalesce` 后，与插入区间相邻的条目都已被合并。

use core::ops::Range;

/// 半开区间 `[start, end)`。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct FreeRange {
    pub(crate) start: usize,
    pub(crate) end: usize,
}

impl FreeRange {
    pub(crate) fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub(crate) fn len(&self) -> usize {
        self.end - self.start
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub(crate) fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

#[derive(Debug, Default)]
pub(crate) struct FreeList {
    entries: Vec<FreeRange>,
}

impl FreeList {
    /// 以一整块 `[0, capacity)` 初始化；容量为 0 时为空表。
    pub(crate) fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(8);
        if capacity > 0 {
            entries.push(FreeRange::new(0, capacity));
        }
        Self { entries }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn free_bytes(&self) -> usize {
        self.entries.iter().map(FreeRange::len).sum()
    }

    pub(crate) fn ranges(&self) -> Vec<Range<usize>> {
        self.entries.iter().map(FreeRange::as_range).collect()
    }

    /// 从空闲表中切出 `size` 字节。
    ///
    /// - 只有一个条目时走快速路径，直接尝试该条目；
    /// - 否则按偏移顺序首次适配（first fit）；
    /// - 没有足够大的条目时返回 `None`。
    pub(crate) fn allocate(&mut self, size: usize) -> Option<FreeRange> {
        match self.entries.len() {
            0 => None,
            1 => self.fast_allocate(size),
            _ => self.slow_allocate(size),
        }
    }

    fn fast_allocate(&mut self, size: usize) -> Option<FreeRange> {
        debug_assert_eq!(self.entries.len(), 1);
        self.carve(0, size)
    }

    fn slow_allocate(&mut self, size: usize) -> Option<FreeRange> {
        let index = self.entries.iter().position(|entry| entry.len() >= size)?;
        self.carve(index, size)
    }

    /// 从第 `index` 个条目的头部切出 `size` 字节。
    fn carve(&mut self, index: usize, size: usize) -> Option<FreeRange> {
        let entry = &mut self.entries[index];
        let available = entry.len();
        if available < size {
            return None;
        }
        if available == size {
            return Some(self.entries.remove(index));
        }
        let carved = FreeRange::new(entry.start, entry.start + size);
        entry.start += size;
        Some(carved)
    }

    /// 把归还的区间并入空闲表，保持有序并合并相邻条目。
    ///
    /// 空区间直接忽略：它不携带任何容量，插入后只会破坏“条目非空”的不变量。
    pub(crate) fn coalesce(&mut self, released: FreeRange) {
        if released.is_empty() {
            return;
        }

        for index in 0..self.entries.len() {
            let entry = self.entries[index];
            debug_assert!(
                entry.end <= released.start || released.end <= entry.start,
                "released range {released:?} overlaps free entry {entry:?}",
            );

            if entry.end == released.start {
                self.entries[index].end = released.end;
                let merged_end = released.end;
                if let Some(next) = self.entries.get(index + 1).copied() {
                    if next.start == merged_end {
                        self.entries[index].end = next.end;
                        self.entries.remove(index + 1);
                    }
                }
                return;
            }
            if released.end == entry.start {
                self.entries[index].start = released.start;
                return;
            }
            if entry.start > released.end {
                self.entries.insert(index, released);
                return;
            }
        }
        self.entries.push(released);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: usize, end: usize) -> FreeRange {
        FreeRange::new(start, end)
    }

    #[test]
    fn exact_fit_consumes_the_entry() {
        let mut list = FreeList::new(64);
        assert_eq!(list.allocate(64), Some(range(0, 64)));
        assert_eq!(list.len(), 0);
        assert_eq!(list.allocate(1), None);
    }

    #[test]
    fn split_advances_the_entry_start() {
        let mut list = FreeList::new(1024);
        assert_eq!(list.allocate(100), Some(range(0, 100)));
        assert_eq!(list.ranges(), vec![100..1024]);
    }

    #[test]
    fn fast_path_reports_no_space_when_single_entry_is_too_small() {
        let mut list = FreeList::new(32);
        assert_eq!(list.allocate(33), None);
        assert_eq!(list.ranges(), vec![0..32]);
    }

    #[test]
    fn slow_path_picks_first_fit_in_offset_order() {
        let mut list = FreeList::new(0);
        list.coalesce(range(0, 10));
        list.coalesce(range(20, 60));
        list.coalesce(range(80, 200));
        assert_eq!(list.allocate(30), Some(range(20, 50)));
        assert_eq!(list.ranges(), vec![0..10, 50..60, 80..200]);
        assert_eq!(list.allocate(100), Some(range(80, 180)));
        assert_eq!(list.allocate(500), None);
    }

    #[test]
    fn coalesce_extends_preceding_entry_and_merges_follower() {
        let mut list = FreeList::new(0);
        list.coalesce(range(0, 100));
        list.coalesce(range(300, 1024));
        list.coalesce(range(100, 300));
        assert_eq!(list.ranges(), vec![0..1024]);
    }

    #[test]
    fn coalesce_extends_following_entry_backwards() {
        let mut list = FreeList::new(0);
        list.coalesce(range(50, 80));
        list.coalesce(range(10, 50));
        assert_eq!(list.ranges(), vec![10..80]);
    }

    #[test]
    fn coalesce_inserts_isolated_range_in_order() {
        let mut list = FreeList::new(0);
        list.coalesce(range(100, 120));
        list.coalesce(range(0, 10));
        list.coalesce(range(50, 60));
        list.coalesce(range(200, 210));
        assert_eq!(list.ranges(), vec![0..10, 50..60, 100..120, 200..210]);
        assert_eq!(list.free_bytes(), 50);
    }

    #[test]
    fn empty_ranges_are_ignored() {
        let mut list = FreeList::new(0);
        list.coalesce(range(5, 5));
        assert_eq!(list.len(), 0);
        list.coalesce(range(0, 10));
        list.coalesce(range(20, 20));
        assert_eq!(list.ranges(), vec![0..10]);
    }

    #[test]
    fn zero_sized_request_leaves_entry_untouched() {
        let mut list = FreeList::new(16);
        assert_eq!(list.allocate(0), Some(range(0, 0)));
        assert_eq!(list.ranges(), vec![0..16]);
    }
}
