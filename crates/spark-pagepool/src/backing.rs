use core::{alloc::Layout, ptr::NonNull};
use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error};

use crate::error::{PoolError, Result};

/// 堆外页的对齐要求，与常见的系统页大小一致，便于直接交给内核做 I/O。
pub const OFF_HEAP_ALIGN: usize = 4096;

/// 页的底层存储。
///
/// # 教案式说明
/// - **意图 (Why)**：页需要一块固定容量、生命周期内地址不变的连续内存，
///   所有切片都以 `(start, end)` 偏移借用其中的子区间；
/// - **逻辑 (How)**：
///   - `Heap`：普通 `Box<[u8]>`，转成裸指针保存，`Drop` 时再还原回 `Box` 释放；
///   - `OffHeap`：向全局分配器申请按 [`OFF_HEAP_ALIGN`] 对齐的清零块，`Drop` 时按同一 `Layout` 归还；
/// - **契约 (What)**：基址在 `Backing` 存活期间恒定；调用方负责保证并发访问的区间互不重叠，
///   这一点由页的平铺不变量保证；
/// - **风险 (Trade-offs)**：存储以裸指针形式对外暴露，因此 `Send`/`Sync` 需要手工声明。
pub(crate) struct Backing {
    ptr: NonNull<u8>,
    capacity: usize,
    kind: BackingKind,
}

enum BackingKind {
    Heap,
    OffHeap(Layout),
    Empty,
}

// SAFETY: `Backing` 独占其内存块，只通过裸指针与偏移区间被访问，
// 并发访问的互斥性由页的平铺不变量（区间两两不相交）保证。
unsafe impl Send for Backing {}
// SAFETY: 同上；`&Backing` 只暴露基址与容量两个不可变值。
unsafe impl Sync for Backing {}

impl Backing {
    /// 申请一块容量为 `capacity` 的清零存储。
    pub(crate) fn allocate(capacity: usize, off_heap: bool) -> Result<Self> {
        if capacity == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                capacity: 0,
                kind: BackingKind::Empty,
            });
        }

        if off_heap {
            let layout = Layout::from_size_align(capacity, OFF_HEAP_ALIGN)
                .map_err(|_| PoolError::BackingLayout {
                    page_size: capacity,
                })?;
            // SAFETY: `layout` 的大小非零。
            let raw = unsafe { alloc_zeroed(layout) };
            let Some(ptr) = NonNull::new(raw) else {
                handle_alloc_error(layout);
            };
            Ok(Self {
                ptr,
                capacity,
                kind: BackingKind::OffHeap(layout),
            })
        } else {
            let boxed: Box<[u8]> = vec![0u8; capacity].into_boxed_slice();
            let raw = Box::into_raw(boxed).cast::<u8>();
            // SAFETY: `Box::into_raw` 永不返回空指针。
            let ptr = unsafe { NonNull::new_unchecked(raw) };
            Ok(Self {
                ptr,
                capacity,
                kind: BackingKind::Heap,
            })
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn is_off_heap(&self) -> bool {
        matches!(self.kind, BackingKind::OffHeap(_))
    }

    /// 返回 `[start, start + len)` 区间的起始指针。
    ///
    /// 调用方需保证 `start + len <= capacity`，越界在 debug 构建下断言。
    pub(crate) fn window_ptr(&self, start: usize, len: usize) -> *mut u8 {
        debug_assert!(start.checked_add(len).is_some_and(|end| end <= self.capacity));
        // SAFETY: 偏移不超过容量（见上方断言），`add` 的结果仍在同一分配内或恰为末尾。
        unsafe { self.ptr.as_ptr().add(start) }
    }
}

impl Drop for Backing {
    fn drop(&mut self) {
        match self.kind {
            BackingKind::Heap => {
                let slice = core::ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.capacity);
                // SAFETY: 指针来自 `Box::<[u8]>::into_raw`，长度与原始切片一致且只释放一次。
                drop(unsafe { Box::from_raw(slice) });
            }
            BackingKind::OffHeap(layout) => {
                // SAFETY: 指针由 `alloc_zeroed(layout)` 得到，使用相同 `layout` 归还。
                unsafe { dealloc(self.ptr.as_ptr(), layout) };
            }
            BackingKind::Empty => {}
        }
    }
}

impl core::fmt::Debug for Backing {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Backing")
            .field("capacity", &self.capacity)
            .field("off_heap", &self.is_off_heap())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_heap_backing_is_page_aligned_and_zeroed() {
        let backing = Backing::allocate(8192, true).expect("堆外页分配失败");
        assert!(backing.is_off_heap());
        let ptr = backing.window_ptr(0, 8192);
        assert_eq!(ptr as usize % OFF_HEAP_ALIGN, 0);
        let bytes = unsafe { core::slice::from_raw_parts(ptr, 8192) };
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn heap_backing_exposes_full_capacity() {
        let backing = Backing::allocate(100, false).expect("堆上页分配失败");
        assert!(!backing.is_off_heap());
        assert_eq!(backing.capacity(), 100);
        let tail = backing.window_ptr(90, 10);
        unsafe { tail.write_bytes(7, 10) };
        let bytes = unsafe { core::slice::from_raw_parts(backing.window_ptr(0, 100), 100) };
        assert_eq!(&bytes[90..], &[7u8; 10]);
    }

    #[test]
    fn zero_capacity_needs_no_allocation() {
        let backing = Backing::allocate(0, true).expect("空页不应失败");
        assert_eq!(backing.capacity(), 0);
    }
}
