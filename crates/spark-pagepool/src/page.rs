use alloc::sync::Arc;
use core::{
    fmt,
    ops::Range,
    sync::atomic::{AtomicBool, Ordering},
};

use crossbeam_queue::SegQueue;
use crossbeam_utils::CachePadded;
use spin::Mutex;

use crate::{
    backing::Backing,
    error::Result,
    free_list::{FreeList, FreeRange},
    slice::Slice,
    stats::{PageMetrics, PageStats},
};

/// `Page` 是一块大块底层存储及其子区间簿记，对外以可克隆句柄的形式出现。
///
/// # 模块角色（Why）
/// - 页是分配器的竞争单元：同一页的空闲表修改全部串行化在一把互斥锁上，
///   配合线程亲和，常态下每把锁只有一个工作线程与清扫线程在用；
/// - 归还路径完全无锁，I/O 完成回调可以随时把缓冲交还，而不会被分配方阻塞。
///
/// # 核心机制（How）
/// - `free_list`：`spin::Mutex<FreeList>`，按偏移排序且已合并的空闲区间；
/// - `return_queue`：`SegQueue<FreeRange>`，已归还但尚未并回空闲表的区间；
/// - `idle`：清扫用的空闲标记，每次租借都会清掉它；
/// - 两个热点字段各自 `CachePadded`，避免归还方的 CAS 与持锁方互相抖动缓存行。
///
/// # 契约说明（What）
/// - **平铺不变量**：空闲表、归还队列、所有未归还切片的区间恰好铺满 `[0, capacity)`，
///   既不重叠也无空隙；
/// - `allocate` 返回 `None` 表示容量不足，调用方应降级为独立分配，而不是阻塞等待。
#[derive(Clone)]
pub struct Page {
    shared: Arc<PageShared>,
}

pub(crate) struct PageShared {
    index: usize,
    backing: Backing,
    free_list: CachePadded<Mutex<FreeList>>,
    return_queue: CachePadded<SegQueue<FreeRange>>,
    idle: AtomicBool,
    metrics: PageMetrics,
}

impl Page {
    /// 创建一个独立使用的页（下标为 0）。
    pub fn new(capacity: usize, off_heap: bool) -> Result<Self> {
        Self::with_index(0, capacity, off_heap)
    }

    pub(crate) fn with_index(index: usize, capacity: usize, off_heap: bool) -> Result<Self> {
        let backing = Backing::allocate(capacity, off_heap)?;
        tracing::debug!(page = index, capacity, off_heap, "buffer page allocated");
        Ok(Self {
            shared: Arc::new(PageShared {
                index,
                backing,
                free_list: CachePadded::new(Mutex::new(FreeList::new(capacity))),
                return_queue: CachePadded::new(SegQueue::new()),
                idle: AtomicBool::new(true),
                metrics: PageMetrics::default(),
            }),
        })
    }

    pub fn index(&self) -> usize {
        self.shared.index
    }

    pub fn capacity(&self) -> usize {
        self.shared.backing.capacity()
    }

    pub fn is_off_heap(&self) -> bool {
        self.shared.backing.is_off_heap()
    }

    /// 从本页租借 `size` 字节。
    ///
    /// # 实现策略
    /// 1. 超过页容量的请求直接返回 `None`，不碰归还队列与互斥锁；
    /// 2. 无锁弹出一个归还区间，长度够用就原样复用（视图截取前 `size` 字节）；
    /// 3. 否则持锁清空整个归还队列并逐个合并，再从空闲表切分：
    ///    单条目走快速路径，多条目按偏移首次适配；
    /// 4. 仍无合适区间时释放锁并返回 `None`。
    ///
    /// # 设计取舍
    /// 步骤 2 刻意不检查空闲表：用可能的碎片换取零竞争，过大的复用区间会在归还后再被合并。
    pub fn allocate(&self, size: usize) -> Option<Slice> {
        let shared = &self.shared;
        if size > shared.backing.capacity() {
            shared.metrics.record_miss();
            return None;
        }
        shared.idle.store(false, Ordering::Relaxed);

        let popped = shared.return_queue.pop();
        if let Some(range) = popped {
            shared.metrics.record_dequeue(range.len());
            if range.len() >= size {
                shared.metrics.record_fast_reuse();
                return Some(self.lease(range, size));
            }
        }

        let carved = {
            let mut free_list = shared.free_list.lock();
            if let Some(range) = popped {
                free_list.coalesce(range);
            }
            shared.drain_into(&mut free_list);
            free_list.allocate(size)
        };

        match carved {
            Some(range) => Some(self.lease(range, size)),
            None => {
                shared.metrics.record_miss();
                tracing::trace!(
                    page = shared.index,
                    size,
                    "no free range large enough, caller falls back to standalone allocation"
                );
                None
            }
        }
    }

    /// 租借 `size` 字节，本页容量不足时返回独立切片。
    ///
    /// 适用于会话一次性拿到页句柄、之后在该页上反复租借读写缓冲的场景。
    pub fn allocate_or_standalone(&self, size: usize) -> Slice {
        self.allocate(size).unwrap_or_else(|| Slice::standalone(size))
    }

    /// 周期性清扫入口，由池的清扫线程或宿主调度器调用。
    ///
    /// - 自上次清扫以来服务过租借：只打上空闲标记，推迟合并；
    /// - 连续两个周期无租借、归还队列非空且互斥锁无人持有：清空并合并归还队列。
    ///
    /// 返回本次是否做了合并。
    pub fn try_clean(&self) -> bool {
        let shared = &self.shared;
        if !shared.idle.swap(true, Ordering::Relaxed) {
            return false;
        }
        if shared.return_queue.is_empty() {
            return false;
        }
        let Some(mut free_list) = shared.free_list.try_lock() else {
            return false;
        };
        shared.drain_into(&mut free_list) > 0
    }

    /// 立即持锁清空归还队列并合并，返回合并的区间数。
    pub fn reclaim(&self) -> usize {
        let mut free_list = self.shared.free_list.lock();
        self.shared.drain_into(&mut free_list)
    }

    /// 当前空闲表的区间快照（按偏移升序）。
    pub fn free_ranges(&self) -> Vec<Range<usize>> {
        self.shared.free_list.lock().ranges()
    }

    pub fn statistics(&self) -> PageStats {
        let (free_bytes, free_entries) = {
            let free_list = self.shared.free_list.lock();
            (free_list.free_bytes(), free_list.len())
        };
        self.shared.metrics.snapshot(
            self.shared.index,
            self.capacity(),
            free_bytes,
            free_entries,
        )
    }

    fn lease(&self, range: FreeRange, size: usize) -> Slice {
        self.shared.metrics.record_lease(range.len());
        Slice::pooled(Arc::clone(&self.shared), range, size)
    }
}

impl PageShared {
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn backing(&self) -> &Backing {
        &self.backing
    }

    /// 归还路径：只压入无锁队列，不合并。
    pub(crate) fn recycle(&self, range: FreeRange) {
        if range.is_empty() {
            return;
        }
        self.metrics.record_return(range.len());
        self.return_queue.push(range);
    }

    /// 在持有空闲表锁的前提下清空归还队列，返回合并的区间数。
    fn drain_into(&self, free_list: &mut FreeList) -> usize {
        let mut drained = 0;
        while let Some(range) = self.return_queue.pop() {
            self.metrics.record_dequeue(range.len());
            free_list.coalesce(range);
            drained += 1;
        }
        if drained > 0 {
            self.metrics.record_drain();
            tracing::trace!(
                page = self.index,
                drained,
                free_entries = free_list.len(),
                "return queue drained into free list"
            );
        }
        drained
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("index", &self.shared.index)
            .field("backing", &self.shared.backing)
            .field("idle", &self.shared.idle.load(Ordering::Relaxed))
            .finish()
    }
}
