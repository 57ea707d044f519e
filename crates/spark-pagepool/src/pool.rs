use alloc::sync::Arc;
use core::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};
use std::{io, thread::JoinHandle};

use spin::Mutex;

use crate::{
    affinity,
    config::PoolConfig,
    error::{PoolError, Result},
    page::Page,
    slice::Slice,
    stats::{PoolStats, StandaloneMetrics},
    sweeper::Sweeper,
};

/// `Pool` 是分页缓冲池的入口：固定数量的页 + 线程亲和路由 + 独立分配兜底。
///
/// # 模块角色（Why）
/// - 为套接字读写循环提供统一的缓冲来源，把每次 I/O 的堆分配换成页内区间的切分与复用；
/// - 通过线程亲和让每个工作线程只竞争自己那一页的互斥锁；
/// - 页容量不足时降级为独立分配，保证最坏情况不劣于不做池化。
///
/// # 核心机制（How）
/// - `pages`：构造时一次性创建，之后数量不变；
/// - 线程通过 [`Pool::register_current_thread`] 或 [`Pool::spawn_worker`] 固定到某页；
///   未固定或下标越界的线程直接拿独立切片；
/// - 可选的后台清扫线程按配置间隔调用 [`Pool::sweep`]。
///
/// # 契约说明（What）
/// - `allocate` 总会返回长度恰为 `size` 的切片，永不因容量问题失败或阻塞；
/// - `Pool` 可廉价克隆并跨线程共享；所有克隆共享同一组页；
/// - 池被释放后，仍未归还的切片依旧有效，底层存储在最后一个切片释放后回收。
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

pub(crate) struct PoolInner {
    id: u64,
    page_size: usize,
    pages: Box<[Page]>,
    cursor: AtomicUsize,
    standalone: StandaloneMetrics,
    sweeper: Mutex<Option<Sweeper>>,
}

impl Pool {
    /// 按页参数创建池，不启动后台清扫。
    ///
    /// # Panics
    /// `page_size` 超过单块内存布局上限时 panic；需要可恢复错误时使用 [`Pool::with_config`]。
    pub fn new(page_count: usize, page_size: usize, use_off_heap: bool) -> Self {
        match Self::with_config(PoolConfig::new(page_count, page_size, use_off_heap)) {
            Ok(pool) => pool,
            Err(err) => panic!("cannot build buffer pool: {err}"),
        }
    }

    /// 按配置创建池；配置了清扫间隔时同时启动后台清扫线程。
    pub fn with_config(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let pages = (0..config.page_count)
            .map(|index| Page::with_index(index, config.page_size, config.off_heap))
            .collect::<Result<Vec<_>>>()?
            .into_boxed_slice();

        let inner = Arc::new(PoolInner {
            id: affinity::next_pool_id(),
            page_size: config.page_size,
            pages,
            cursor: AtomicUsize::new(0),
            standalone: StandaloneMetrics::default(),
            sweeper: Mutex::new(None),
        });

        if let Some(interval) = config.sweep_interval() {
            let sweeper = Sweeper::start(Arc::downgrade(&inner), interval).map_err(|err| {
                PoolError::SweeperSpawn {
                    reason: err.to_string(),
                }
            })?;
            *inner.sweeper.lock() = Some(sweeper);
        }

        tracing::debug!(
            pool = inner.id,
            page_count = config.page_count,
            page_size = config.page_size,
            off_heap = config.off_heap,
            sweep_interval_ms = config.sweep_interval_ms,
            "buffer pool created"
        );
        Ok(Self { inner })
    }

    /// 租借 `size` 字节。
    ///
    /// 已固定且下标有效的线程从所属页切分；未固定、越界或页容量不足时返回独立切片。
    pub fn allocate(&self, size: usize) -> Slice {
        if let Some(page) = self.pinned_page() {
            if let Some(slice) = page.allocate(size) {
                return slice;
            }
        }
        self.standalone(size)
    }

    /// 把当前线程固定到第 `page_index` 页。
    ///
    /// 应在线程开始租借之前调用。越界下标不会报错，但该线程的租借全部走独立分配。
    pub fn register_current_thread(&self, page_index: usize) {
        if page_index >= self.inner.pages.len() {
            tracing::warn!(
                pool = self.inner.id,
                page_index,
                page_count = self.inner.pages.len(),
                "thread pinned to a page index outside the pool; allocations will be standalone"
            );
        }
        affinity::pin(self.inner.id, page_index);
    }

    /// 解除当前线程对本池的固定，返回此前是否固定在本池上。
    pub fn unregister_current_thread(&self) -> bool {
        affinity::unpin(self.inner.id)
    }

    /// 当前线程固定到本池的页下标（仅在下标有效时返回）。
    pub fn current_thread_page_index(&self) -> Option<usize> {
        affinity::pinned_index(self.inner.id).filter(|index| *index < self.inner.pages.len())
    }

    /// 为新会话挑选一页：已固定的线程拿自己的页，其它线程按轮转顺序分配。
    ///
    /// 池中没有页时返回 `None`。
    pub fn page(&self) -> Option<Page> {
        self.pinned_page()
            .cloned()
            .or_else(|| self.next_page_index().map(|index| self.inner.pages[index].clone()))
    }

    /// 启动一个固定到下一页（轮转）的命名工作线程。
    pub fn spawn_worker<F, T>(&self, name: impl Into<String>, f: F) -> io::Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let page_index = self.next_page_index();
        affinity::spawn_pinned(name.into(), self.inner.id, page_index, f)
    }

    /// 对所有页执行一次清扫，返回实际做了合并的页数。
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }

    /// 停止后台清扫线程并等待其退出；未启动清扫时无操作。
    ///
    /// 之后池仍可正常租借，只是不再有周期性回收。
    pub fn shutdown(&self) {
        let sweeper = self.inner.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.stop();
            tracing::debug!(pool = self.inner.id, "buffer pool sweeper shut down");
        }
    }

    pub fn pages(&self) -> &[Page] {
        &self.inner.pages
    }

    pub fn page_count(&self) -> usize {
        self.inner.pages.len()
    }

    pub fn page_size(&self) -> usize {
        self.inner.page_size
    }

    pub fn statistics(&self) -> PoolStats {
        PoolStats {
            pages: self.inner.pages.iter().map(Page::statistics).collect(),
            standalone_allocations: self.inner.standalone.allocations(),
            standalone_bytes: self.inner.standalone.bytes(),
        }
    }

    fn pinned_page(&self) -> Option<&Page> {
        let index = affinity::pinned_index(self.inner.id)?;
        self.inner.pages.get(index)
    }

    fn next_page_index(&self) -> Option<usize> {
        let count = self.inner.pages.len();
        if count == 0 {
            return None;
        }
        Some(self.inner.cursor.fetch_add(1, Ordering::Relaxed) % count)
    }

    fn standalone(&self, size: usize) -> Slice {
        self.inner.standalone.record(size);
        tracing::trace!(pool = self.inner.id, size, "standalone buffer allocation");
        Slice::standalone(size)
    }
}

impl PoolInner {
    pub(crate) fn sweep(&self) -> usize {
        self.pages.iter().filter(|page| page.try_clean()).count()
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.inner.id)
            .field("page_count", &self.inner.pages.len())
            .field("page_size", &self.inner.page_size)
            .finish()
    }
}
