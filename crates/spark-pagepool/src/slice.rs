use alloc::sync::Arc;
use core::{fmt, ops::Range};

use bytes::{Bytes, BytesMut};

use crate::{
    error::{PoolError, Result},
    free_list::FreeRange,
    page::PageShared,
};

/// 切片的底层存储来源。
///
/// - `Pooled`：借用某个页的 `[start, end)` 区间，`page` 仅用于定位归还路径与访问底层存储；
/// - `Standalone`：页容量不足时的降级产物，独立持有一块 `BytesMut`，归还即丢弃。
enum Storage {
    Pooled {
        page: Arc<PageShared>,
        range: FreeRange,
    },
    Standalone(BytesMut),
}

/// `Slice` 是调用方租借与归还的基本单位。
///
/// # 设计动机（Why）
/// - 套接字读写循环需要频繁申请大小不一的缓冲；`Slice` 只记录“页 + 偏移区间”，
///   不为每次 I/O 单独向系统申请内存；
/// - 页容量不足时同一类型也能承载独立分配，使调用方无需区分两种来源。
///
/// # 架构关系（How）
/// - 池化切片持有所属页共享状态的 `Arc`，保证切片存活期间底层存储不会被释放；
/// - `released` 是单许可守卫：第一次归还把许可拿走，第二次归还即视为契约违背；
/// - 归还需要 `&mut self`，借用检查保证归还时没有任何指向视图的借用仍然存活；
/// - `Drop` 时若尚未归还，会自动走一次归还路径，避免遗忘释放造成页容量永久丢失。
///
/// # 契约说明（What）
/// - `len()` 恒等于租借时请求的字节数；`capacity()` 为实际占用的区间长度，
///   无锁复用路径下可能大于 `len()`；
/// - `release()` 只把区间压入页的无锁归还队列，不获取任何锁，可在 I/O 完成回调中调用；
/// - 归还之后再访问 `view()` / `as_slice()` 会 panic，而不是读写可能已被他人租走的内存。
///
/// # 风险与取舍（Trade-offs）
/// - 独立分配的切片在归还时只摘除许可，真正的内存回收发生在句柄 `Drop` 时。
pub struct Slice {
    storage: Storage,
    len: usize,
    released: bool,
}

impl Slice {
    pub(crate) fn pooled(page: Arc<PageShared>, range: FreeRange, len: usize) -> Self {
        debug_assert!(len <= range.len());
        Self {
            storage: Storage::Pooled { page, range },
            len,
            released: false,
        }
    }

    /// 创建一个不属于任何页的独立切片，长度恰为 `size`。
    pub fn standalone(size: usize) -> Self {
        Self {
            storage: Storage::Standalone(BytesMut::zeroed(size)),
            len: size,
            released: false,
        }
    }

    /// 可读写窗口，长度等于请求的字节数。
    ///
    /// # Panics
    /// 切片已归还时 panic。
    pub fn view(&mut self) -> &mut [u8] {
        self.assert_live("view");
        let len = self.len;
        match &mut self.storage {
            Storage::Pooled { page, range } => {
                let ptr = page.backing().window_ptr(range.start, len);
                // SAFETY: `[start, start + len)` 位于页容量之内，且在本切片归还之前
                // 不会出现在空闲表、归还队列或其它切片中（页的平铺不变量）；
                // `&mut self` 保证本句柄内没有其它活跃借用。
                unsafe { core::slice::from_raw_parts_mut(ptr, len) }
            }
            Storage::Standalone(buf) => &mut buf[..],
        }
    }

    /// 只读窗口。
    ///
    /// # Panics
    /// 切片已归还时 panic。
    pub fn as_slice(&self) -> &[u8] {
        self.assert_live("as_slice");
        match &self.storage {
            Storage::Pooled { page, range } => {
                let ptr = page.backing().window_ptr(range.start, self.len);
                // SAFETY: 同 `view`；这里只产生共享借用。
                unsafe { core::slice::from_raw_parts(ptr, self.len) }
            }
            Storage::Standalone(buf) => &buf[..],
        }
    }

    /// 复制当前窗口内容为 `Bytes`，便于交给不感知池的下游（例如编解码器）长期持有。
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_slice())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 实际占用的字节数；独立切片等于 `len()`。
    pub fn capacity(&self) -> usize {
        match &self.storage {
            Storage::Pooled { range, .. } => range.len(),
            Storage::Standalone(_) => self.len,
        }
    }

    /// 在所属页中的偏移区间；独立切片返回 `None`。
    pub fn range(&self) -> Option<Range<usize>> {
        match &self.storage {
            Storage::Pooled { range, .. } => Some(range.as_range()),
            Storage::Standalone(_) => None,
        }
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self.storage, Storage::Pooled { .. })
    }

    /// 所属页在池中的下标；独立切片返回 `None`。
    pub fn page_index(&self) -> Option<usize> {
        match &self.storage {
            Storage::Pooled { page, .. } => Some(page.index()),
            Storage::Standalone(_) => None,
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// 归还切片。
    ///
    /// 区间归还后可能立即被其它切片租走，因此归还期间不允许存在视图借用：
    ///
    /// ```compile_fail
    /// use spark_pagepool::Page;
    ///
    /// let page = Page::new(64, false).unwrap();
    /// let mut slice = page.allocate(8).unwrap();
    /// let held = slice.as_slice();
    /// slice.release();
    /// let _ = held[0];
    /// ```
    ///
    /// # Panics
    /// 同一切片第二次归还时 panic：重复归还会让同一区间两次进入空闲表，
    /// 之后的租借方将拿到重叠内存，只能视为调用方缺陷。
    pub fn release(&mut self) {
        if let Err(err) = self.try_release() {
            tracing::error!(range = ?self.range(), "buffer slice released twice");
            panic!("{err}");
        }
    }

    /// 归还切片；重复归还时返回 [`PoolError::DoubleRelease`] 而不是 panic。
    pub fn try_release(&mut self) -> Result<()> {
        if core::mem::replace(&mut self.released, true) {
            return Err(PoolError::DoubleRelease {
                range: self.range(),
            });
        }
        self.give_back();
        Ok(())
    }

    fn give_back(&self) {
        if let Storage::Pooled { page, range } = &self.storage {
            page.recycle(*range);
        }
    }

    fn assert_live(&self, op: &'static str) {
        assert!(!self.released, "Slice::{op} called after release");
    }
}

impl Drop for Slice {
    fn drop(&mut self) {
        if !core::mem::replace(&mut self.released, true) {
            self.give_back();
        }
    }
}

impl AsRef<[u8]> for Slice {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsMut<[u8]> for Slice {
    fn as_mut(&mut self) -> &mut [u8] {
        self.view()
    }
}

impl fmt::Debug for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slice")
            .field("page", &self.page_index())
            .field("range", &self.range())
            .field("len", &self.len)
            .field("released", &self.is_released())
            .finish()
    }
}
