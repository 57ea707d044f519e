//! 线程亲和：把工作线程固定到池中的某一页。
//!
//! # 模块定位（Why）
//! - 常态下每个工作线程只访问自己的页，页互斥锁几乎只在该线程与清扫线程之间竞争；
//! - 固定关系通过显式注册写入线程本地存储，而不是在运行时检查线程的具体类型。
//!
//! # 契约（What）
//! - 每个线程至多固定到一个池的一个页；再次注册会覆盖旧值；
//! - 固定信息携带池标识，同进程内的其它池不会误用它。

use core::{
    cell::Cell,
    sync::atomic::{AtomicU64, Ordering},
};
use std::{io, thread};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Pin {
    pool_id: u64,
    page_index: usize,
}

thread_local! {
    static PINNED: Cell<Option<Pin>> = const { Cell::new(None) };
}

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_pool_id() -> u64 {
    NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed)
}

pub(crate) fn pin(pool_id: u64, page_index: usize) {
    PINNED.with(|pinned| {
        pinned.set(Some(Pin {
            pool_id,
            page_index,
        }))
    });
}

/// 解除当前线程对 `pool_id` 的固定；固定在其它池上时不做改动。
pub(crate) fn unpin(pool_id: u64) -> bool {
    PINNED.with(|pinned| match pinned.get() {
        Some(pin) if pin.pool_id == pool_id => {
            pinned.set(None);
            true
        }
        _ => false,
    })
}

pub(crate) fn pinned_index(pool_id: u64) -> Option<usize> {
    PINNED.with(|pinned| {
        pinned
            .get()
            .filter(|pin| pin.pool_id == pool_id)
            .map(|pin| pin.page_index)
    })
}

/// 启动一个命名线程，并在执行 `f` 之前把它固定到 `page_index`。
///
/// `page_index` 为 `None`（池中没有页）时线程不做固定，所有租借都会走独立分配。
pub(crate) fn spawn_pinned<F, T>(
    name: String,
    pool_id: u64,
    page_index: Option<usize>,
    f: F,
) -> io::Result<thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new().name(name).spawn(move || {
        if let Some(index) = page_index {
            pin(pool_id, index);
        }
        f()
    })
}
