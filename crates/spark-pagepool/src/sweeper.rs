use alloc::sync::Weak;
use core::time::Duration;
use std::{
    io,
    sync::mpsc::{self, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
};

use crate::pool::PoolInner;

pub(crate) const SWEEPER_THREAD_NAME: &str = "spark-pagepool-sweeper";

/// 后台清扫线程句柄。
///
/// # 教案式说明
/// - **意图 (Why)**：页只在“连续两个周期没有租借”时才主动合并归还队列，
///   需要一个外部节拍周期性调用每页的 `try_clean`，否则停用的页会无限期推迟回收；
/// - **逻辑 (How)**：线程以 `recv_timeout(interval)` 作为节拍：超时即清扫一轮，
///   收到停止信号或发送端被丢弃即退出；线程只持有池的 `Weak` 引用，池被释放后自然退出；
/// - **契约 (What)**：`stop` 会等待线程退出；仅丢弃句柄则在下一个节拍内退出，不阻塞当前线程。
pub(crate) struct Sweeper {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    pub(crate) fn start(pool: Weak<PoolInner>, interval: Duration) -> io::Result<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name(SWEEPER_THREAD_NAME.to_owned())
            .spawn(move || {
                tracing::debug!(?interval, "buffer pool sweeper started");
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let Some(inner) = pool.upgrade() else {
                                break;
                            };
                            let cleaned = inner.sweep();
                            if cleaned > 0 {
                                tracing::trace!(cleaned, "sweeper reclaimed idle pages");
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::debug!("buffer pool sweeper stopped");
            })?;
        Ok(Self { stop, handle })
    }

    /// 通知线程退出并等待其结束。
    pub(crate) fn stop(self) {
        let _ = self.stop.send(());
        if self.handle.thread().id() == thread::current().id() {
            return;
        }
        if self.handle.join().is_err() {
            tracing::warn!("buffer pool sweeper panicked before shutdown");
        }
    }
}
