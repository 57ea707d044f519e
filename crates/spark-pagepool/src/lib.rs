//! `spark-pagepool` 为套接字 I/O 层提供分页缓冲池。
//!
//! # 模块定位（Why）
//! - 连接处理线程每次读写都需要一块大小合适的缓冲；逐次向系统申请/释放会带来分配开销与内存抖动，
//!   本 crate 把若干大块“页”预先申请好，在页内切分、归还、合并区间来满足这些请求；
//! - 页容量不足时降级为独立分配，整体最坏情况不劣于不做池化。
//!
//! # 设计概要（How）
//! - `free_list`：页内按偏移排序的空闲区间表，负责切分与相邻区间合并；
//! - `page`：底层存储 + 空闲表（互斥锁保护）+ 无锁归还队列的两级结构，
//!   归还只入队，合并推迟到下一次租借未命中或周期清扫；
//! - `pool`：固定数量的页，按线程亲和路由租借请求，必要时启动后台清扫线程；
//! - `slice`：调用方持有的缓冲句柄，带单许可归还守卫，`Drop` 时自动归还。
//!
//! # 使用示例
//! ```
//! use spark_pagepool::Pool;
//!
//! let pool = Pool::new(1, 4096, false);
//! pool.register_current_thread(0);
//!
//! let mut slice = pool.allocate(128);
//! slice.view()[..5].copy_from_slice(b"hello");
//! assert_eq!(slice.range(), Some(0..128));
//! slice.release();
//! ```

extern crate alloc;

mod affinity;
mod backing;
pub mod config;
pub mod error;
mod free_list;
mod page;
mod pool;
mod slice;
pub mod stats;
mod sweeper;

pub use config::PoolConfig;
pub use error::{PoolError, Result};
pub use page::Page;
pub use pool::Pool;
pub use slice::Slice;
pub use stats::{PageStats, PoolStats};
