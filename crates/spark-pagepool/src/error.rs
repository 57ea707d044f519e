//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中声明分页缓冲池对外暴露的错误语义；
//! - 容量耗尽**不是**错误：池会就地降级为独立分配，因此这里只保留配置错误与契约违背两类。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，兼容 `std::error::Error`；
//! - 重复归还属于调用方 bug，`Slice::release` 会直接 panic，
//!   `Slice::try_release` 则以 [`PoolError::DoubleRelease`] 的形式交给调用方自行处置。

use core::ops::Range;

use thiserror::Error;

/// 分页缓冲池的统一结果别名。
pub type Result<T, E = PoolError> = core::result::Result<T, E>;

/// 分页缓冲池错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把“配置不合法”与“调用方违背归还契约”区分开，便于上层决定是修正配置还是修复代码；
/// - **契约 (What)**：所有变体均为 `Send + Sync + 'static`，可安全跨线程传播；
/// - **设计权衡 (Trade-offs)**：`field` 使用 `&'static str` 避免在配置校验路径上额外分配。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum PoolError {
    /// 配置项取值非法，例如清扫间隔为 0。
    #[error("invalid pool configuration `{field}`: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },

    /// 页大小无法构造合法的内存布局（超过 `isize::MAX` 向页对齐后的上限）。
    #[error("page size {page_size} cannot be laid out as a single backing region")]
    BackingLayout { page_size: usize },

    /// 后台清扫线程创建失败（通常是线程数或内存达到系统上限）。
    #[error("failed to spawn buffer pool sweeper: {reason}")]
    SweeperSpawn { reason: String },

    /// 同一个切片在重新租借之前被归还了两次。
    ///
    /// - **风险 (Trade-offs)**：若放任不管，同一段区间会被合并进空闲链表两次，
    ///   之后两个租借方将拿到重叠的内存；因此该错误只能视为致命缺陷。
    #[error("slice {range:?} released twice")]
    DoubleRelease { range: Option<Range<usize>> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_offending_field() {
        let err = PoolError::InvalidConfig {
            field: "sweep_interval_ms",
            reason: "must be greater than zero",
        };
        assert_eq!(
            err.to_string(),
            "invalid pool configuration `sweep_interval_ms`: must be greater than zero"
        );
    }

    #[test]
    fn double_release_reports_range() {
        let err = PoolError::DoubleRelease {
            range: Some(16..32),
        };
        assert_eq!(err.to_string(), "slice Some(16..32) released twice");
    }
}
