//! `page_contract` 集成测试：以公开 API 验证单页的切分、归还与合并契约。
//!
//! # 测试目标（Why）
//! - 页是分配算法的全部所在：切分是否正确、合并是否彻底、容量是否守恒，
//!   任何一处回归都会表现为缓冲重叠或容量悄悄流失；
//! - 通过外部 crate 视角调用，避免依赖内部类型。
//!
//! # 结构安排（How）
//! - `documented_allocation_scenario`：逐步复现 1024 字节页上的典型租借/归还序列；
//! - 其余用例覆盖相邻区间合并、容量守恒、零字节请求等边界。

use std::ops::Range;

use spark_pagepool::{Page, Slice};

/// 帮助函数：断言空闲区间与持有切片的区间恰好铺满 `[0, capacity)`。
fn assert_tiles(page: &Page, held: &[&Slice]) {
    let mut ranges: Vec<Range<usize>> = page.free_ranges();
    ranges.extend(held.iter().filter_map(|slice| slice.range()));
    ranges.retain(|range| !range.is_empty());
    ranges.sort_by_key(|range| range.start);

    let mut cursor = 0;
    for range in &ranges {
        assert_eq!(range.start, cursor, "区间出现空隙或重叠：{ranges:?}");
        cursor = range.end;
    }
    assert_eq!(cursor, page.capacity(), "区间未覆盖整页：{ranges:?}");
}

/// 复现文档中的典型序列：切分、慢路径首次适配、三段合并。
#[test]
fn documented_allocation_scenario() {
    let page = Page::new(1024, false).expect("页分配失败");

    let mut a = page.allocate(100).expect("租借 A");
    assert_eq!(a.range(), Some(0..100));
    let mut b = page.allocate(200).expect("租借 B");
    assert_eq!(b.range(), Some(100..300));

    a.release();
    assert_eq!(page.reclaim(), 1);
    assert_eq!(page.free_ranges(), vec![0..100, 300..1024]);

    // 空闲表有两个条目，快速路径不适用，慢路径在 [0, 100) 上切分。
    let c = page.allocate(50).expect("租借 C");
    assert_eq!(c.range(), Some(0..50));
    assert_eq!(page.free_ranges(), vec![50..100, 300..1024]);

    b.release();
    page.reclaim();
    assert_eq!(page.free_ranges(), vec![50..1024]);
    assert_tiles(&page, &[&c]);
}

/// 同一原始区间拆成的两半归还并清空后，应合并为一个条目而不是两个。
#[test]
fn adjacent_halves_coalesce_into_one_entry() {
    let page = Page::new(256, true).expect("页分配失败");
    let mut left = page.allocate(64).expect("左半");
    let mut right = page.allocate(64).expect("右半");
    let _tail = page.allocate(128).expect("剩余部分");
    assert!(page.free_ranges().is_empty());

    right.release();
    left.release();
    page.reclaim();
    assert_eq!(page.free_ranges(), vec![0..128]);
}

/// 任意时刻：已租借 + 空闲 + 待合并字节数之和恒等于页容量。
#[test]
fn capacity_is_conserved_across_release_states() {
    let page = Page::new(512, false).expect("页分配失败");
    let mut slices: Vec<Slice> = [10, 20, 30, 40]
        .into_iter()
        .map(|size| page.allocate(size).expect("租借"))
        .collect();
    assert_eq!(page.statistics().accounted_bytes(), 512);

    slices[1].release();
    slices[3].release();
    let stats = page.statistics();
    assert_eq!(stats.pending_bytes, 60);
    assert_eq!(stats.accounted_bytes(), 512);

    page.reclaim();
    let stats = page.statistics();
    assert_eq!(stats.pending_bytes, 0);
    assert_eq!(stats.leased_bytes, 40);
    assert_eq!(stats.accounted_bytes(), 512);

    drop(slices);
    page.reclaim();
    assert_eq!(page.free_ranges(), vec![0..512]);
}

/// 切片写入的数据只出现在自身区间内。
#[test]
fn views_are_disjoint_windows_of_the_backing() {
    let page = Page::new(64, false).expect("页分配失败");
    let mut first = page.allocate(16).expect("first");
    let mut second = page.allocate(16).expect("second");
    first.view().fill(0xAA);
    second.view().fill(0x55);
    assert!(first.as_slice().iter().all(|b| *b == 0xAA));
    assert!(second.as_slice().iter().all(|b| *b == 0x55));
}

/// 零字节请求合法，返回空视图且不改变空闲表。
#[test]
fn zero_sized_request_yields_empty_slice() {
    let page = Page::new(64, false).expect("页分配失败");
    let mut empty = page.allocate(0).expect("零字节租借");
    assert!(empty.is_empty());
    assert!(empty.view().is_empty());
    empty.release();
    page.reclaim();
    assert_eq!(page.free_ranges(), vec![0..64]);
}

/// 无锁复用路径：归还的区间在不清空队列的情况下被直接再次租出。
#[test]
fn returned_range_is_handed_out_again_lock_free() {
    let page = Page::new(128, false).expect("页分配失败");
    let mut first = page.allocate(32).expect("first");
    first.release();

    let mut reused = page.allocate(8).expect("reused");
    assert_eq!(reused.range(), Some(0..32));
    assert_eq!(reused.view().len(), 8);
    let stats = page.statistics();
    assert_eq!(stats.fast_reuses, 1);
    assert_eq!(stats.drains, 0);
    assert_tiles(&page, &[&reused]);
}

/// 未显式归还的切片在 `Drop` 时自动归还，页容量不会流失。
#[test]
fn dropped_slice_returns_its_range() {
    let page = Page::new(64, false).expect("页分配失败");
    {
        let _scoped = page.allocate(48).expect("租借");
    }
    assert_eq!(page.statistics().pending_bytes, 48);
    page.reclaim();
    assert_eq!(page.free_ranges(), vec![0..64]);
}

/// 同一切片归还两次属于调用方缺陷，必须 panic。
#[test]
#[should_panic(expected = "released twice")]
fn double_release_of_pooled_slice_panics() {
    let page = Page::new(64, false).expect("页分配失败");
    let mut slice = page.allocate(8).expect("租借");
    slice.release();
    slice.release();
}

/// `try_release` 以错误值报告重复归还，且不会把区间第二次放回页中。
#[test]
fn try_release_reports_double_release_without_corrupting_page() {
    let page = Page::new(64, false).expect("页分配失败");
    let mut slice = page.allocate(8).expect("租借");
    assert!(slice.try_release().is_ok());
    assert!(slice.try_release().is_err());
    assert_eq!(page.reclaim(), 1, "区间只应入队一次");
    assert_eq!(page.free_ranges(), vec![0..64]);
}
