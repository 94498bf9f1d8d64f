//! 批量执行器 - 编排层
//!
//! ## 职责
//!
//! 把同一种操作（全部是生成，或全部是评审）并发地作用在一批互不依赖的需求上，
//! 按需求编号收集结果。
//!
//! ## 约定
//!
//! - 并发数由 Semaphore 限制（固定的小数值，而不是批次大小）
//! - 单个条目失败（返回 `Err` 或 panic）不会中断整批，只是不出现在结果中
//! - 结果的到达顺序不确定，调用方只能按编号取值，不能按位置

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, error};

use crate::error::AppResult;

/// 并发执行一批操作，返回 `req_id → 结果`
///
/// # 参数
/// - `items`: `(req_id, payload)` 列表
/// - `max_concurrent`: 同时执行的最大数量
/// - `op`: 作用在单个条目上的操作
///
/// # 返回
/// 只包含成功的条目；键集合总是输入键集合的子集
pub async fn run_batch<T, R, F, Fut>(
    items: Vec<(String, T)>,
    max_concurrent: usize,
    op: F,
) -> HashMap<String, R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(String, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<R>> + Send + 'static,
{
    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let op = Arc::new(op);

    // 为本批创建并发任务
    let mut pending = FuturesUnordered::new();
    for (req_id, payload) in items {
        let semaphore = semaphore.clone();
        let op = op.clone();
        let task_id = req_id.clone();

        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            Some(op(task_id, payload).await)
        });
        pending.push(async move { (req_id, handle.await) });
    }

    // 等待本批所有任务完成
    let mut results = HashMap::with_capacity(total);
    while let Some((req_id, joined)) = pending.next().await {
        match joined {
            Ok(Some(Ok(value))) => {
                results.insert(req_id, value);
            }
            Ok(Some(Err(e))) => {
                debug!("[{}] 条目失败，已从本批结果中剔除: {}", req_id, e);
            }
            Ok(None) => {
                error!("[{}] 无法获取并发名额", req_id);
            }
            Err(e) => {
                error!("[{}] 任务执行失败: {}", req_id, e);
            }
        }
    }

    debug!("批次完成: 成功 {}/{}", results.len(), total);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, LlmError};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ids(n: usize) -> Vec<(String, usize)> {
        (0..n).map(|i| (format!("FR-{}", i), i)).collect()
    }

    #[tokio::test]
    async fn test_all_successes_are_keyed_by_id() {
        let results = run_batch(ids(5), 2, |_id, n| async move { Ok(n * 10) }).await;

        assert_eq!(results.len(), 5);
        for i in 0..5 {
            assert_eq!(results[&format!("FR-{}", i)], i * 10);
        }
    }

    #[tokio::test]
    async fn test_failures_are_omitted_without_aborting_batch() {
        let results = run_batch(ids(6), 2, |id, n| async move {
            if n % 3 == 0 {
                return Err(AppError::Llm(LlmError::EmptyContent { model: id }));
            }
            Ok(n)
        })
        .await;

        let keys: HashSet<_> = results.keys().cloned().collect();
        let expected: HashSet<_> = ["FR-1", "FR-2", "FR-4", "FR-5"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(keys, expected);
    }

    #[tokio::test]
    async fn test_panicking_item_is_isolated() {
        let results = run_batch(ids(3), 3, |_id, n| async move {
            if n == 1 {
                panic!("boom");
            }
            Ok(n)
        })
        .await;

        assert_eq!(results.len(), 2);
        assert!(!results.contains_key("FR-1"));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (in_flight_c, peak_c) = (in_flight.clone(), peak.clone());
        let results = run_batch(ids(8), 2, move |_id, n| {
            let in_flight = in_flight_c.clone();
            let peak = peak_c.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(n)
            }
        })
        .await;

        assert_eq!(results.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let results: HashMap<String, usize> =
            run_batch(Vec::<(String, usize)>::new(), 2, |_id, n| async move { Ok(n) }).await;
        assert!(results.is_empty());
    }
}
