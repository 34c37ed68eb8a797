//! Bounded-concurrency bulk execution.
//!
//! Items run under a semaphore sized by the effective batch size and settle
//! in any order, but results are always reported in input order. Per-item
//! failures do not abort the batch unless `stop_on_error` is set, in which
//! case no new item starts after the first failure is observed and the first
//! failure is returned as the batch error. Items already in flight at that
//! point run to completion.

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{BulkConfig, BulkItemOutcome, BulkJob, OperationConfig};

/// Per-item work function.
pub type BulkWorker = Arc<dyn Fn(Value) -> BoxFuture<'static, OrchestratorResult<Value>> + Send + Sync>;

/// Invoked after each item settles with (settled, total).
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Runs homogeneous operations across many inputs with bounded parallelism.
pub struct BulkExecutor {
    config: BulkConfig,
}

impl BulkExecutor {
    pub fn new(config: BulkConfig) -> Self {
        Self { config }
    }

    /// Execute `worker` over every item.
    ///
    /// Collecting mode (default) always returns `Ok` with per-item results;
    /// callers inspect `BulkJob::has_failures`. With `opts.stop_on_error` the
    /// first failure becomes the batch error instead.
    pub async fn execute(
        &self,
        items: Vec<Value>,
        opts: &OperationConfig,
        worker: BulkWorker,
        progress: Option<ProgressFn>,
    ) -> OrchestratorResult<BulkJob> {
        let total = items.len();
        if total == 0 {
            return Ok(BulkJob::default());
        }

        let batch = opts.batch_size.unwrap_or(self.config.batch_size).max(1);
        let stop_on_error = opts.stop_on_error;
        debug!(total, batch, stop_on_error, "starting bulk execution");

        let semaphore = Arc::new(Semaphore::new(batch));
        let stop = Arc::new(AtomicBool::new(false));
        let settled = Arc::new(AtomicUsize::new(0));
        let inputs = items.clone();

        let mut tasks: JoinSet<(usize, Value, Option<Result<Value, OrchestratorError>>)> =
            JoinSet::new();
        for (idx, input) in items.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let stop = Arc::clone(&stop);
            let settled = Arc::clone(&settled);
            let worker = Arc::clone(&worker);
            let progress = progress.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (idx, input, None);
                };
                // The stop flag is only authoritative once a permit is held;
                // items queued behind the failure must not start.
                if stop_on_error && stop.load(Ordering::SeqCst) {
                    return (idx, input, None);
                }

                let result = worker(input.clone()).await;
                if stop_on_error && result.is_err() {
                    stop.store(true, Ordering::SeqCst);
                }

                let done = settled.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(progress) = progress {
                    progress(done, total);
                }
                (idx, input, Some(result))
            });
        }

        let mut by_index: HashMap<usize, BulkItemOutcome> = HashMap::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, input, Some(result))) => {
                    by_index.insert(idx, BulkItemOutcome { input, result });
                }
                Ok((_, _, None)) => {}
                Err(err) => warn!(error = %err, "bulk item task failed to join"),
            }
        }

        if stop_on_error {
            // Surface the earliest failure by input position.
            let first_failed = (0..total).find(|idx| {
                by_index
                    .get(idx)
                    .is_some_and(|outcome| outcome.result.is_err())
            });
            if let Some(idx) = first_failed {
                if let Some(outcome) = by_index.remove(&idx) {
                    if let Err(err) = outcome.result {
                        return Err(err);
                    }
                }
            }
        }

        let outcomes = inputs
            .into_iter()
            .enumerate()
            .map(|(idx, input)| {
                by_index.remove(&idx).unwrap_or(BulkItemOutcome {
                    input,
                    result: Err(OrchestratorError::Unknown {
                        message: "bulk item did not complete".into(),
                        suggestion: None,
                        diagnostics: Value::Null,
                    }),
                })
            })
            .collect();
        Ok(BulkJob::from_outcomes(outcomes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::sleep;

    fn executor() -> BulkExecutor {
        BulkExecutor::new(BulkConfig { batch_size: 3 })
    }

    /// Worker whose items finish in reverse order of submission.
    fn reversing_worker(total: u64) -> BulkWorker {
        Arc::new(move |input: Value| {
            Box::pin(async move {
                let n = input.as_u64().unwrap_or_default();
                sleep(Duration::from_millis((total - n) * 3)).await;
                Ok(json!(n * 10))
            })
        })
    }

    #[tokio::test]
    async fn test_results_follow_input_order_not_completion_order() {
        let items: Vec<Value> = (0u64..6).map(|n| json!(n)).collect();
        let job = executor()
            .execute(
                items,
                &OperationConfig::default(),
                reversing_worker(6),
                None,
            )
            .await
            .unwrap();

        assert_eq!(job.len(), 6);
        for (idx, outcome) in job.items.iter().enumerate() {
            assert_eq!(outcome.input, json!(idx as u64));
            assert_eq!(*outcome.result.as_ref().unwrap(), json!(idx as u64 * 10));
        }
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_batch_size() {
        let current = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));
        let worker: BulkWorker = {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            Arc::new(move |input| {
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                Box::pin(async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(10)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(input)
                })
            })
        };

        let items: Vec<Value> = (0..12).map(|n| json!(n)).collect();
        let opts = OperationConfig {
            batch_size: Some(2),
            ..OperationConfig::default()
        };
        executor().execute(items, &opts, worker, None).await.unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_partial_failures_are_collected_per_item() {
        let worker: BulkWorker = Arc::new(|input: Value| {
            Box::pin(async move {
                if input.as_u64() == Some(2) {
                    Err(OrchestratorError::NotFound("item 2".into()))
                } else {
                    Ok(input)
                }
            })
        });

        let items: Vec<Value> = (0u64..4).map(|n| json!(n)).collect();
        let job = executor()
            .execute(items, &OperationConfig::default(), worker, None)
            .await
            .unwrap();

        assert_eq!(job.succeeded, 3);
        assert_eq!(job.failed, 1);
        assert!(job.items[2].result.is_err());
        assert!(job.items[3].result.is_ok());
    }

    #[tokio::test]
    async fn test_stop_on_error_prevents_later_starts_and_returns_first_failure() {
        let started = Arc::new(AtomicU32::new(0));
        let worker: BulkWorker = {
            let started = Arc::clone(&started);
            Arc::new(move |input: Value| {
                let started = Arc::clone(&started);
                Box::pin(async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    sleep(Duration::from_millis(5)).await;
                    if input.as_u64() == Some(0) {
                        Err(OrchestratorError::Conflict("boom".into()))
                    } else {
                        Ok(input)
                    }
                })
            })
        };

        let items: Vec<Value> = (0u64..20).map(|n| json!(n)).collect();
        let opts = OperationConfig {
            batch_size: Some(1),
            stop_on_error: true,
            ..OperationConfig::default()
        };
        let err = executor().execute(items, &opts, worker, None).await.unwrap_err();

        assert!(matches!(err, OrchestratorError::Conflict(_)));
        // With serial execution the failure at item 0 stops everything else.
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_progress_is_reported_per_settled_item() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let progress: ProgressFn = {
            let seen = Arc::clone(&seen);
            Arc::new(move |done, total| seen.lock().unwrap().push((done, total)))
        };
        let worker: BulkWorker = Arc::new(|input| Box::pin(async move { Ok(input) }));

        let items: Vec<Value> = (0..5).map(|n| json!(n)).collect();
        executor()
            .execute(items, &OperationConfig::default(), worker, Some(progress))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 5);
        assert!(seen.contains(&(5, 5)));
    }

    #[tokio::test]
    async fn test_empty_input_is_an_empty_job() {
        let worker: BulkWorker = Arc::new(|input| Box::pin(async move { Ok(input) }));
        let job = executor()
            .execute(vec![], &OperationConfig::default(), worker, None)
            .await
            .unwrap();
        assert!(job.is_empty());
        assert!(!job.has_failures());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_output_order_matches_input_order(values in proptest::collection::vec(0u64..100, 0..16)) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .unwrap();
                rt.block_on(async {
                    let worker: BulkWorker = Arc::new(|input: Value| {
                        Box::pin(async move {
                            let n = input.as_u64().unwrap_or_default();
                            sleep(Duration::from_millis(n % 4)).await;
                            Ok(input)
                        })
                    });
                    let items: Vec<Value> = values.iter().map(|v| json!(v)).collect();
                    let job = executor()
                        .execute(items.clone(), &OperationConfig::default(), worker, None)
                        .await
                        .unwrap();
                    let outputs: Vec<Value> =
                        job.items.into_iter().map(|o| o.result.unwrap()).collect();
                    prop_assert_eq!(outputs, items);
                    Ok(())
                })?;
            }
        }
    }
}
