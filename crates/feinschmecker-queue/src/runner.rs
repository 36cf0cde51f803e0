use crate::retry::RetryPolicy;
use crate::task::{FailureKind, TaskFailure, TaskRecord, TaskState};
use async_trait::async_trait;
use feinschmecker_core::{FeinschmeckerError, Result, ValidatedQuery};
use feinschmecker_query::{QueryResponse, RecipeSearchEngine};
use metrics::{counter, histogram};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Executes one search attempt.
#[async_trait]
pub trait SearchExecutor: Send + Sync {
    async fn execute(&self, query: &ValidatedQuery) -> Result<QueryResponse>;
}

/// Runs searches on the blocking pool against a shared engine. Background searches bypass the
/// response cache.
///
/// A search that outlives the execution budget is not interrupted. The task is failed right
/// away, and the pool thread is released once the search returns and its result is discarded.
pub struct EngineExecutor {
    engine: Arc<RecipeSearchEngine>,
}

impl EngineExecutor {
    pub fn new(engine: Arc<RecipeSearchEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl SearchExecutor for EngineExecutor {
    async fn execute(&self, query: &ValidatedQuery) -> Result<QueryResponse> {
        let engine = self.engine.clone();
        let query = query.clone();
        tokio::task::spawn_blocking(move || engine.search_validated(&query))
            .await
            .map_err(|e| FeinschmeckerError::Internal(format!("search worker failed: {}", e)))?
    }
}

/// Drives a single task through its state machine, publishing every transition.
pub struct TaskRunner {
    executor: Arc<dyn SearchExecutor>,
    policy: RetryPolicy,
}

impl TaskRunner {
    pub fn new(executor: Arc<dyn SearchExecutor>, policy: RetryPolicy) -> Self {
        Self { executor, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs the task in `record` to a terminal state.
    pub async fn run(&self, record: &watch::Sender<TaskRecord>) {
        let (id, payload) = {
            let current = record.borrow();
            (current.id, current.payload.clone())
        };
        let start = Instant::now();

        loop {
            record.send_modify(|r| {
                r.transition(TaskState::Running);
                r.attempts += 1;
            });

            // Dropping the timed-out future abandons the attempt but cannot stop blocking work.
            let outcome =
                tokio::time::timeout(self.policy.execution_budget, self.executor.execute(&payload))
                    .await;

            match outcome {
                Ok(Ok(response)) => {
                    record.send_modify(|r| {
                        r.result = Some(response);
                        r.transition(TaskState::Succeeded);
                    });
                    counter!("tasks_succeeded").increment(1);
                    info!(%id, "Search task succeeded");
                    break;
                }
                Ok(Err(err)) if self.policy.is_retryable(&err) => {
                    let retries = record.borrow().retries;
                    if !self.policy.allows_retry(retries) {
                        self.fail(
                            record,
                            FailureKind::RetryExhausted,
                            format!("gave up after {} retries: {}", retries, err),
                        );
                        break;
                    }
                    let delay = self.policy.backoff(retries + 1);
                    record.send_modify(|r| {
                        r.retries += 1;
                        r.transition(TaskState::Retrying);
                    });
                    counter!("task_retries").increment(1);
                    warn!(
                        %id,
                        retry = retries + 1,
                        delay_secs = delay.as_secs(),
                        "Transient search failure, retrying: {}",
                        err
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(Err(err)) => {
                    self.fail(record, FailureKind::Permanent, err.to_string());
                    break;
                }
                Err(_) => {
                    self.fail(
                        record,
                        FailureKind::TimeoutAbort,
                        format!(
                            "execution budget of {}s exceeded",
                            self.policy.execution_budget.as_secs()
                        ),
                    );
                    break;
                }
            }
        }

        histogram!("task_duration").record(start.elapsed());
    }

    fn fail(&self, record: &watch::Sender<TaskRecord>, kind: FailureKind, message: String) {
        error!(id = %record.borrow().id, ?kind, "Search task failed: {}", message);
        record.send_modify(|r| {
            r.error = Some(TaskFailure { kind, message });
            r.transition(TaskState::Failed);
        });
        counter!("tasks_failed").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Priority;
    use feinschmecker_core::{FilterSet, PageRequest};
    use feinschmecker_query::PageMeta;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AlwaysPermanent(AtomicU32);

    #[async_trait]
    impl SearchExecutor for AlwaysPermanent {
        async fn execute(&self, _query: &ValidatedQuery) -> Result<QueryResponse> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(FeinschmeckerError::DataIntegrity("recipe without time".into()))
        }
    }

    struct Immediate;

    #[async_trait]
    impl SearchExecutor for Immediate {
        async fn execute(&self, query: &ValidatedQuery) -> Result<QueryResponse> {
            Ok(QueryResponse {
                data: Vec::new(),
                meta: PageMeta {
                    total: 0,
                    page: query.page.page,
                    per_page: query.page.per_page,
                    total_pages: 0,
                },
            })
        }
    }

    fn channel() -> (watch::Sender<TaskRecord>, watch::Receiver<TaskRecord>) {
        watch::channel(TaskRecord::new(
            ValidatedQuery {
                filters: FilterSet::default(),
                page: PageRequest::new(2, 5),
            },
            Priority::Normal,
        ))
    }

    #[tokio::test]
    async fn permanent_error_fails_without_retry() {
        let executor = Arc::new(AlwaysPermanent(AtomicU32::new(0)));
        let runner = TaskRunner::new(executor.clone(), RetryPolicy::default());
        let (tx, rx) = channel();

        runner.run(&tx).await;

        let record = rx.borrow().clone();
        assert_eq!(record.state, TaskState::Failed);
        assert_eq!(record.retries, 0);
        assert_eq!(record.error.unwrap().kind, FailureKind::Permanent);
        assert_eq!(executor.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_records_result() {
        let runner = TaskRunner::new(Arc::new(Immediate), RetryPolicy::default());
        let (tx, rx) = channel();

        runner.run(&tx).await;

        let record = rx.borrow().clone();
        assert_eq!(record.state, TaskState::Succeeded);
        assert_eq!(record.attempts, 1);
        assert_eq!(record.result.unwrap().meta.page, 2);
    }
}
