use crate::runner::TaskRunner;
use async_trait::async_trait;
use crate::task::{Priority, TaskRecord};
use dashmap::DashMap;
use feinschmecker_core::ValidatedQuery;
use metrics::{counter, gauge};
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),
    #[error("Queue is full ({0} pending tasks)")]
    Full(usize),
    #[error("Task {0} was dropped before completing")]
    Dropped(Uuid),
}

/// Submit and poll seam between callers and whatever carries tasks to workers.
#[async_trait]
pub trait TaskTransport: Send + Sync {
    async fn submit(&self, payload: ValidatedQuery, priority: Priority) -> Result<Uuid, QueueError>;

    fn poll(&self, id: Uuid) -> Result<TaskRecord, QueueError>;

    async fn wait(&self, id: Uuid) -> Result<TaskRecord, QueueError>;
}

/// Ordering key: priority first, then submission order within one priority level.
type Rank = (Priority, Reverse<u64>);

const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

/// In-process task queue with a worker pool.
///
/// Submission returns immediately with a task id. Callers either poll the id or wait on it.
/// Finished tasks stay pollable for the retention period and are then evicted.
pub struct TaskQueue {
    pq: RwLock<PriorityQueue<Uuid, Rank>>,
    registry: DashMap<Uuid, Arc<watch::Sender<TaskRecord>>>,
    finished: DashMap<Uuid, Instant>,
    retention: Duration,
    notify: Notify,
    runner: TaskRunner,
    capacity: usize,
    sequence: AtomicU64,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl TaskQueue {
    pub fn new(runner: TaskRunner, capacity: usize) -> Arc<Self> {
        Self::with_retention(runner, capacity, DEFAULT_RETENTION)
    }

    pub fn with_retention(runner: TaskRunner, capacity: usize, retention: Duration) -> Arc<Self> {
        Arc::new(Self {
            pq: RwLock::new(PriorityQueue::new()),
            registry: DashMap::new(),
            finished: DashMap::new(),
            retention,
            notify: Notify::new(),
            runner,
            capacity,
            sequence: AtomicU64::new(0),
            workers: parking_lot::Mutex::new(Vec::new()),
        })
    }

    /// Spawns `count` workers on the current runtime.
    pub fn start(self: &Arc<Self>, count: usize) {
        let mut workers = self.workers.lock();
        for worker in 0..count {
            let queue = Arc::clone(self);
            workers.push(tokio::spawn(async move { queue.work(worker).await }));
        }
        info!(workers = count, "Task queue started");
    }

    pub fn shutdown(&self) {
        for handle in self.workers.lock().drain(..) {
            handle.abort();
        }
    }

    pub async fn submit(&self, payload: ValidatedQuery, priority: Priority) -> Result<Uuid, QueueError> {
        self.evict_expired();
        let record = TaskRecord::new(payload, priority);
        let id = record.id;
        {
            let mut pq = self.pq.write().await;
            if pq.len() >= self.capacity {
                warn!(capacity = self.capacity, "Rejecting task, queue is full");
                return Err(QueueError::Full(self.capacity));
            }
            let (tx, _) = watch::channel(record);
            self.registry.insert(id, Arc::new(tx));
            let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            pq.push(id, (priority, Reverse(seq)));
            gauge!("queue_depth").set(pq.len() as f64);
        }
        counter!("tasks_submitted").increment(1);
        self.notify.notify_one();
        info!(%id, ?priority, "Task submitted");
        Ok(id)
    }

    /// Current snapshot of a task.
    pub fn poll(&self, id: Uuid) -> Result<TaskRecord, QueueError> {
        self.evict_expired();
        self.registry
            .get(&id)
            .map(|tx| tx.borrow().clone())
            .ok_or(QueueError::TaskNotFound(id))
    }

    /// Resolves once the task reaches a terminal state.
    pub async fn wait(&self, id: Uuid) -> Result<TaskRecord, QueueError> {
        let mut rx = self
            .registry
            .get(&id)
            .map(|tx| tx.subscribe())
            .ok_or(QueueError::TaskNotFound(id))?;
        let record = rx
            .wait_for(|r| r.state.is_terminal())
            .await
            .map_err(|_| QueueError::Dropped(id))?;
        Ok((*record).clone())
    }

    /// Subscribes to every state change of a task.
    pub fn watch(&self, id: Uuid) -> Result<watch::Receiver<TaskRecord>, QueueError> {
        self.registry
            .get(&id)
            .map(|tx| tx.subscribe())
            .ok_or(QueueError::TaskNotFound(id))
    }

    pub async fn queue_size(&self) -> usize {
        self.pq.read().await.len()
    }

    /// Number of tasks still tracked, finished or not.
    pub fn tracked(&self) -> usize {
        self.registry.len()
    }

    /// Drops finished tasks whose retention period has elapsed.
    pub fn evict_expired(&self) {
        let now = Instant::now();
        let mut evicted = 0u64;
        self.finished.retain(|id, at| {
            if now.duration_since(*at) < self.retention {
                return true;
            }
            self.registry.remove(id);
            evicted += 1;
            false
        });
        if evicted > 0 {
            counter!("tasks_evicted").increment(evicted);
            debug!(evicted, "Evicted finished tasks");
        }
    }

    async fn work(&self, worker: usize) {
        loop {
            let next = {
                let mut pq = self.pq.write().await;
                let next = pq.pop();
                gauge!("queue_depth").set(pq.len() as f64);
                next
            };

            let Some((id, _)) = next else {
                self.notify.notified().await;
                continue;
            };

            let Some(record) = self.registry.get(&id).map(|tx| Arc::clone(tx.value())) else {
                continue;
            };
            debug!(worker, %id, "Worker picked up task");
            self.runner.run(&record).await;
            self.finished.insert(id, Instant::now());
            self.evict_expired();
        }
    }
}

#[async_trait]
impl TaskTransport for TaskQueue {
    async fn submit(&self, payload: ValidatedQuery, priority: Priority) -> Result<Uuid, QueueError> {
        TaskQueue::submit(self, payload, priority).await
    }

    fn poll(&self, id: Uuid) -> Result<TaskRecord, QueueError> {
        TaskQueue::poll(self, id)
    }

    async fn wait(&self, id: Uuid) -> Result<TaskRecord, QueueError> {
        TaskQueue::wait(self, id).await
    }
}
