pub mod queue;
pub mod retry;
pub mod runner;
pub mod task;

pub use queue::{QueueError, TaskQueue, TaskTransport};
pub use retry::RetryPolicy;
pub use runner::{EngineExecutor, SearchExecutor, TaskRunner};
pub use task::{FailureKind, Priority, TaskFailure, TaskRecord, TaskState};
