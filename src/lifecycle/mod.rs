// ============================================================================
// spark-observe - Lifecycle
// Phase queues, batching and completion tasks
// ============================================================================

pub mod coordinator;
mod queue;
pub mod task;

pub use coordinator::{Flushable, Lifecycle, LifecycleNode, Queue};
pub use task::{done_task, AggregateTask, Deferred, DeferredWait, DoneTask, LifecycleTask, PromiseTask, TaskWait};
