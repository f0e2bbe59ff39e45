/// A unit of work handed to an [`Executor`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// An execution context used only to relay listener notifications.
///
/// Without an executor, listeners run on the mutating call before it returns.
/// With one, the mutating call only submits a task and may return before any
/// listener has run. Notifications of one result stay ordered either way.
///
/// Any `Fn(Task)` closure is an executor:
///
/// ```
/// use sovran_lookup::{Executor, InstanceContent, Task};
/// use std::sync::{Arc, Mutex};
///
/// let queue: Arc<Mutex<Vec<Task>>> = Arc::default();
/// let sink = Arc::clone(&queue);
/// let content = InstanceContent::builder()
///     .executor(move |task: Task| sink.lock().unwrap().push(task))
///     .build();
/// # let _ = content;
/// ```
pub trait Executor: Send + Sync {
    /// Schedules `task` to run
    fn submit(&self, task: Task);
}

impl<F> Executor for F
where
    F: Fn(Task) + Send + Sync,
{
    fn submit(&self, task: Task) {
        self(task)
    }
}
