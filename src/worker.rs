use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

/// Notification from a background task. Each task emits any number of
/// `Progress` updates followed by exactly one terminal update.
#[derive(Debug)]
pub enum TaskUpdate<T> {
    Progress { id: TaskId, percent: u8 },
    Completed { id: TaskId, output: T },
    Failed { id: TaskId, message: String },
}

impl<T> TaskUpdate<T> {
    pub fn id(&self) -> TaskId {
        match self {
            TaskUpdate::Progress { id, .. }
            | TaskUpdate::Completed { id, .. }
            | TaskUpdate::Failed { id, .. } => *id,
        }
    }

    fn is_terminal(&self) -> bool {
        !matches!(self, TaskUpdate::Progress { .. })
    }
}

/// Handed to the job closure: progress reporting plus the cooperative
/// cancel flag. Cancellation is advisory, the job decides when to stop.
pub struct TaskContext<T> {
    id: TaskId,
    cancel: Arc<AtomicBool>,
    last_percent: AtomicU8,
    tx: Sender<TaskUpdate<T>>,
}

impl<T> TaskContext<T> {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Reports progress in percent, clamped to 100. Progress is
    /// non-decreasing over the task's lifetime; a value below an earlier
    /// report is dropped.
    pub fn report_progress(&self, percent: u8) {
        let percent = percent.min(100);
        if percent < self.last_percent.load(Ordering::Relaxed) {
            return;
        }
        self.last_percent.store(percent, Ordering::Relaxed);
        let _ = self.tx.send(TaskUpdate::Progress { id: self.id, percent });
    }
}

/// Owner-side handle for one spawned task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    cancel: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Raises the cancel flag without waiting. [`TaskRunner::cancel`]
    /// additionally joins the worker thread.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

/// Runs long computations off the interaction thread. The core stays
/// single-threaded: tasks receive owned input, never shared scene state,
/// and their results are drained on the owner's thread each tick.
pub struct TaskRunner<T> {
    tx: Sender<TaskUpdate<T>>,
    rx: Receiver<TaskUpdate<T>>,
    next_id: u64,
    handles: HashMap<TaskId, JoinHandle<()>>,
}

impl<T: Send + 'static> Default for TaskRunner<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> TaskRunner<T> {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self { tx, rx, next_id: 0, handles: HashMap::new() }
    }

    pub fn active_count(&self) -> usize {
        self.handles.len()
    }

    /// Spawns `job` on its own thread. A panic inside the job is caught
    /// and surfaced as a `Failed` update instead of poisoning the owner.
    pub fn spawn<F>(&mut self, job: F) -> TaskHandle
    where
        F: FnOnce(&TaskContext<T>) -> anyhow::Result<T> + Send + 'static,
    {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        let cancel = Arc::new(AtomicBool::new(false));
        let ctx = TaskContext {
            id,
            cancel: Arc::clone(&cancel),
            last_percent: AtomicU8::new(0),
            tx: self.tx.clone(),
        };
        let tx = self.tx.clone();

        let handle = thread::spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| job(&ctx)));
            let update = match outcome {
                Ok(Ok(output)) => TaskUpdate::Completed { id, output },
                Ok(Err(err)) => TaskUpdate::Failed { id, message: format!("{err:#}") },
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    TaskUpdate::Failed { id, message: format!("task panicked: {message}") }
                }
            };
            let _ = tx.send(update);
        });

        self.handles.insert(id, handle);
        TaskHandle { id, cancel }
    }

    /// Non-blocking: everything the tasks have sent since the last call.
    pub fn drain_updates(&mut self) -> Vec<TaskUpdate<T>> {
        let mut updates = Vec::new();
        while let Ok(update) = self.rx.try_recv() {
            self.reap(&update);
            updates.push(update);
        }
        updates
    }

    /// Cancels one task and blocks until its thread has observed the flag
    /// and returned. Every update drained while waiting is handed back so
    /// the caller can still process other tasks' notifications.
    pub fn cancel(&mut self, handle: &TaskHandle) -> Vec<TaskUpdate<T>> {
        handle.cancel();
        let mut updates = Vec::new();
        if !self.handles.contains_key(&handle.id()) {
            return updates;
        }
        while let Ok(update) = self.rx.recv() {
            self.reap(&update);
            let done = update.is_terminal() && update.id() == handle.id();
            updates.push(update);
            if done {
                break;
            }
        }
        updates
    }

    /// Blocks up to `timeout` for the next update.
    pub fn recv_update_timeout(&mut self, timeout: Duration) -> Option<TaskUpdate<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(update) => {
                self.reap(&update);
                Some(update)
            }
            Err(_) => None,
        }
    }

    // The terminal update is the last thing a task thread sends, so the
    // join here returns promptly.
    fn reap(&mut self, update: &TaskUpdate<T>) {
        if !update.is_terminal() {
            return;
        }
        if let Some(handle) = self.handles.remove(&update.id()) {
            if handle.join().is_err() {
                eprintln!("[worker] task {:?} thread terminated abnormally", update.id());
            }
        }
    }
}
