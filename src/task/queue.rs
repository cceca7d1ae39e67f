use super::{Task, TaskHandler};
use crate::storage::TaskScheduler;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

#[derive(Debug)]
struct Entry {
    due: Instant,
    seq: u64,
    task: Task,
}

#[derive(Debug, Default)]
struct Pending {
    entries: HashMap<String, Entry>,
    next_seq: u64,
    shutdown: bool,
}

impl Pending {
    fn take_due(&mut self, now: Instant) -> Vec<Task> {
        self.take_where(|entry| entry.due <= now)
    }

    fn take_where(&mut self, ready: impl Fn(&Entry) -> bool) -> Vec<Task> {
        let mut due: Vec<(Instant, u64, String)> = self
            .entries
            .iter()
            .filter(|(_, entry)| ready(entry))
            .map(|(key, entry)| (entry.due, entry.seq, key.clone()))
            .collect();
        due.sort();
        due.into_iter()
            .filter_map(|(_, _, key)| self.entries.remove(&key))
            .map(|entry| entry.task)
            .collect()
    }

    fn earliest(&self) -> Option<Instant> {
        self.entries.values().map(|entry| entry.due).min()
    }
}

/// Keyed delay queue: one pending task per key
#[derive(Debug, Default)]
pub struct DelayedTaskQueue {
    pending: Mutex<Pending>,
    wakeup: Condvar,
}

impl DelayedTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` under `key` to run after `delay`
    ///
    /// A pending task with the same key is replaced and its delay restarts.
    pub fn schedule(&self, key: impl Into<String>, delay: Duration, task: Task) {
        let key = key.into();
        let mut pending = self.pending.lock();
        let seq = match pending.entries.get(&key) {
            Some(entry) => entry.seq,
            None => {
                pending.next_seq += 1;
                pending.next_seq
            }
        };
        trace!(%key, ?delay, "task scheduled");
        pending.entries.insert(
            key,
            Entry {
                due: Instant::now() + delay,
                seq,
                task,
            },
        );
        self.wakeup.notify_all();
    }

    pub fn len(&self) -> usize {
        self.pending.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pending.lock().entries.contains_key(key)
    }

    /// Keys of pending tasks in first-scheduled order
    pub fn pending_keys(&self) -> Vec<String> {
        let pending = self.pending.lock();
        let mut keys: Vec<(u64, String)> = pending
            .entries
            .iter()
            .map(|(key, entry)| (entry.seq, key.clone()))
            .collect();
        keys.sort();
        keys.into_iter().map(|(_, key)| key).collect()
    }

    /// Remove and return every task due at `now`, earliest first
    pub fn take_due(&self, now: Instant) -> Vec<Task> {
        self.pending.lock().take_due(now)
    }

    /// Run every task due at `now` on the calling thread
    pub fn run_due(&self, now: Instant, handler: &dyn TaskHandler) -> usize {
        let tasks = self.take_due(now);
        let count = tasks.len();
        for task in tasks {
            handler.handle(task);
        }
        count
    }

    /// Run every pending task regardless of its delay
    pub fn run_all(&self, handler: &dyn TaskHandler) -> usize {
        let tasks = self.pending.lock().take_where(|_| true);
        let count = tasks.len();
        for task in tasks {
            handler.handle(task);
        }
        count
    }

    /// Start a thread that runs tasks as they become due
    ///
    /// The thread stops when the returned runner is dropped.
    pub fn spawn(
        self: &Arc<Self>,
        handler: Arc<dyn TaskHandler>,
    ) -> std::io::Result<TaskRunner> {
        self.pending.lock().shutdown = false;
        let queue = Arc::clone(self);
        let thread = std::thread::Builder::new()
            .name("blocktx-tasks".into())
            .spawn(move || queue.run_loop(handler.as_ref()))?;
        Ok(TaskRunner {
            queue: Arc::clone(self),
            thread: Some(thread),
        })
    }

    fn run_loop(&self, handler: &dyn TaskHandler) {
        loop {
            let tasks = {
                let mut pending = self.pending.lock();
                loop {
                    if pending.shutdown {
                        return;
                    }
                    let now = Instant::now();
                    match pending.earliest() {
                        Some(due) if due <= now => break,
                        Some(due) => {
                            self.wakeup.wait_until(&mut pending, due);
                        }
                        None => self.wakeup.wait(&mut pending),
                    }
                }
                pending.take_due(Instant::now())
            };
            for task in tasks {
                debug!(key = %task.key(), "running task");
                handler.handle(task);
            }
        }
    }

    fn stop(&self) {
        self.pending.lock().shutdown = true;
        self.wakeup.notify_all();
    }
}

impl TaskScheduler for DelayedTaskQueue {
    fn schedule(&self, key: String, delay: Duration, task: Task) {
        DelayedTaskQueue::schedule(self, key, delay, task);
    }
}

/// Background thread of a [`DelayedTaskQueue`]
#[derive(Debug)]
pub struct TaskRunner {
    queue: Arc<DelayedTaskQueue>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        self.queue.stop();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
