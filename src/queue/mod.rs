//! Admission-controlled task queue
//!
//! One generic queue governs both downloads and encodes. Up to
//! `max_concurrent` tasks run at once; further jobs wait in FIFO order and
//! are activated as running tasks finish or fail.

pub mod job;
pub mod reporter;
pub mod state;

pub use job::{DownloadJob, EncodeJob};
pub use reporter::{TaskReporter, TaskSignal};
pub use state::QueueState;

use crate::error::AppError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Identifier of one activation, unique within a queue
pub type TaskId = u64;

/// A running unit of work as seen by the queue
pub trait QueueTask: Clone + Send + Sync + 'static {
    /// Ask the task to stop. The task still reports its result normally.
    fn kill(&self);
}

/// Turns a job into a running task
pub trait Activator: Send + Sync + 'static {
    type Job: Clone + Send + Sync + 'static;
    type Task: QueueTask;
    type Progress: Clone + Send + 'static;

    /// Start work for `job`. Must return without blocking; results arrive
    /// later through `reporter`.
    fn activate(
        &self,
        id: TaskId,
        job: Self::Job,
        reporter: TaskReporter<Self::Progress>,
    ) -> Self::Task;
}

/// Notifications emitted by a queue, in the order they happened
#[derive(Debug, Clone)]
pub enum QueueEvent<J, T, P> {
    /// A task was activated
    Started(T),
    /// A running task reported progress
    Progress { task: T, progress: P },
    /// A task completed successfully
    Finished(T),
    /// A task failed
    Failed { task: T, error: Arc<AppError> },
    /// A job had to wait for a free slot
    Queued(J),
    /// A waiting job is about to be activated
    Dequeued(J),
}

pub type EventFor<A> =
    QueueEvent<<A as Activator>::Job, <A as Activator>::Task, <A as Activator>::Progress>;

type StateFor<A> = QueueState<<A as Activator>::Job, <A as Activator>::Task>;

pub struct TaskQueue<A: Activator> {
    inner: Arc<Inner<A>>,
}

impl<A: Activator> Clone for TaskQueue<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<A: Activator> {
    name: String,
    max_concurrent: usize,
    activator: A,
    next_id: AtomicU64,
    state: Mutex<StateFor<A>>,
    subscribers: Mutex<Vec<UnboundedSender<EventFor<A>>>>,
    signals: UnboundedSender<TaskSignal<A::Progress>>,
}

impl<A: Activator> TaskQueue<A> {
    /// Create a queue and its signal driver. Must be called inside a tokio
    /// runtime.
    pub fn new(name: impl Into<String>, max_concurrent: usize, activator: A) -> Self {
        let (signals, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            name: name.into(),
            max_concurrent: max_concurrent.max(1),
            activator,
            next_id: AtomicU64::new(1),
            state: Mutex::new(QueueState::new()),
            subscribers: Mutex::new(Vec::new()),
            signals,
        });

        tokio::spawn(drive(Arc::downgrade(&inner), rx));
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> UnboundedReceiver<EventFor<A>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    /// Activate `job` now if a slot is free, otherwise queue it
    pub fn start(&self, job: A::Job) {
        let mut state = self.inner.state.lock();
        if state.has_capacity(self.inner.max_concurrent) {
            self.inner.admit(&mut state, job);
        } else {
            debug!(
                "[{}] all {} slots busy, queueing job",
                self.inner.name, self.inner.max_concurrent
            );
            state.pending.push_back(job.clone());
            self.inner.emit(QueueEvent::Queued(job));
        }
    }

    /// Snapshot of the running tasks, oldest first
    pub fn active(&self) -> Vec<A::Task> {
        let state = self.inner.state.lock();
        state.active.iter().map(|(_, task)| task.clone()).collect()
    }

    /// Snapshot of the waiting jobs, in service order
    pub fn pending(&self) -> Vec<A::Job> {
        self.inner.state.lock().pending.iter().cloned().collect()
    }

    /// Drop every waiting job and ask running tasks to stop.
    ///
    /// Killed tasks still emit `Failed` once their process closes.
    pub fn shutdown(&self) {
        let active = {
            let mut state = self.inner.state.lock();
            let dropped = state.pending.len();
            state.pending.clear();
            if dropped > 0 {
                info!("[{}] discarded {} waiting job(s)", self.inner.name, dropped);
            }
            state
                .active
                .iter()
                .map(|(_, task)| task.clone())
                .collect::<Vec<_>>()
        };

        for task in active {
            task.kill();
        }
    }
}

impl<A: Activator> Inner<A> {
    fn admit(&self, state: &mut StateFor<A>, job: A::Job) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let reporter = TaskReporter::new(id, self.signals.clone());
        let task = self.activator.activate(id, job, reporter);

        state.active.push((id, task.clone()));
        debug!(
            "[{}] task {} started ({}/{} slots)",
            self.name,
            id,
            state.active.len(),
            self.max_concurrent
        );
        self.emit(QueueEvent::Started(task));
    }

    fn handle(&self, signal: TaskSignal<A::Progress>) {
        let mut state = self.state.lock();

        match signal {
            TaskSignal::Progress(id, progress) => {
                if let Some(task) = state.task(id) {
                    let task = task.clone();
                    self.emit(QueueEvent::Progress { task, progress });
                }
            }
            TaskSignal::Finished(id) => {
                let Some(task) = state.remove(id) else {
                    warn!("[{}] finish from unknown task {}", self.name, id);
                    return;
                };
                info!("[{}] task {} finished", self.name, id);
                self.emit(QueueEvent::Finished(task));
                self.next(&mut state);
            }
            TaskSignal::Failed(id, error) => {
                let Some(task) = state.remove(id) else {
                    warn!("[{}] failure from unknown task {}: {}", self.name, id, error);
                    return;
                };
                warn!("[{}] task {} failed: {}", self.name, id, error);
                self.emit(QueueEvent::Failed {
                    task,
                    error: Arc::new(error),
                });
                self.next(&mut state);
            }
        }
    }

    /// Activate waiting jobs, oldest first, while slots are free
    fn next(&self, state: &mut StateFor<A>) {
        while state.has_capacity(self.max_concurrent) {
            let Some(job) = state.pending.pop_front() else {
                return;
            };
            self.emit(QueueEvent::Dequeued(job.clone()));
            self.admit(state, job);
        }
    }

    fn emit(&self, event: EventFor<A>) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

async fn drive<A: Activator>(
    inner: Weak<Inner<A>>,
    mut signals: UnboundedReceiver<TaskSignal<A::Progress>>,
) {
    while let Some(signal) = signals.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle(signal);
    }
}
