use super::TaskId;
use crate::error::AppError;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Messages sent from a running task back to its queue
#[derive(Debug)]
pub enum TaskSignal<P> {
    Progress(TaskId, P),
    Finished(TaskId),
    Failed(TaskId, AppError),
}

impl<P> TaskSignal<P> {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskSignal::Progress(id, _) | TaskSignal::Finished(id) | TaskSignal::Failed(id, _) => {
                *id
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskSignal::Progress(..))
    }
}

/// Handle a task uses to report progress and its single result.
///
/// `finish` and `fail` consume the reporter, so a task can report at most
/// one result. A reporter dropped without reporting sends
/// [`AppError::TaskAbandoned`].
pub struct TaskReporter<P: Send + 'static> {
    id: TaskId,
    tx: UnboundedSender<TaskSignal<P>>,
    reported: bool,
}

impl<P: Send + 'static> TaskReporter<P> {
    pub(crate) fn new(id: TaskId, tx: UnboundedSender<TaskSignal<P>>) -> Self {
        Self {
            id,
            tx,
            reported: false,
        }
    }

    /// Reporter wired to a fresh channel instead of a queue
    pub fn detached(id: TaskId) -> (Self, UnboundedReceiver<TaskSignal<P>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(id, tx), rx)
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn progress(&self, progress: P) {
        // The queue may already be gone; nothing left to tell
        let _ = self.tx.send(TaskSignal::Progress(self.id, progress));
    }

    pub fn finish(mut self) {
        self.reported = true;
        let _ = self.tx.send(TaskSignal::Finished(self.id));
    }

    pub fn fail(mut self, error: AppError) {
        self.reported = true;
        let _ = self.tx.send(TaskSignal::Failed(self.id, error));
    }
}

impl<P: Send + 'static> Drop for TaskReporter<P> {
    fn drop(&mut self) {
        if !self.reported {
            let _ = self
                .tx
                .send(TaskSignal::Failed(self.id, AppError::TaskAbandoned));
        }
    }
}
