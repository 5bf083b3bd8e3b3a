use super::TaskId;
use std::collections::VecDeque;

/// Pending jobs and active tasks of one queue.
///
/// A job is either waiting in `pending`, owned by a task in `active`, or
/// gone. The queue keeps `active.len()` at or below its limit.
pub struct QueueState<J, T> {
    pub pending: VecDeque<J>,
    pub active: Vec<(TaskId, T)>,
}

impl<J, T> QueueState<J, T> {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            active: Vec::new(),
        }
    }

    pub fn has_capacity(&self, max_concurrent: usize) -> bool {
        self.active.len() < max_concurrent
    }

    pub fn task(&self, id: TaskId) -> Option<&T> {
        self.active
            .iter()
            .find(|(task_id, _)| *task_id == id)
            .map(|(_, task)| task)
    }

    pub fn remove(&mut self, id: TaskId) -> Option<T> {
        let index = self.active.iter().position(|(task_id, _)| *task_id == id)?;
        Some(self.active.remove(index).1)
    }
}

impl<J, T> Default for QueueState<J, T> {
    fn default() -> Self {
        Self::new()
    }
}
