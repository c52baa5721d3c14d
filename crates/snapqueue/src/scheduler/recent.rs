//! Capped list of recently completed tasks

use std::collections::VecDeque;

use crate::types::RecentTask;

/// Most recent completions, newest first
#[derive(Debug, Clone, Default)]
pub struct RecentTasks {
    items: VecDeque<RecentTask>,
    max: usize,
}

impl RecentTasks {
    /// A `max` of 0 keeps nothing
    pub fn new(max: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(max),
            max,
        }
    }

    pub fn push(&mut self, task: RecentTask) {
        if self.max == 0 {
            return;
        }
        self.items.push_front(task);
        self.items.truncate(self.max);
    }

    /// Replace the list with `tasks`, given newest first
    pub fn restore(&mut self, tasks: impl IntoIterator<Item = RecentTask>) {
        self.items = tasks.into_iter().take(self.max).collect();
    }

    pub fn to_vec(&self) -> Vec<RecentTask> {
        self.items.iter().cloned().collect()
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
