//! Task status and the legal transition graph

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for a concurrency slot
    Queued,
    /// Admitted, worker thread being started
    Preparing,
    /// Pipeline running
    Working,
    /// Stop requested while running
    Stopping,
    Completed,
    Failed,
    Stopped,
    /// Rebuilt from the history log, never runs
    History,
}

impl TaskStatus {
    /// Completed, Failed or Stopped
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Occupies a concurrency slot
    pub fn is_working(&self) -> bool {
        matches!(self, Self::Preparing | Self::Working | Self::Stopping)
    }

    /// Queued or occupying a slot
    pub fn is_busy(&self) -> bool {
        *self == Self::Queued || self.is_working()
    }

    /// Whether `self -> next` is an edge of the state graph
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Queued, Preparing)
                | (Queued, Stopped)
                | (Preparing, Working)
                | (Preparing, Stopping)
                | (Preparing, Failed)
                | (Working, Stopping)
                | (Working, Completed)
                | (Working, Failed)
                | (Working, Stopped)
                | (Stopping, Stopped)
        )
    }

    /// Default status line for this state
    pub fn status_text(&self) -> &'static str {
        match self {
            Self::Queued => "In queue",
            Self::Preparing => "Preparing...",
            Self::Working => "Working...",
            Self::Stopping => "Stopping...",
            Self::Completed => "Done",
            Self::Failed => "Error",
            Self::Stopped => "Stopped",
            Self::History => "History",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Preparing => "preparing",
            Self::Working => "working",
            Self::Stopping => "stopping",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
            Self::History => "history",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TaskStatus; 8] = [
        TaskStatus::Queued,
        TaskStatus::Preparing,
        TaskStatus::Working,
        TaskStatus::Stopping,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Stopped,
        TaskStatus::History,
    ];

    #[test]
    fn test_terminal_states_have_no_exit() {
        for from in ALL.iter().filter(|s| s.is_terminal() || **s == TaskStatus::History) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{} -> {} must be rejected", from, to);
            }
        }
    }

    #[test]
    fn test_queued_cannot_skip_to_working() {
        assert!(!TaskStatus::Queued.can_transition_to(TaskStatus::Working));
        assert!(!TaskStatus::Queued.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Queued.can_transition_to(TaskStatus::Stopped));
    }

    #[test]
    fn test_stopping_only_reaches_stopped() {
        for to in ALL {
            assert_eq!(
                TaskStatus::Stopping.can_transition_to(to),
                to == TaskStatus::Stopped
            );
        }
    }

    #[test]
    fn test_working_classification() {
        assert!(TaskStatus::Preparing.is_working());
        assert!(TaskStatus::Stopping.is_working());
        assert!(!TaskStatus::Queued.is_working());
        assert!(TaskStatus::Queued.is_busy());
        assert!(!TaskStatus::History.is_busy());
    }
}
