use chrono::{DateTime, Utc};

use crate::task::record::{CrawlResult, TaskStatus};

/// A task-state transition, broadcast by the orchestrator.
///
/// Delivery is advisory: the notification relay forwards these to subscribed
/// WebSocket clients, but the task store read through HTTP remains the source
/// of truth.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// Non-terminal transition (running, progress change, cancelled)
    Updated {
        task_id: String,
        status: TaskStatus,
        progress: f64,
        updated_at: DateTime<Utc>,
    },

    /// The task completed with a result
    Completed {
        task_id: String,
        result: Box<CrawlResult>,
    },

    /// The task failed with an error message
    Failed {
        task_id: String,
        error: String,
    },
}

impl TaskEvent {
    /// Identifier of the task this event concerns
    pub fn task_id(&self) -> &str {
        match self {
            Self::Updated { task_id, .. }
            | Self::Completed { task_id, .. }
            | Self::Failed { task_id, .. } => task_id,
        }
    }

    /// Whether this event marks the end of the task's lifecycle
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Completed { .. } | Self::Failed { .. } => true,
            Self::Updated { status, .. } => status.is_terminal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_accessor() {
        let event = TaskEvent::Failed {
            task_id: "t-1".to_string(),
            error: "engine unreachable".to_string(),
        };
        assert_eq!(event.task_id(), "t-1");
        assert!(event.is_terminal());
    }

    #[test]
    fn test_cancelled_update_is_terminal() {
        let event = TaskEvent::Updated {
            task_id: "t-2".to_string(),
            status: TaskStatus::Cancelled,
            progress: 0.0,
            updated_at: Utc::now(),
        };
        assert!(event.is_terminal());

        let event = TaskEvent::Updated {
            task_id: "t-2".to_string(),
            status: TaskStatus::Running,
            progress: 0.3,
            updated_at: Utc::now(),
        };
        assert!(!event.is_terminal());
    }
}
