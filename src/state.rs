//! Lifecycle state and priority enumerations for supervised tasks.

// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// Lifecycle state of a supervised task.
///
/// `COMPLETED`, `CANCELLED`, and `FAILED` are terminal: once reached, a
/// handle's state never changes again. `BLOCKED` is the only non-terminal
/// state reachable from `RUNNING` and back.
///
/// # Example
/// ```rust
/// use asyn_rt::state::TaskState;
///
/// assert!(TaskState::Completed.is_terminal());
/// assert!(!TaskState::Blocked.is_terminal());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Created but not yet started.
    Pending,
    /// Actively executing its coroutine.
    Running,
    /// Finished normally.
    Completed,
    /// Finished via cancellation.
    Cancelled,
    /// Finished with an unhandled error.
    Failed,
    /// Waiting on a dependency or a resource gate; non-terminal.
    Blocked,
}

impl TaskState {
    /// Returns `true` for `Completed`, `Cancelled`, or `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Returns `true` if the state can still observe further transitions.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

impl Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Failed => "FAILED",
            Self::Blocked => "BLOCKED",
        };
        write!(f, "{label}")
    }
}

/// Advisory scheduling priority. The supervisor never preempts on this
/// value; it exists for introspection and application-level policy only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        };
        write!(f, "{label}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(TaskState::Failed.is_terminal());
    }

    #[test]
    fn test_non_terminal_states() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(!TaskState::Blocked.is_terminal());
    }

    #[test]
    fn test_is_active_is_inverse_of_terminal() {
        for state in [
            TaskState::Pending,
            TaskState::Running,
            TaskState::Completed,
            TaskState::Cancelled,
            TaskState::Failed,
            TaskState::Blocked,
        ] {
            assert_eq!(state.is_active(), !state.is_terminal());
        }
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::Normal < Priority::High);
        assert!(Priority::High < Priority::Critical);
    }

    #[test]
    fn test_priority_default() {
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_display_state() {
        assert_eq!(TaskState::Blocked.to_string(), "BLOCKED");
    }
}
