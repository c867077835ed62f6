//! Scheduler error types

use thiserror::Error;

use super::queue::JobId;

/// Errors produced by the scheduler itself
///
/// A job's own failure is never wrapped in this type: it is handed back to the
/// caller as the job's output, exactly as if the job had been awaited directly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("Invalid limiter config: {0}")]
    InvalidConfig(String),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Job {0} cancelled before dispatch")]
    Cancelled(JobId),

    #[error("Limiter '{0}' is shut down")]
    Shutdown(String),

    #[error("Job {id} panicked: {message}")]
    Panicked { id: JobId, message: String },

    #[error("Limiter '{0}' faulted; no further jobs will run")]
    Faulted(String),
}

impl SchedulerError {
    /// Check if the job was cancelled by its caller
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SchedulerError::Cancelled(_))
    }

    /// Check if this error comes from bad configuration or a bad lookup
    pub fn is_config_error(&self) -> bool {
        matches!(self, SchedulerError::InvalidConfig(_) | SchedulerError::UnknownResource(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_cancelled() {
        assert!(SchedulerError::Cancelled(JobId(3)).is_cancelled());
        assert!(!SchedulerError::Shutdown("claude".to_string()).is_cancelled());
    }

    #[test]
    fn test_is_config_error() {
        assert!(SchedulerError::InvalidConfig("capacity".to_string()).is_config_error());
        assert!(SchedulerError::UnknownResource("myspace".to_string()).is_config_error());
        assert!(
            !SchedulerError::Panicked {
                id: JobId(1),
                message: "boom".to_string()
            }
            .is_config_error()
        );
    }

    #[test]
    fn test_display() {
        let err = SchedulerError::Panicked {
            id: JobId(7),
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Job #7 panicked: boom");
        assert_eq!(
            SchedulerError::UnknownResource("myspace".to_string()).to_string(),
            "Unknown resource: myspace"
        );
    }
}
