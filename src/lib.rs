//! chatpace - rate-limited job scheduling for AI chat platform sync
//!
//! Every outbound call to a chat platform (ChatGPT, Claude, Gemini, ...) or to
//! the organizer's own dashboard API goes through a per-resource
//! [`RateLimiter`]. Each limiter is a token bucket in front of a priority
//! queue, drained by a single task that adds a randomized "humanization"
//! delay before every dispatch.
//!
//! # Modules
//!
//! - [`scheduler`] - Token bucket, priority queue, drain loop, registry
//! - [`domain`] - Priority and resource names
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod scheduler;

// Re-export commonly used types
pub use config::Config;
pub use domain::Priority;
pub use scheduler::{
    JobHandle, JobId, LimiterConfig, LimiterRegistry, LimiterStats, QueueEntry, QueueEntryStatus, QueueState,
    RateLimiter, RefillKind, SchedulerError,
};
