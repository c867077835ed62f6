//! Rate-limited, priority-queued job scheduler
//!
//! One [`RateLimiter`] per resource (chat platform or the dashboard API),
//! each with its own token bucket, priority queue and drain task. A
//! [`LimiterRegistry`] maps resource names to limiters.

mod bucket;
mod config;
mod core;
mod error;
mod jitter;
mod job;
mod queue;
mod registry;

pub use bucket::{RefillModel, TokenBucket};
pub use config::{LimiterConfig, LimiterOverride, RefillKind};
pub use core::RateLimiter;
pub use error::SchedulerError;
pub use jitter::Jitter;
pub use job::JobHandle;
pub use queue::{JobId, LimiterStats, QueueEntry, QueueEntryStatus, QueueState};
pub use registry::LimiterRegistry;
