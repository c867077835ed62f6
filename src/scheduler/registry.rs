//! Resource name -> limiter registry
//!
//! Built once by the process entry point and handed to whatever needs to
//! schedule work. Lookups of unknown resources fail instead of silently
//! running the job unthrottled.

use std::collections::BTreeMap;
use std::future::Future;

use tracing::{debug, info};

use crate::config::Config;
use crate::domain::Priority;

use super::config::LimiterConfig;
use super::core::RateLimiter;
use super::error::SchedulerError;
use super::job::JobHandle;
use super::queue::QueueState;

#[derive(Debug, Clone, Default)]
pub struct LimiterRegistry {
    limiters: BTreeMap<String, RateLimiter>,
}

impl LimiterRegistry {
    /// Build one limiter per configured resource
    ///
    /// Any invalid budget fails the whole build.
    pub fn from_config(config: &Config) -> Result<Self, SchedulerError> {
        debug!(resources = config.limiters.len(), "LimiterRegistry::from_config: called");
        Self::from_budgets(config.limiters.iter().map(|(name, budget)| (name.clone(), budget.clone())))
    }

    /// Build from explicit `(resource, budget)` pairs
    pub fn from_budgets<I, S>(budgets: I) -> Result<Self, SchedulerError>
    where
        I: IntoIterator<Item = (S, LimiterConfig)>,
        S: Into<String>,
    {
        let mut limiters = BTreeMap::new();
        for (name, budget) in budgets {
            let name = name.into();
            let limiter = RateLimiter::new(name.clone(), budget)?;
            limiters.insert(name, limiter);
        }

        info!(
            "LimiterRegistry built with {} limiters: {:?}",
            limiters.len(),
            limiters.keys().collect::<Vec<_>>()
        );
        Ok(Self { limiters })
    }

    /// Look up the limiter for a resource
    pub fn get(&self, resource: &str) -> Result<&RateLimiter, SchedulerError> {
        self.limiters
            .get(resource)
            .ok_or_else(|| SchedulerError::UnknownResource(resource.to_string()))
    }

    /// Queue a job on a resource's limiter
    pub fn submit<F, Fut, T>(
        &self,
        resource: &str,
        f: F,
        priority: impl Into<Priority>,
    ) -> Result<JobHandle<T>, SchedulerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Ok(self.get(resource)?.submit(f, priority))
    }

    /// Queue a job on a resource's limiter and wait for its result
    pub async fn schedule<F, Fut, T>(
        &self,
        resource: &str,
        f: F,
        priority: impl Into<Priority>,
    ) -> Result<T, SchedulerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.get(resource)?.schedule(f, priority).await
    }

    /// Resource names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.limiters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    /// Queue state of every limiter
    pub fn snapshot(&self) -> Vec<(String, QueueState)> {
        self.limiters
            .iter()
            .map(|(name, limiter)| (name.clone(), limiter.queue_state()))
            .collect()
    }

    /// Shut down every limiter
    pub fn shutdown(&self) {
        info!("Shutting down {} limiters", self.limiters.len());
        for limiter in self.limiters.values() {
            limiter.shutdown();
        }
    }
}
