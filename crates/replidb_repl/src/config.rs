//! Configuration for replication.

use crate::context::ApplierContext;
use std::time::Duration;

/// Configuration of a replication stream.
#[derive(Debug, Clone)]
pub struct ReplConfig {
    /// Name used for threads and log fields.
    pub service_name: String,
    /// Pause before re-fetching when the source has nothing ready.
    pub idle_backoff: Duration,
    /// Maximum number of delivered operations waiting to be applied.
    pub queue_capacity: usize,
    /// Apply updates as upserts (bulk catch-up mode).
    pub treat_update_as_upsert: bool,
}

impl ReplConfig {
    /// Creates a configuration with default settings.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            idle_backoff: Duration::from_secs(1),
            queue_capacity: 1024,
            treat_update_as_upsert: false,
        }
    }

    /// Sets the idle backoff.
    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = backoff;
        self
    }

    /// Sets the queue capacity. Zero is raised to one.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Sets whether updates are applied as upserts.
    pub fn with_treat_update_as_upsert(mut self, enabled: bool) -> Self {
        self.treat_update_as_upsert = enabled;
        self
    }

    /// Returns the apply options derived from this configuration.
    pub fn applier_context(&self) -> ApplierContext {
        ApplierContext::new(self.treat_update_as_upsert)
    }
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self::new("replidb-sync")
    }
}
