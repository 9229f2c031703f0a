//! Engine configuration.

use crate::tuning::DEFAULT_FILL_PERCENT;
use quill_storage::DEFAULT_PAGE_SIZE;
use std::time::Duration;

/// What a writable `begin` does while another writer is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriterPolicy {
    /// Wait until the active writer commits or rolls back.
    ///
    /// Combined with [`EngineConfig::writer_wait_timeout`], a wait that runs
    /// past the timeout fails with `WriterConflict`.
    #[default]
    Block,
    /// Fail immediately with `WriterConflict`.
    FailFast,
}

/// Configuration for opening an engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Behaviour of a writable `begin` while a writer is active.
    pub writer_policy: WriterPolicy,

    /// Upper bound on a blocked writer's wait (`None` = wait forever).
    pub writer_wait_timeout: Option<Duration>,

    /// Fill ratio used when a write carries no `fill_percent` hint.
    pub default_fill_percent: f64,

    /// Page size for paged backends.
    pub page_size: usize,

    /// Whether to sync the page store on every commit (safer but slower).
    pub sync_on_commit: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            writer_policy: WriterPolicy::Block,
            writer_wait_timeout: None,
            default_fill_percent: DEFAULT_FILL_PERCENT,
            page_size: DEFAULT_PAGE_SIZE,
            sync_on_commit: true,
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the writer policy.
    #[must_use]
    pub const fn writer_policy(mut self, policy: WriterPolicy) -> Self {
        self.writer_policy = policy;
        self
    }

    /// Bounds how long a blocked writer waits.
    #[must_use]
    pub const fn writer_wait_timeout(mut self, timeout: Duration) -> Self {
        self.writer_wait_timeout = Some(timeout);
        self
    }

    /// Sets the default fill ratio.
    #[must_use]
    pub const fn default_fill_percent(mut self, value: f64) -> Self {
        self.default_fill_percent = value;
        self
    }

    /// Sets the page size.
    #[must_use]
    pub const fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Sets whether to sync on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }
}
