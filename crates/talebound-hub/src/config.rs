//! Hub Configuration - lock timeouts, caching and reducer tunables
//!
//! Configuration is written in RON. Every field is optional; missing fields
//! take their defaults and out-of-range values are clamped on load.
//!
//! ```ron
//! (
//!     lock_timeout_ms: 500,
//!     cache_enabled: true,
//!     verify_cache: false,
//!     max_status_stacks: 5,
//! )
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use talebound_core::ReducerConfig;

/// Default bounded wait for a session's write lock
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2_000;

/// Longest accepted wait for a session's write lock
pub const MAX_LOCK_TIMEOUT_MS: u64 = 60_000;

/// Configuration for the session coordinator
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use talebound_hub::HubConfig;
///
/// let config = HubConfig::default();
/// assert_eq!(config.lock_timeout(), Duration::from_secs(2));
/// assert!(config.cache_enabled());
///
/// // Zero is clamped to the shortest wait
/// let config = HubConfig::default().with_lock_timeout(Duration::ZERO);
/// assert_eq!(config.lock_timeout(), Duration::from_millis(1));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Bounded wait for the session write lock, in milliseconds
    ///
    /// Clamped to `[1, MAX_LOCK_TIMEOUT_MS]`.
    lock_timeout_ms: u64,
    /// Keep a reduced state per session and advance it on append
    cache_enabled: bool,
    /// After each incremental fold, compare against a full replay
    verify_cache: bool,
    /// Default status effect stack cap
    max_status_stacks: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            cache_enabled: true,
            verify_cache: false,
            max_status_stacks: ReducerConfig::default().max_status_stacks,
        }
    }
}

impl HubConfig {
    /// Parse a RON document, clamping out-of-range values
    pub fn from_ron_str(text: &str) -> Result<Self> {
        let config: HubConfig = ron::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        Ok(config.clamped())
    }

    /// Read a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_ron_str(&text)
    }

    /// Set the write lock timeout
    ///
    /// The value is clamped to `[1ms, MAX_LOCK_TIMEOUT_MS]`.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = clamp_timeout(timeout.as_millis().min(u64::MAX as u128) as u64);
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_cache_verification(mut self, enabled: bool) -> Self {
        self.verify_cache = enabled;
        self
    }

    pub fn with_max_status_stacks(mut self, stacks: u32) -> Self {
        self.max_status_stacks = stacks.max(1);
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    pub fn verify_cache(&self) -> bool {
        self.verify_cache
    }

    pub fn max_status_stacks(&self) -> u32 {
        self.max_status_stacks
    }

    /// Reducer tunables derived from this configuration
    pub fn reducer_config(&self) -> ReducerConfig {
        ReducerConfig::default().with_max_status_stacks(self.max_status_stacks)
    }

    fn clamped(mut self) -> Self {
        self.lock_timeout_ms = clamp_timeout(self.lock_timeout_ms);
        self.max_status_stacks = self.max_status_stacks.max(1);
        self
    }
}

fn clamp_timeout(ms: u64) -> u64 {
    ms.clamp(1, MAX_LOCK_TIMEOUT_MS)
}
