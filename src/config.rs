//! Pool configuration options

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Idle timeout applied when none is configured explicitly.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for pool eviction behavior
///
/// # Examples
///
/// ```
/// use selfclean_pool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_idle_timeout(Duration::from_secs(30))
///     .with_max_retained_idle(16);
///
/// assert_eq!(config.idle_timeout, Some(Duration::from_secs(30)));
/// assert_eq!(config.max_retained_idle, Some(16));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolConfiguration {
    /// How long an entry may sit untouched before the sweep drops it.
    /// `None` disables eviction.
    pub idle_timeout: Option<Duration>,

    /// Number of free entries the pool keeps alive on its own; older free
    /// entries are downgraded to weak references after each release.
    pub max_retained_idle: Option<usize>,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            max_retained_idle: None,
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle timeout. A zero duration disables eviction.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = normalize_timeout(Some(timeout));
        self
    }

    /// Set the idle timeout in whole seconds
    ///
    /// # Examples
    ///
    /// ```
    /// use selfclean_pool::PoolConfiguration;
    /// use std::time::Duration;
    ///
    /// let config = PoolConfiguration::new().with_idle_timeout_seconds(5);
    /// assert_eq!(config.idle_timeout, Some(Duration::from_secs(5)));
    ///
    /// let config = PoolConfiguration::new().with_idle_timeout_seconds(-1);
    /// assert_eq!(config.idle_timeout, None);
    /// ```
    pub fn with_idle_timeout_seconds(mut self, seconds: i64) -> Self {
        self.idle_timeout = timeout_from_seconds(seconds);
        self
    }

    /// Disable idle eviction
    pub fn without_idle_timeout(mut self) -> Self {
        self.idle_timeout = None;
        self
    }

    /// Cap the number of free entries kept alive by the pool
    pub fn with_max_retained_idle(mut self, count: usize) -> Self {
        self.max_retained_idle = Some(count);
        self
    }
}

/// `<= 0` means "never evict".
pub(crate) fn timeout_from_seconds(seconds: i64) -> Option<Duration> {
    u64::try_from(seconds)
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

pub(crate) fn normalize_timeout(timeout: Option<Duration>) -> Option<Duration> {
    timeout.filter(|t| !t.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_idle_timeout() {
        let config = PoolConfiguration::default();
        assert_eq!(config.idle_timeout, Some(DEFAULT_IDLE_TIMEOUT));
        assert_eq!(config.max_retained_idle, None);
    }

    #[test]
    fn test_non_positive_seconds_disable_eviction() {
        assert_eq!(timeout_from_seconds(0), None);
        assert_eq!(timeout_from_seconds(-30), None);
        assert_eq!(timeout_from_seconds(2), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_zero_duration_disables_eviction() {
        let config = PoolConfiguration::new().with_idle_timeout(Duration::ZERO);
        assert_eq!(config.idle_timeout, None);
    }
}
