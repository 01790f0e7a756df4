//! Dispatch configuration parameters.
//!
//! Defaults suit general workloads: two warm-up calls before a site caches,
//! and a site gives up on specialization after eight consecutive guard
//! misses. Every knob can be overridden from the environment.

use thiserror::Error;

/// Environment variable overriding [`DispatchConfig::warmup_calls`].
pub const ENV_WARMUP_CALLS: &str = "SWITCHYARD_WARMUP_CALLS";
/// Environment variable overriding [`DispatchConfig::megamorphic_threshold`].
pub const ENV_MEGAMORPHIC_THRESHOLD: &str = "SWITCHYARD_MEGAMORPHIC_THRESHOLD";
/// Environment variable disabling caching when set to a truthy value.
pub const ENV_DISABLE_CACHE: &str = "SWITCHYARD_DISABLE_CACHE";

/// Configuration for call-site dispatch.
///
/// # Example
///
/// ```ignore
/// use switchyard_dispatch::DispatchConfig;
///
/// // Cache from the very first call, tolerate more receiver churn.
/// let config = DispatchConfig {
///     warmup_calls: 0,
///     megamorphic_threshold: 32,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    // =========================================================================
    // Caching
    // =========================================================================
    /// Calls at a fresh site that resolve and invoke without installing a
    /// cached strategy.
    ///
    /// One-shot sites (initializers, scripts) never pay for guard
    /// construction.
    ///
    /// Default: 2
    pub warmup_calls: u32,

    /// Consecutive guard misses after which a site stops specializing and
    /// switches to the catch-all strategy.
    ///
    /// Misses caused by invalidation do not count. An invalidation gives a
    /// catch-all site another chance to specialize.
    ///
    /// Default: 8
    pub megamorphic_threshold: u32,

    /// Global kill switch. When false every call resolves from scratch.
    ///
    /// Default: true
    pub caching: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            warmup_calls: 2,
            megamorphic_threshold: 8,
            caching: true,
        }
    }
}

impl DispatchConfig {
    /// Cache from the first call.
    pub fn eager() -> Self {
        Self {
            warmup_calls: 0,
            ..Default::default()
        }
    }

    /// Never cache.
    pub fn uncached() -> Self {
        Self {
            caching: false,
            ..Default::default()
        }
    }

    /// Defaults with environment overrides applied.
    ///
    /// Malformed values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key/value source.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(ENV_WARMUP_CALLS) {
            match raw.trim().parse() {
                Ok(value) => self.warmup_calls = value,
                Err(_) => tracing::warn!(key = ENV_WARMUP_CALLS, value = %raw, "ignoring malformed override"),
            }
        }
        if let Some(raw) = lookup(ENV_MEGAMORPHIC_THRESHOLD) {
            match raw.trim().parse() {
                Ok(value) => self.megamorphic_threshold = value,
                Err(_) => tracing::warn!(
                    key = ENV_MEGAMORPHIC_THRESHOLD,
                    value = %raw,
                    "ignoring malformed override"
                ),
            }
        }
        if let Some(raw) = lookup(ENV_DISABLE_CACHE) {
            if is_truthy(&raw) {
                self.caching = false;
            }
        }
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.megamorphic_threshold == 0 {
            return Err(ConfigError::ZeroMegamorphicThreshold);
        }
        Ok(())
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A threshold of zero would make every site megamorphic immediately.
    #[error("megamorphic_threshold must be at least 1")]
    ZeroMegamorphicThreshold,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = DispatchConfig::default();
        assert_eq!(config.warmup_calls, 2);
        assert_eq!(config.megamorphic_threshold, 8);
        assert!(config.caching);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        assert_eq!(DispatchConfig::eager().warmup_calls, 0);
        assert!(!DispatchConfig::uncached().caching);
    }

    #[test]
    fn test_overrides_apply() {
        let config = DispatchConfig::default().with_overrides(source(&[
            (ENV_WARMUP_CALLS, "5"),
            (ENV_MEGAMORPHIC_THRESHOLD, " 3 "),
            (ENV_DISABLE_CACHE, "TRUE"),
        ]));
        assert_eq!(config.warmup_calls, 5);
        assert_eq!(config.megamorphic_threshold, 3);
        assert!(!config.caching);
    }

    #[test]
    fn test_malformed_override_ignored() {
        let config = DispatchConfig::default().with_overrides(source(&[
            (ENV_WARMUP_CALLS, "lots"),
            (ENV_DISABLE_CACHE, "0"),
        ]));
        assert_eq!(config, DispatchConfig::default());
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let config = DispatchConfig {
            megamorphic_threshold: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroMegamorphicThreshold));
        assert_eq!(
            ConfigError::ZeroMegamorphicThreshold.to_string(),
            "megamorphic_threshold must be at least 1"
        );
    }
}
