//! Process-wide runtime configuration

use once_cell::sync::OnceCell;

/// Environment variable overriding [`RuntimeConfig::slice_growth_threshold`]
pub const ENV_SLICE_GROWTH_THRESHOLD: &str = "PRISM_SLICE_GROWTH_THRESHOLD";
/// Environment variable overriding [`RuntimeConfig::large_growth_divisor`]
pub const ENV_LARGE_GROWTH_DIVISOR: &str = "PRISM_LARGE_GROWTH_DIVISOR";
/// Environment variable overriding [`RuntimeConfig::max_heap_bytes`]
pub const ENV_MAX_HEAP_BYTES: &str = "PRISM_MAX_HEAP_BYTES";

static CONFIG: OnceCell<RuntimeConfig> = OnceCell::new();

/// Tunables shared by the allocator and the slice helpers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Slice length below which appends double the capacity
    pub slice_growth_threshold: usize,

    /// At or above the threshold, capacity grows by `cap / large_growth_divisor`
    pub large_growth_divisor: usize,

    /// Maximum heap size in bytes (None = unlimited)
    pub max_heap_bytes: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            slice_growth_threshold: 1024,
            large_growth_divisor: 4,
            max_heap_bytes: None,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by any `PRISM_*` environment variables that parse
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| {
            let raw = lookup(key)?;
            match raw.trim().parse::<usize>() {
                Ok(n) => Some(n),
                Err(_) => {
                    tracing::warn!(key, value = %raw, "ignoring unparsable runtime setting");
                    None
                }
            }
        };

        let mut config = Self::default();
        if let Some(n) = parse(ENV_SLICE_GROWTH_THRESHOLD) {
            config.slice_growth_threshold = n;
        }
        if let Some(n) = parse(ENV_LARGE_GROWTH_DIVISOR).filter(|&n| n > 0) {
            config.large_growth_divisor = n;
        }
        if let Some(n) = parse(ENV_MAX_HEAP_BYTES) {
            config.max_heap_bytes = Some(n).filter(|&n| n > 0);
        }
        config
    }

    /// Create a config with a specific heap limit
    pub fn with_heap_limit(max_heap_bytes: usize) -> Self {
        Self {
            max_heap_bytes: Some(max_heap_bytes),
            ..Default::default()
        }
    }

    /// Capacity to grow to when a slice of length `len` and capacity `cap`
    /// must hold `needed` elements
    pub fn grown_capacity(&self, len: usize, cap: usize, needed: usize) -> usize {
        if cap == 0 {
            return needed;
        }
        let divisor = self.large_growth_divisor.max(1);
        let mut m = cap;
        while m < needed {
            if len < self.slice_growth_threshold {
                m += m;
            } else {
                m += (m / divisor).max(1);
            }
        }
        m
    }
}

/// Install the process-wide configuration
///
/// Returns `false` (and leaves the active configuration untouched) if one
/// was already installed or read.
pub fn configure(config: RuntimeConfig) -> bool {
    let installed = CONFIG.set(config).is_ok();
    if !installed {
        tracing::warn!("runtime configuration already initialized");
    }
    installed
}

/// The active configuration; initialized from the environment on first use
pub fn get() -> &'static RuntimeConfig {
    CONFIG.get_or_init(RuntimeConfig::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.slice_growth_threshold, 1024);
        assert_eq!(config.large_growth_divisor, 4);
        assert_eq!(config.max_heap_bytes, None);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = RuntimeConfig::from_lookup(|key| match key {
            ENV_SLICE_GROWTH_THRESHOLD => Some("16".to_string()),
            ENV_LARGE_GROWTH_DIVISOR => Some("0".to_string()),
            ENV_MAX_HEAP_BYTES => Some("not a number".to_string()),
            _ => None,
        });
        assert_eq!(config.slice_growth_threshold, 16);
        assert_eq!(config.large_growth_divisor, 4);
        assert_eq!(config.max_heap_bytes, None);
    }

    #[test]
    fn test_grown_capacity() {
        let config = RuntimeConfig::default();
        assert_eq!(config.grown_capacity(0, 0, 3), 3);
        assert_eq!(config.grown_capacity(4, 4, 5), 8);
        assert_eq!(config.grown_capacity(1024, 1024, 1025), 1280);
        assert_eq!(config.grown_capacity(2, 2, 9), 16);
    }
}
