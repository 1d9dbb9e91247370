use crate::permission::PermissionPolicy;
use serde::Deserialize;
use std::env;

/// Finished operation records kept before the oldest are evicted
pub const DEFAULT_MAX_RETAINED_OPERATIONS: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct ForkSettings {
    #[serde(default = "default_analytics_enabled")]
    pub analytics_enabled: bool,

    #[serde(default)]
    pub permissions: PermissionPolicy,

    #[serde(default = "default_max_retained_operations")]
    pub max_retained_operations: usize,
}

fn default_analytics_enabled() -> bool {
    true
}

fn default_max_retained_operations() -> usize {
    DEFAULT_MAX_RETAINED_OPERATIONS
}

fn parse_flag(value: Option<&str>) -> Option<bool> {
    match value?.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Default for ForkSettings {
    fn default() -> Self {
        Self {
            analytics_enabled: default_analytics_enabled(),
            permissions: PermissionPolicy::default(),
            max_retained_operations: default_max_retained_operations(),
        }
    }
}

impl ForkSettings {
    /// Defaults overridden by `FORK_ANALYTICS_ENABLED` and
    /// `FORK_MAX_RETAINED_OPERATIONS`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(enabled) = parse_flag(lookup("FORK_ANALYTICS_ENABLED").as_deref()) {
            settings.analytics_enabled = enabled;
        }
        if let Some(limit) = lookup("FORK_MAX_RETAINED_OPERATIONS")
            .and_then(|value| value.trim().parse::<usize>().ok())
        {
            settings.max_retained_operations = limit;
        }

        settings
    }
}
