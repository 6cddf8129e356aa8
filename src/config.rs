// src/config.rs
//! Tunables for the name register.

use std::time::Duration;

/// Delay between discovering an object and reading its name.
pub const DEFAULT_NAME_DEBOUNCE: Duration = Duration::from_millis(500);

/// Prefix the remote toolkit uses for auto-generated object names.
pub const DEFAULT_INTERNAL_PREFIX: &str = "qt_";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterConfig {
    /// How long a newly discovered object waits before its name is read.
    /// Remote objects are often named right after being created, so reading
    /// the name immediately would mostly see an empty string.
    pub name_debounce: Duration,
    /// Ancestors whose name starts with this prefix are left out of paths.
    pub internal_prefix: String,
}

impl Default for RegisterConfig {
    fn default() -> Self {
        Self {
            name_debounce: DEFAULT_NAME_DEBOUNCE,
            internal_prefix: DEFAULT_INTERNAL_PREFIX.to_string(),
        }
    }
}

impl RegisterConfig {
    pub fn with_name_debounce(mut self, delay: Duration) -> Self {
        self.name_debounce = delay;
        self
    }

    pub fn with_internal_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.internal_prefix = prefix.into();
        self
    }

    /// Whether `name` can be used as a path component.
    pub fn is_path_component(&self, name: &str) -> bool {
        !name.is_empty() && (self.internal_prefix.is_empty() || !name.starts_with(&self.internal_prefix))
    }
}
