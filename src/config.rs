//! Resolver engine configuration.

use std::path::PathBuf;

/// Preferred location of the generated resolver file.
pub const DEFAULT_RESOLV_CONF_PATH: &str = "/var/run/netresolv/resolv.conf";

/// Conventional system resolver file, used when the preferred path cannot be
/// opened.
pub const SYSTEM_RESOLV_CONF_PATH: &str = "/etc/resolv.conf";

/// Startup configuration for a [`Resolver`](crate::Resolver).
///
/// # Example
///
/// ```
/// use netresolv::ResolverConfig;
///
/// let config = ResolverConfig::new()
///     .with_dnsproxy(true)
///     .with_fallback_nameservers(["192.0.2.53", "2001:db8::53"]);
///
/// assert!(config.use_dnsproxy);
/// assert_eq!(config.fallback_nameservers.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Publish entries to the DNS proxy instead of writing a resolver file.
    /// Ignored if the proxy fails to start.
    pub use_dnsproxy: bool,

    /// Statically configured nameservers used while no interface provides
    /// one. Only loaded when the proxy is active.
    pub fallback_nameservers: Vec<String>,

    /// Preferred path for the generated resolver file.
    pub resolv_conf_path: PathBuf,

    /// Path tried when `resolv_conf_path` cannot be opened.
    pub system_resolv_conf_path: PathBuf,
}

impl ResolverConfig {
    /// Creates a file-backend config with the default paths and no fallback
    /// nameservers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            use_dnsproxy: false,
            fallback_nameservers: Vec::new(),
            resolv_conf_path: PathBuf::from(DEFAULT_RESOLV_CONF_PATH),
            system_resolv_conf_path: PathBuf::from(SYSTEM_RESOLV_CONF_PATH),
        }
    }

    /// Requests the DNS proxy backend.
    #[must_use]
    pub const fn with_dnsproxy(mut self, enabled: bool) -> Self {
        self.use_dnsproxy = enabled;
        self
    }

    /// Replaces the fallback nameserver list, keeping its order.
    #[must_use]
    pub fn with_fallback_nameservers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_nameservers = servers.into_iter().map(Into::into).collect();
        self
    }

    /// Overrides both resolver file paths (useful for testing).
    #[must_use]
    pub fn with_resolv_conf_paths(
        mut self,
        preferred: impl Into<PathBuf>,
        system: impl Into<PathBuf>,
    ) -> Self {
        self.resolv_conf_path = preferred.into();
        self.system_resolv_conf_path = system.into();
        self
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sets_defaults() {
        let c = ResolverConfig::new();
        assert!(!c.use_dnsproxy);
        assert!(c.fallback_nameservers.is_empty());
        assert_eq!(c.resolv_conf_path, PathBuf::from(DEFAULT_RESOLV_CONF_PATH));
        assert_eq!(c.system_resolv_conf_path, PathBuf::from(SYSTEM_RESOLV_CONF_PATH));
    }

    #[test]
    fn builders_override() {
        let c = ResolverConfig::new()
            .with_dnsproxy(true)
            .with_fallback_nameservers(vec!["8.8.8.8".to_string()])
            .with_resolv_conf_paths("/tmp/a", "/tmp/b");
        assert!(c.use_dnsproxy);
        assert_eq!(c.fallback_nameservers, vec!["8.8.8.8"]);
        assert_eq!(c.resolv_conf_path, PathBuf::from("/tmp/a"));
        assert_eq!(c.system_resolv_conf_path, PathBuf::from("/tmp/b"));
    }
}
