//! Publication of resolver entries to the DNS proxy or the resolver file.

use crate::config::ResolverConfig;
use crate::error::Result;
use crate::resolv_file::ResolvFile;

/// The in-process DNS proxy that answers queries on behalf of the system.
pub trait DnsProxy {
    /// Starts the proxy. On failure the engine falls back to writing the
    /// resolver file.
    ///
    /// # Errors
    ///
    /// Any error means the proxy is unavailable.
    fn init(&mut self) -> Result<()>;

    /// Stops the proxy and releases its state.
    fn cleanup(&mut self);

    /// Adds a nameserver and/or search domain for an interface.
    ///
    /// # Errors
    ///
    /// Implementation defined; the engine only logs it.
    fn append(&mut self, index: i32, domain: Option<&str>, server: Option<&str>) -> Result<()>;

    /// Withdraws what [`append`](Self::append) added.
    ///
    /// # Errors
    ///
    /// Implementation defined; the engine only logs it.
    fn remove(&mut self, index: i32, domain: Option<&str>, server: Option<&str>) -> Result<()>;
}

enum Backend {
    Proxy(Box<dyn DnsProxy>),
    File,
}

/// Routes entry changes to the backend selected at startup.
///
/// The resolver file is always owned here, so the explicit file helpers keep
/// working while the proxy is active.
pub struct Dispatcher {
    backend: Backend,
    resolv_file: ResolvFile,
}

impl Dispatcher {
    /// Selects the proxy when requested and it starts; otherwise the file.
    pub fn init(config: &ResolverConfig, proxy: Option<Box<dyn DnsProxy>>) -> Self {
        let backend = match proxy {
            Some(mut proxy) if config.use_dnsproxy => match proxy.init() {
                Ok(()) => Backend::Proxy(proxy),
                Err(e) => {
                    tracing::warn!(error = %e, "DNS proxy failed to start, using resolver file");
                    Backend::File
                }
            },
            _ => Backend::File,
        };

        let dispatcher = Self {
            backend,
            resolv_file: ResolvFile::from_config(config),
        };
        tracing::info!(
            dnsproxy = dispatcher.is_proxy(),
            path = %dispatcher.resolv_file.path().display(),
            "Resolver backend selected"
        );
        dispatcher
    }

    /// Whether the proxy is the active backend.
    #[must_use]
    pub const fn is_proxy(&self) -> bool {
        matches!(self.backend, Backend::Proxy(_))
    }

    /// Publishes an entry.
    ///
    /// # Errors
    ///
    /// Propagates the backend's error.
    pub fn append(&mut self, index: i32, domain: Option<&str>, server: Option<&str>) -> Result<()> {
        match &mut self.backend {
            Backend::Proxy(proxy) => proxy.append(index, domain, server),
            Backend::File => self.resolv_file.append(index, domain, server),
        }
    }

    /// Withdraws an entry. The file backend drops only the newest matching
    /// record, so identical entries still in the store stay published.
    ///
    /// # Errors
    ///
    /// Propagates the backend's error.
    pub fn remove(&mut self, index: i32, domain: Option<&str>, server: Option<&str>) -> Result<()> {
        match &mut self.backend {
            Backend::Proxy(proxy) => proxy.remove(index, domain, server),
            Backend::File => self.resolv_file.remove_latest(index, domain, server),
        }
    }

    /// The proxy, if it is the active backend.
    pub fn proxy_mut(&mut self) -> Option<&mut dyn DnsProxy> {
        match &mut self.backend {
            Backend::Proxy(proxy) => Some(&mut **proxy),
            Backend::File => None,
        }
    }

    /// The resolver file exporter, active or not.
    pub const fn resolv_file(&self) -> &ResolvFile {
        &self.resolv_file
    }

    /// Mutable access for the explicit file helpers.
    pub const fn resolv_file_mut(&mut self) -> &mut ResolvFile {
        &mut self.resolv_file
    }

    /// Tears down the active backend. The resolver file is left as is.
    pub fn cleanup(&mut self) {
        match &mut self.backend {
            Backend::Proxy(proxy) => proxy.cleanup(),
            Backend::File => self.resolv_file.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolverError;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct FakeProxy {
        fail_init: bool,
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl DnsProxy for FakeProxy {
        fn init(&mut self) -> Result<()> {
            if self.fail_init {
                return Err(ResolverError::Proxy("no socket".into()));
            }
            self.calls.borrow_mut().push("init".into());
            Ok(())
        }

        fn cleanup(&mut self) {
            self.calls.borrow_mut().push("cleanup".into());
        }

        fn append(&mut self, index: i32, _domain: Option<&str>, server: Option<&str>) -> Result<()> {
            self.calls
                .borrow_mut()
                .push(format!("append {index} {}", server.unwrap_or("-")));
            Ok(())
        }

        fn remove(&mut self, index: i32, _domain: Option<&str>, server: Option<&str>) -> Result<()> {
            self.calls
                .borrow_mut()
                .push(format!("remove {index} {}", server.unwrap_or("-")));
            Ok(())
        }
    }

    fn config(dir: &tempfile::TempDir, proxy: bool) -> ResolverConfig {
        ResolverConfig::new()
            .with_dnsproxy(proxy)
            .with_resolv_conf_paths(dir.path().join("resolv.conf"), dir.path().join("etc"))
    }

    #[test]
    fn proxy_selected_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let proxy = FakeProxy {
            calls: Rc::clone(&calls),
            ..FakeProxy::default()
        };
        let mut d = Dispatcher::init(&config(&dir, true), Some(Box::new(proxy)));

        assert!(d.is_proxy());
        d.append(1, None, Some("192.0.2.1")).unwrap();
        d.remove(1, None, Some("192.0.2.1")).unwrap();
        d.cleanup();

        assert_eq!(
            *calls.borrow(),
            vec!["init", "append 1 192.0.2.1", "remove 1 192.0.2.1", "cleanup"]
        );
        assert!(!dir.path().join("resolv.conf").exists());
    }

    #[test]
    fn proxy_init_failure_degrades_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let proxy = FakeProxy {
            fail_init: true,
            ..FakeProxy::default()
        };
        let mut d = Dispatcher::init(&config(&dir, true), Some(Box::new(proxy)));

        assert!(!d.is_proxy());
        assert!(d.proxy_mut().is_none());
        d.append(1, None, Some("192.0.2.1")).unwrap();
        assert_eq!(d.resolv_file().entries().len(), 1);
    }

    #[test]
    fn file_withdrawal_removes_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = Dispatcher::init(&config(&dir, false), None);

        d.append(1, None, Some("192.0.2.1")).unwrap();
        d.append(1, None, Some("192.0.2.1")).unwrap();
        d.remove(1, None, Some("192.0.2.1")).unwrap();

        assert_eq!(d.resolv_file().entries().len(), 1);
        let content = std::fs::read_to_string(dir.path().join("resolv.conf")).unwrap();
        assert!(content.contains("nameserver 192.0.2.1\n"));
    }

    #[test]
    fn proxy_ignored_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let proxy = FakeProxy {
            calls: Rc::clone(&calls),
            ..FakeProxy::default()
        };
        let d = Dispatcher::init(&config(&dir, false), Some(Box::new(proxy)));

        assert!(!d.is_proxy());
        assert!(calls.borrow().is_empty());
    }
}
