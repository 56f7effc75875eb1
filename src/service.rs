//! Hooks into the network-service layer.

/// Per-network nameserver bookkeeping and Router Solicitation trigger.
///
/// Implementors resolve `index` to their own service/network objects and
/// ignore indices they do not know.
pub trait NetworkServices {
    /// An RDNSS-learned nameserver appeared on the interface.
    fn nameserver_append(&mut self, index: i32, server: &str);

    /// A nameserver previously reported by
    /// [`nameserver_append`](Self::nameserver_append) went away. `detach` is
    /// `true` when its lifetime ran out, `false` when it was removed
    /// explicitly.
    fn nameserver_remove(&mut self, index: i32, server: &str, detach: bool);

    /// Sends a Router Solicitation on the interface so fresh RDNSS options
    /// arrive before the current ones expire.
    fn refresh_router_solicitation(&mut self, index: i32);
}

/// Collaborator for deployments without a service layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoServices;

impl NetworkServices for NoServices {
    fn nameserver_append(&mut self, _index: i32, _server: &str) {}

    fn nameserver_remove(&mut self, _index: i32, _server: &str, _detach: bool) {}

    fn refresh_router_solicitation(&mut self, _index: i32) {}
}
