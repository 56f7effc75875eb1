//! Resolver entries and the matching rule shared by every lookup.

use bitflags::bitflags;
use slotmap::new_key_type;

use crate::timer::TimerToken;
use crate::util::AddressFamily;

/// Interface index of global entries not tied to any interface.
pub const GLOBAL_INDEX: i32 = -1;

new_key_type! {
    /// Stable handle of an entry in the store.
    pub struct EntryId;
}

bitflags! {
    /// Origin markers for a [`ResolverEntry`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EntryFlags: u32 {
        /// Statically configured fallback ("public") nameserver.
        const PUBLIC = 1 << 0;
    }
}

/// One nameserver and/or search domain, scoped to an interface or global.
#[derive(Debug, Clone)]
pub struct ResolverEntry {
    index: i32,
    domain: Option<String>,
    server: Option<String>,
    family: AddressFamily,
    flags: EntryFlags,
    lifetime: u32,
    pub(crate) timer: Option<TimerToken>,
}

impl ResolverEntry {
    pub(crate) fn new(
        index: i32,
        domain: Option<&str>,
        server: Option<&str>,
        lifetime: u32,
        flags: EntryFlags,
    ) -> Self {
        Self {
            index,
            domain: domain.map(str::to_owned),
            server: server.map(str::to_owned),
            family: AddressFamily::of(server),
            flags,
            lifetime,
            timer: None,
        }
    }

    /// Interface index, or [`GLOBAL_INDEX`].
    #[must_use]
    pub const fn index(&self) -> i32 {
        self.index
    }

    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    #[must_use]
    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    #[must_use]
    pub const fn family(&self) -> AddressFamily {
        self.family
    }

    #[must_use]
    pub const fn flags(&self) -> EntryFlags {
        self.flags
    }

    /// Lifetime in seconds as last advertised; 0 means permanent.
    #[must_use]
    pub const fn lifetime(&self) -> u32 {
        self.lifetime
    }

    pub(crate) const fn set_lifetime(&mut self, lifetime: u32) {
        self.lifetime = lifetime;
    }

    /// Whether a lifetime timer is pending for this entry.
    #[must_use]
    pub const fn is_timed(&self) -> bool {
        self.timer.is_some()
    }

    /// Scoped to an interface rather than global.
    #[must_use]
    pub const fn is_interface_scoped(&self) -> bool {
        self.index >= 0
    }

    /// Global entry carrying a server, i.e. a fallback nameserver.
    #[must_use]
    pub const fn is_fallback_server(&self) -> bool {
        self.index < 0 && self.server.is_some()
    }

    /// Interface entry carrying a server.
    #[must_use]
    pub const fn is_interface_server(&self) -> bool {
        self.is_interface_scoped() && self.server.is_some()
    }

    /// Whether the network-service collaborator was told about this
    /// nameserver when the entry was created.
    pub(crate) const fn is_service_recorded(&self) -> bool {
        self.is_interface_server() && self.lifetime > 0
    }

    /// Exact match on index, domain and server. Absent only matches absent.
    #[must_use]
    pub fn matches(&self, index: i32, domain: Option<&str>, server: Option<&str>) -> bool {
        self.index == index && self.domain() == domain && self.server() == server
    }
}

/// Treats empty strings as absent.
pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
