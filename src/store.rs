//! The resolver entry store and its public mutation API.
//!
//! All operations, including timer processing, run on one control thread.
//! Entries live in an arena keyed by [`EntryId`] so a firing timer can look
//! its entry up and treat a miss as "already removed".

use std::time::{Duration, Instant};

use slotmap::SlotMap;

use crate::backend::{Dispatcher, DnsProxy};
use crate::config::ResolverConfig;
use crate::entry::{EntryFlags, EntryId, GLOBAL_INDEX, ResolverEntry, non_empty};
use crate::error::{ResolverError, Result};
use crate::resolv_file::ResolvFile;
use crate::service::NetworkServices;
use crate::timer::{
    Clock, FiredTimer, LifetimePhase, LifetimeTimers, SystemClock, refresh_interval,
    remaining_interval,
};
use crate::util::AddressFamily;

/// Why an entry leaves the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    Explicit,
    /// The service layer was already told (as a detach).
    Expired,
}

/// Per-interface nameservers and search domains.
///
/// # Example
///
/// ```rust,no_run
/// use netresolv::{NoServices, Resolver, ResolverConfig};
///
/// let mut resolver = Resolver::init(&ResolverConfig::new(), None, Box::new(NoServices));
///
/// // Static configuration on interface 2.
/// resolver.append(2, Some("example.org"), Some("192.0.2.53"))?;
///
/// // RDNSS option with a 30 minute lifetime on interface 3.
/// resolver.append_with_lifetime(3, None, Some("2001:db8::53"), 1800)?;
///
/// // From the event loop:
/// if let Some(timeout) = resolver.next_timeout() {
///     std::thread::sleep(timeout);
///     resolver.run_timers();
/// }
///
/// resolver.remove_all(2)?;
/// resolver.cleanup();
/// # Ok::<(), netresolv::ResolverError>(())
/// ```
pub struct Resolver {
    entries: SlotMap<EntryId, ResolverEntry>,
    order: Vec<EntryId>,
    timers: LifetimeTimers,
    dispatcher: Dispatcher,
    services: Box<dyn NetworkServices>,
    clock: Box<dyn Clock>,
    /// Fallback servers are currently published to the backend.
    fallback_active: bool,
}

impl Resolver {
    /// Starts the engine.
    ///
    /// The proxy backend is used when `config.use_dnsproxy` is set and
    /// `proxy` starts; in that case the configured fallback nameservers are
    /// registered as global entries. Otherwise the resolver file is written.
    pub fn init(
        config: &ResolverConfig,
        proxy: Option<Box<dyn DnsProxy>>,
        services: Box<dyn NetworkServices>,
    ) -> Self {
        Self::init_with_clock(config, proxy, services, Box::new(SystemClock))
    }

    /// Like [`init`](Self::init) with a custom time source.
    pub fn init_with_clock(
        config: &ResolverConfig,
        proxy: Option<Box<dyn DnsProxy>>,
        services: Box<dyn NetworkServices>,
        clock: Box<dyn Clock>,
    ) -> Self {
        tracing::debug!(dnsproxy = config.use_dnsproxy, "Initializing resolver");

        let mut resolver = Self {
            entries: SlotMap::with_key(),
            order: Vec::new(),
            timers: LifetimeTimers::new(),
            dispatcher: Dispatcher::init(config, proxy),
            services,
            clock,
            fallback_active: true,
        };

        if resolver.dispatcher.is_proxy() {
            for server in &config.fallback_nameservers {
                tracing::debug!(server = %server, "Registering fallback nameserver");
                if let Err(e) = resolver.append_resolver(
                    GLOBAL_INDEX,
                    None,
                    non_empty(Some(server.as_str())),
                    0,
                    EntryFlags::PUBLIC,
                ) {
                    tracing::warn!(server = %server, error = %e, "Ignoring fallback nameserver");
                }
            }
        }

        resolver
    }

    /// Releases everything. Pending timers are cancelled and the resolver
    /// file is not rewritten.
    pub fn cleanup(mut self) {
        tracing::debug!(entries = self.order.len(), "Cleaning up resolver");
        self.timers.clear();
        self.dispatcher.cleanup();
        self.order.clear();
        self.entries.clear();
    }

    /// Whether entries are published to the DNS proxy.
    #[must_use]
    pub const fn is_proxy_enabled(&self) -> bool {
        self.dispatcher.is_proxy()
    }

    /// Entries in store order.
    pub fn entries(&self) -> impl Iterator<Item = &ResolverEntry> + '_ {
        self.order.iter().filter_map(|id| self.entries.get(*id))
    }

    /// Number of entries, timed and permanent.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The resolver file exporter, active or not.
    #[must_use]
    pub const fn resolv_file(&self) -> &ResolvFile {
        self.dispatcher.resolv_file()
    }

    /// Adds a permanent entry.
    ///
    /// # Errors
    ///
    /// [`ResolverError::InvalidArgument`] if both `domain` and `server` are
    /// absent. [`ResolverError::AlreadyExists`] if an identical permanent
    /// entry exists; the proxy, if active, is notified again anyway.
    pub fn append(&mut self, index: i32, domain: Option<&str>, server: Option<&str>) -> Result<()> {
        let (domain, server) = (non_empty(domain), non_empty(server));
        tracing::debug!(index, domain, server, "Appending resolver entry");

        if domain.is_none() && server.is_none() {
            return Err(ResolverError::InvalidArgument("domain and server are both empty"));
        }

        if let Some(id) = self.find(|e| !e.is_timed() && e.matches(index, domain, server)) {
            let suppressed = !self.fallback_active
                && self.entries.get(id).is_some_and(ResolverEntry::is_fallback_server);
            if let Some(proxy) = self.dispatcher.proxy_mut().filter(|_| !suppressed) {
                report(proxy.append(index, domain, server), "republish", index, domain, server);
            }
            return Err(ResolverError::AlreadyExists);
        }

        self.append_resolver(index, domain, server, 0, EntryFlags::empty())
            .map(drop)
    }

    /// Adds or refreshes an entry learned with a lifetime (RDNSS).
    ///
    /// A matching timed entry is re-armed with the new lifetime, or expired
    /// right away if `lifetime` is 0.
    ///
    /// # Errors
    ///
    /// [`ResolverError::InvalidArgument`] if both `domain` and `server` are
    /// absent.
    pub fn append_with_lifetime(
        &mut self,
        index: i32,
        domain: Option<&str>,
        server: Option<&str>,
        lifetime: u32,
    ) -> Result<()> {
        let (domain, server) = (non_empty(domain), non_empty(server));
        tracing::debug!(index, domain, server, lifetime, "Appending resolver entry with lifetime");

        if domain.is_none() && server.is_none() {
            return Err(ResolverError::InvalidArgument("domain and server are both empty"));
        }

        let Some(id) = self.find(|e| e.is_timed() && e.matches(index, domain, server)) else {
            return self
                .append_resolver(index, domain, server, lifetime, EntryFlags::empty())
                .map(drop);
        };

        self.cancel_timer(id);
        if lifetime == 0 {
            self.expire(id);
            return Ok(());
        }

        if let Some(entry) = self.entries.get_mut(id) {
            entry.set_lifetime(lifetime);
        }
        let interval = refresh_interval(lifetime);
        tracing::debug!(index, domain, server, threshold = interval.as_secs(), "RDNSS lifetime renewed");
        let deadline = self.clock.now() + interval;
        self.arm(id, LifetimePhase::Refresh, deadline);
        Ok(())
    }

    /// Removes the first entry matching exactly.
    ///
    /// # Errors
    ///
    /// [`ResolverError::NotFound`] if nothing matches.
    pub fn remove(&mut self, index: i32, domain: Option<&str>, server: Option<&str>) -> Result<()> {
        let (domain, server) = (non_empty(domain), non_empty(server));
        tracing::debug!(index, domain, server, "Removing resolver entry");

        let id = self
            .find(|e| e.matches(index, domain, server))
            .ok_or(ResolverError::NotFound)?;
        self.remove_entries(&[id], Removal::Explicit);
        Ok(())
    }

    /// Removes every entry of an interface.
    ///
    /// # Errors
    ///
    /// [`ResolverError::InvalidArgument`] for a negative index,
    /// [`ResolverError::NotFound`] if the interface has no entries.
    pub fn remove_all(&mut self, index: i32) -> Result<()> {
        tracing::debug!(index, "Removing all resolver entries");

        if index < 0 {
            return Err(ResolverError::InvalidArgument("negative interface index"));
        }

        let ids: Vec<EntryId> = self
            .order
            .iter()
            .copied()
            .filter(|id| self.entries.get(*id).is_some_and(|e| e.index() == index))
            .collect();
        if ids.is_empty() {
            return Err(ResolverError::NotFound);
        }

        self.remove_entries(&ids, Removal::Explicit);
        Ok(())
    }

    /// Makes the proxy pick new source addresses for an interface whose
    /// addresses changed. Timed IPv6 servers are withdrawn and re-added;
    /// domain-only entries are re-added. No-op without the proxy.
    ///
    /// # Errors
    ///
    /// [`ResolverError::InvalidArgument`] for a negative index while the
    /// proxy is active.
    pub fn redo_servers(&mut self, index: i32) -> Result<()> {
        let Some(proxy) = self.dispatcher.proxy_mut() else {
            return Ok(());
        };
        tracing::debug!(index, "Redoing resolver servers");

        if index < 0 {
            return Err(ResolverError::InvalidArgument("negative interface index"));
        }

        let entries = self.order.iter().filter_map(|id| self.entries.get(*id));
        for e in entries.clone().filter(|e| {
            e.is_timed() && e.index() == index && e.family() == AddressFamily::Ipv6
        }) {
            report(proxy.remove(index, e.domain(), e.server()), "withdraw", index, e.domain(), e.server());
            report(proxy.append(index, e.domain(), e.server()), "republish", index, e.domain(), e.server());
        }

        // The proxy keeps one copy of each search domain, so no withdraw.
        for e in entries.filter(|e| e.index() == index && e.server().is_none()) {
            report(proxy.append(index, e.domain(), None), "republish", index, e.domain(), None);
        }

        Ok(())
    }

    /// Publishes the fallback nameservers if no interface provides a server
    /// and they are not published already.
    pub fn append_fallback_if_needed(&mut self) {
        if self.fallback_active || self.entries().any(ResolverEntry::is_interface_server) {
            return;
        }
        self.fallback_active = true;

        for e in self
            .order
            .iter()
            .filter_map(|id| self.entries.get(*id))
            .filter(|e| e.is_fallback_server())
        {
            tracing::debug!(index = e.index(), server = e.server(), "Activating fallback nameserver");
            report(
                self.dispatcher.append(e.index(), e.domain(), e.server()),
                "publish",
                e.index(),
                e.domain(),
                e.server(),
            );
        }
    }

    /// Appends a record to the resolver file regardless of the backend.
    ///
    /// # Errors
    ///
    /// See [`ResolvFile::append`].
    pub fn file_append(&mut self, index: i32, domain: Option<&str>, server: Option<&str>) -> Result<()> {
        self.dispatcher.resolv_file_mut().append(index, domain, server)
    }

    /// Removes records from the resolver file regardless of the backend.
    ///
    /// # Errors
    ///
    /// See [`ResolvFile::remove`].
    pub fn file_remove(&mut self, index: i32, domain: Option<&str>, server: Option<&str>) -> Result<()> {
        self.dispatcher.resolv_file_mut().remove(index, domain, server)
    }

    /// Time until the next lifetime timer is due.
    pub fn next_timeout(&mut self) -> Option<Duration> {
        let deadline = self.timers.next_deadline()?;
        Some(deadline.saturating_duration_since(self.clock.now()))
    }

    /// Runs every lifetime timer that is due. Returns how many fired.
    pub fn run_timers(&mut self) -> usize {
        let now = self.clock.now();
        let mut fired = 0;
        while let Some(timer) = self.timers.pop_due(now) {
            fired += 1;
            self.on_timer(timer);
        }
        fired
    }

    /// Number of armed lifetime timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    fn on_timer(&mut self, timer: FiredTimer) {
        let Some(entry) = self.entries.get_mut(timer.entry) else {
            tracing::trace!(?timer, "Lifetime timer for removed entry");
            return;
        };
        if entry.timer != Some(timer.token) {
            tracing::trace!(?timer, "Stale lifetime timer");
            return;
        }
        entry.timer = None;

        match timer.phase {
            LifetimePhase::Refresh => self.refresh(timer.entry, timer.deadline),
            LifetimePhase::Expire => self.expire(timer.entry),
        }
    }

    fn refresh(&mut self, id: EntryId, due: Instant) {
        let Some(entry) = self.entries.get(id) else {
            return;
        };
        let index = entry.index();
        let remaining = remaining_interval(entry.lifetime());
        tracing::debug!(
            index,
            domain = entry.domain(),
            server = entry.server(),
            remaining = remaining.as_secs(),
            "RDNSS entry due for refresh"
        );

        self.arm(id, LifetimePhase::Expire, due + remaining);

        if index >= 0 {
            self.services.refresh_router_solicitation(index);
        }
    }

    fn expire(&mut self, id: EntryId) {
        let Some(entry) = self.entries.get(id) else {
            return;
        };
        tracing::debug!(
            index = entry.index(),
            domain = entry.domain(),
            server = entry.server(),
            "Resolver entry expired"
        );

        if let Some(server) = entry.server().filter(|_| entry.is_interface_scoped()) {
            self.services.nameserver_remove(entry.index(), server, true);
        }

        self.remove_entries(&[id], Removal::Expired);
    }

    fn append_resolver(
        &mut self,
        index: i32,
        domain: Option<&str>,
        server: Option<&str>,
        lifetime: u32,
        flags: EntryFlags,
    ) -> Result<EntryId> {
        tracing::debug!(index, domain, server, lifetime, flags = flags.bits(), "Creating resolver entry");

        if domain.is_none() && server.is_none() {
            return Err(ResolverError::InvalidArgument("domain and server are both empty"));
        }

        self.order.try_reserve(1)?;
        let id = self
            .entries
            .insert(ResolverEntry::new(index, domain, server, lifetime, flags));

        if lifetime > 0 {
            let interval = refresh_interval(lifetime);
            tracing::debug!(index, domain, server, threshold = interval.as_secs(), "RDNSS lifetime armed");
            let deadline = self.clock.now() + interval;
            self.arm(id, LifetimePhase::Refresh, deadline);
        }

        if index >= 0 && server.is_some() {
            self.remove_fallback_nameservers();
        }

        self.order.push(id);
        // A new fallback waits until the interfaces run out of servers.
        if index >= 0 || server.is_none() || self.fallback_active {
            report(self.dispatcher.append(index, domain, server), "publish", index, domain, server);
        }

        // Only RDNSS-learned servers are mirrored into the service.
        if let Some(server) = server.filter(|_| index >= 0 && lifetime > 0) {
            self.services.nameserver_append(index, server);
        }

        Ok(id)
    }

    /// Withdraws fallback servers from the backend. They stay in the store.
    fn remove_fallback_nameservers(&mut self) {
        if !self.fallback_active {
            return;
        }
        self.fallback_active = false;

        for e in self
            .order
            .iter()
            .filter_map(|id| self.entries.get(*id))
            .filter(|e| e.is_fallback_server())
        {
            tracing::debug!(index = e.index(), server = e.server(), "Deactivating fallback nameserver");
            report(
                self.dispatcher.remove(e.index(), e.domain(), e.server()),
                "withdraw",
                e.index(),
                e.domain(),
                e.server(),
            );
        }
    }

    fn remove_entries(&mut self, ids: &[EntryId], reason: Removal) {
        for &id in ids {
            self.cancel_timer(id);
            self.order.retain(|o| *o != id);
            let Some(entry) = self.entries.remove(id) else {
                continue;
            };

            if self.fallback_active || !entry.is_fallback_server() {
                report(
                    self.dispatcher.remove(entry.index(), entry.domain(), entry.server()),
                    "withdraw",
                    entry.index(),
                    entry.domain(),
                    entry.server(),
                );
            }

            if reason == Removal::Explicit && entry.is_service_recorded() {
                if let Some(server) = entry.server() {
                    self.services.nameserver_remove(entry.index(), server, false);
                }
            }
        }

        self.append_fallback_if_needed();
    }

    fn find(&self, pred: impl Fn(&ResolverEntry) -> bool) -> Option<EntryId> {
        self.order
            .iter()
            .copied()
            .find(|id| self.entries.get(*id).is_some_and(&pred))
    }

    fn arm(&mut self, id: EntryId, phase: LifetimePhase, deadline: Instant) {
        let token = self.timers.arm(id, phase, deadline);
        if let Some(entry) = self.entries.get_mut(id) {
            entry.timer = Some(token);
        }
    }

    fn cancel_timer(&mut self, id: EntryId) {
        if let Some(token) = self.entries.get_mut(id).and_then(|e| e.timer.take()) {
            self.timers.cancel(token);
        }
    }
}

/// Backend failures never fail a store operation; the store stays
/// authoritative.
fn report(
    result: Result<()>,
    action: &str,
    index: i32,
    domain: Option<&str>,
    server: Option<&str>,
) {
    if let Err(e) = result {
        tracing::warn!(index, domain, server, error = %e, "Failed to {action} resolver entry");
    }
}
