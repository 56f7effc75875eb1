//! # netresolv
//!
//! DNS resolver configuration engine for a connection manager.
//!
//! The engine tracks, per network interface, the nameservers and search
//! domains currently in use and publishes them either to an in-process DNS
//! proxy or into a generated `resolv.conf`. Nameservers learned from IPv6
//! Router Advertisements (RDNSS) carry a lifetime: at 80% of it a Router
//! Solicitation is requested, and if no fresh advertisement arrives the entry
//! expires.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use netresolv::{NoServices, Resolver, ResolverConfig};
//!
//! let config = ResolverConfig::new()
//!     .with_resolv_conf_paths("/run/netresolv/resolv.conf", "/etc/resolv.conf");
//! let mut resolver = Resolver::init(&config, None, Box::new(NoServices));
//!
//! resolver.append(2, Some("corp.example"), Some("192.0.2.53"))?;
//! resolver.append_with_lifetime(2, None, Some("2001:db8::53"), 1800)?;
//!
//! // Interface went down.
//! resolver.remove_all(2)?;
//! ```
//!
//! ## Fallback nameservers
//!
//! With the proxy backend, nameservers from
//! [`ResolverConfig::fallback_nameservers`] are registered as global entries.
//! They are published only while no interface provides a nameserver of its
//! own.
//!
//! ## Threading
//!
//! [`Resolver`] is meant to be driven from a single event loop. It is not
//! `Send`: collaborators are plain trait objects and no locking is done.
//! The loop sleeps for [`Resolver::next_timeout`] and then calls
//! [`Resolver::run_timers`].
//!
//! ## Generated file
//!
//! ```text
//! # Generated by Connection Manager
//! search newest.example older.example
//! nameserver 2001:db8::53
//! nameserver 192.0.2.53
//! ```
//!
//! At most [`MAXDNSRCH`] search domains and [`MAXNS`] nameservers are
//! written, newest first.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod entry;
pub mod error;
pub mod resolv_file;
pub mod service;
pub mod store;
pub mod timer;
pub mod util;

pub use backend::DnsProxy;
pub use config::ResolverConfig;
pub use entry::{EntryFlags, EntryId, GLOBAL_INDEX, ResolverEntry};
pub use error::{ResolverError, Result};
pub use resolv_file::{MAXDNSRCH, MAXNS, ResolvFile, ResolvFileEntry};
pub use service::{NetworkServices, NoServices};
pub use store::Resolver;
pub use timer::{Clock, RESOLVER_LIFETIME_REFRESH_THRESHOLD, SystemClock};
pub use util::AddressFamily;
