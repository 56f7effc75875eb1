//! Internal utilities.

use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Address family of a nameserver string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
    /// No server, or a server that is not a literal IP address.
    Unspecified,
}

impl AddressFamily {
    /// Classifies `server` the way the kernel would parse it.
    #[must_use]
    pub fn of(server: Option<&str>) -> Self {
        match server.map(str::parse::<IpAddr>) {
            Some(Ok(IpAddr::V4(_))) => Self::Ipv4,
            Some(Ok(IpAddr::V6(_))) => Self::Ipv6,
            _ => Self::Unspecified,
        }
    }
}

/// Serializes umask changes made through [`UmaskGuard`].
static UMASK_LOCK: Mutex<()> = Mutex::new(());

/// Sets the process umask and restores the previous one on drop.
///
/// The mask is process-wide, so guards are held one at a time.
pub struct UmaskGuard {
    previous: libc::mode_t,
    _lock: MutexGuard<'static, ()>,
}

impl UmaskGuard {
    #[must_use]
    pub fn set(mask: libc::mode_t) -> Self {
        let lock = UMASK_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        // SAFETY: `umask` only swaps the process file-creation mask and
        // cannot fail.
        let previous = unsafe { libc::umask(mask) };
        Self {
            previous,
            _lock: lock,
        }
    }
}

impl Drop for UmaskGuard {
    fn drop(&mut self) {
        // SAFETY: see `UmaskGuard::set`.
        unsafe {
            libc::umask(self.previous);
        }
    }
}
