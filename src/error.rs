//! Error types.

use std::collections::TryReserveError;

use thiserror::Error;

/// Result alias for resolver operations.
pub type Result<T> = std::result::Result<T, ResolverError>;

/// Errors returned by resolver operations.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// The arguments cannot describe a resolver entry (no domain and no
    /// server, or a negative interface index where one is not allowed).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// An identical permanent entry is already registered.
    #[error("resolver entry already exists")]
    AlreadyExists,

    /// No entry matched.
    #[error("no matching resolver entry")]
    NotFound,

    /// Growing an entry list failed.
    #[error("out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),

    /// Writing the resolver configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The DNS proxy rejected an operation.
    #[error("DNS proxy error: {0}")]
    Proxy(String),
}

impl ResolverError {
    /// Returns `true` if the underlying I/O error is `PermissionDenied`.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied)
    }

    /// Negative errno equivalent, for callers that speak C return codes.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => -libc::EINVAL,
            Self::AlreadyExists => -libc::EEXIST,
            Self::NotFound => -libc::ENOENT,
            Self::OutOfMemory(_) => -libc::ENOMEM,
            Self::Io(e) => -e.raw_os_error().unwrap_or(libc::EIO),
            Self::Proxy(_) => -libc::EIO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(ResolverError::InvalidArgument("x").errno(), -libc::EINVAL);
        assert_eq!(ResolverError::AlreadyExists.errno(), -libc::EEXIST);
        assert_eq!(ResolverError::NotFound.errno(), -libc::ENOENT);
        let io = std::io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(ResolverError::Io(io).errno(), -libc::EACCES);
        let io = std::io::Error::other("short write");
        assert_eq!(ResolverError::Io(io).errno(), -libc::EIO);
    }

    #[test]
    fn permission_denied_detection() {
        let err = ResolverError::from(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert!(err.is_permission_denied());
        assert!(!ResolverError::NotFound.is_permission_denied());
    }
}
