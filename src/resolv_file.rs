//! Generation of the system resolver configuration file.
//!
//! The exporter keeps its own append-ordered record list and rewrites the
//! whole file after every change. The most recently appended records win:
//! they are emitted first, and older records fall off once the `MAXNS` and
//! `MAXDNSRCH` limits are reached.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::config::ResolverConfig;
use crate::entry::non_empty;
use crate::error::{ResolverError, Result};
use crate::util::UmaskGuard;

/// Maximum number of `nameserver` lines the C resolver honours.
pub const MAXNS: usize = 3;

/// Maximum number of domains on the `search` line.
pub const MAXDNSRCH: usize = 6;

/// First line of every generated file.
const GENERATED_BY_MARKER: &str = "# Generated by Connection Manager";

const FILE_MODE: u32 = 0o644;
const CREATE_UMASK: libc::mode_t = 0o022;

/// One record mirrored into the resolver file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvFileEntry {
    pub index: i32,
    pub domain: Option<String>,
    pub server: Option<String>,
}

impl ResolvFileEntry {
    fn matches(&self, index: i32, domain: Option<&str>, server: Option<&str>) -> bool {
        self.index == index && self.domain.as_deref() == domain && self.server.as_deref() == server
    }
}

/// Owns the record list and the on-disk resolver file.
///
/// # Example
///
/// ```rust,no_run
/// use netresolv::ResolvFile;
///
/// let mut file = ResolvFile::new("/var/run/netresolv/resolv.conf", "/etc/resolv.conf");
/// file.append(2, Some("example.org"), Some("192.0.2.53"))?;
/// file.remove(2, Some("example.org"), Some("192.0.2.53"))?;
/// # Ok::<(), netresolv::ResolverError>(())
/// ```
#[derive(Debug)]
pub struct ResolvFile {
    path: PathBuf,
    system_path: PathBuf,
    entries: Vec<ResolvFileEntry>,
    warned_fallback: bool,
}

impl ResolvFile {
    /// Creates an exporter writing to `path`, or to `system_path` when `path`
    /// cannot be opened.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, system_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            system_path: system_path.into(),
            entries: Vec::new(),
            warned_fallback: false,
        }
    }

    /// Creates an exporter for the paths in `config`.
    #[must_use]
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(
            config.resolv_conf_path.clone(),
            config.system_resolv_conf_path.clone(),
        )
    }

    /// Preferred output path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records in append order.
    #[must_use]
    pub fn entries(&self) -> &[ResolvFileEntry] {
        &self.entries
    }

    /// Appends a record and rewrites the file.
    ///
    /// The record is kept even if the write fails.
    ///
    /// # Errors
    ///
    /// [`ResolverError::InvalidArgument`] if both `domain` and `server` are
    /// absent, [`ResolverError::OutOfMemory`] if the list cannot grow, or
    /// [`ResolverError::Io`] if the file cannot be written.
    pub fn append(&mut self, index: i32, domain: Option<&str>, server: Option<&str>) -> Result<()> {
        let (domain, server) = (non_empty(domain), non_empty(server));
        tracing::debug!(index, domain, server, "Appending resolv.conf record");

        if domain.is_none() && server.is_none() {
            return Err(ResolverError::InvalidArgument("domain and server are both empty"));
        }

        self.entries.try_reserve(1)?;
        self.entries.push(ResolvFileEntry {
            index,
            domain: domain.map(str::to_owned),
            server: server.map(str::to_owned),
        });

        self.export()
    }

    /// Removes every matching record and rewrites the file, even when
    /// nothing matched.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::Io`] if the file cannot be written.
    pub fn remove(&mut self, index: i32, domain: Option<&str>, server: Option<&str>) -> Result<()> {
        let (domain, server) = (non_empty(domain), non_empty(server));
        tracing::debug!(index, domain, server, "Removing resolv.conf records");

        self.entries.retain(|e| !e.matches(index, domain, server));
        self.export()
    }

    /// Removes the most recently appended matching record and rewrites the
    /// file, even when nothing matched.
    ///
    /// Records of identical entries appended earlier stay in place.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::Io`] if the file cannot be written.
    pub fn remove_latest(
        &mut self,
        index: i32,
        domain: Option<&str>,
        server: Option<&str>,
    ) -> Result<()> {
        let (domain, server) = (non_empty(domain), non_empty(server));
        tracing::debug!(index, domain, server, "Removing resolv.conf record");

        if let Some(pos) = self.entries.iter().rposition(|e| e.matches(index, domain, server)) {
            self.entries.remove(pos);
        }
        self.export()
    }

    /// Drops all records without touching the file.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Regenerates the file from the current records.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::Io`] if neither path can be opened or the
    /// write fails.
    pub fn export(&mut self) -> Result<()> {
        let content = generate_file_content(&self.entries);
        let mut file = self.open()?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }

    fn open(&mut self) -> Result<File> {
        let _umask = UmaskGuard::set(CREATE_UMASK);

        match open_truncated(&self.path) {
            Ok(file) => Ok(file),
            Err(e) => {
                if !self.warned_fallback {
                    self.warned_fallback = true;
                    tracing::warn!(
                        path = %self.path.display(),
                        fallback = %self.system_path.display(),
                        error = %e,
                        "Cannot create resolver file, falling back"
                    );
                }
                Ok(open_truncated(&self.system_path)?)
            }
        }
    }
}

fn open_truncated(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(path)
}

/// Renders the file, newest records first.
///
/// ```text
/// # Generated by Connection Manager
/// search newest.example older.example
/// nameserver 2001:db8::53
/// nameserver 192.0.2.53
/// ```
fn generate_file_content(entries: &[ResolvFileEntry]) -> String {
    let mut content = String::from(GENERATED_BY_MARKER);
    content.push('\n');

    let domains: Vec<&str> = entries
        .iter()
        .rev()
        .filter_map(|e| e.domain.as_deref())
        .take(MAXDNSRCH)
        .collect();
    if !domains.is_empty() {
        content.push_str("search ");
        content.push_str(&domains.join(" "));
        content.push('\n');
    }

    for server in entries
        .iter()
        .rev()
        .filter_map(|e| e.server.as_deref())
        .take(MAXNS)
    {
        content.push_str("nameserver ");
        content.push_str(server);
        content.push('\n');
    }

    content
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: i32, domain: Option<&str>, server: Option<&str>) -> ResolvFileEntry {
        ResolvFileEntry {
            index,
            domain: domain.map(str::to_owned),
            server: server.map(str::to_owned),
        }
    }

    fn temp_file(dir: &tempfile::TempDir) -> ResolvFile {
        ResolvFile::new(dir.path().join("resolv.conf"), dir.path().join("etc-resolv.conf"))
    }

    #[test]
    fn content_header_only_when_empty() {
        assert_eq!(generate_file_content(&[]), "# Generated by Connection Manager\n");
    }

    #[test]
    fn content_lists_newest_first() {
        let entries = vec![
            record(1, Some("a.example"), Some("192.0.2.1")),
            record(2, Some("b.example"), None),
            record(3, Some("c.example"), Some("192.0.2.3")),
        ];
        assert_eq!(
            generate_file_content(&entries),
            "# Generated by Connection Manager\n\
             search c.example b.example a.example\n\
             nameserver 192.0.2.3\n\
             nameserver 192.0.2.1\n"
        );
    }

    #[test]
    fn content_respects_limits() {
        let entries: Vec<_> = (0..10)
            .map(|i| {
                let domain = format!("d{i}.example");
                let server = format!("192.0.2.{i}");
                record(i, Some(&domain), Some(&server))
            })
            .collect();
        let content = generate_file_content(&entries);

        let search = content.lines().find(|l| l.starts_with("search ")).unwrap();
        assert_eq!(search.split_whitespace().count() - 1, MAXDNSRCH);
        assert!(search.starts_with("search d9.example d8.example"));

        let servers: Vec<_> = content.lines().filter(|l| l.starts_with("nameserver ")).collect();
        assert_eq!(servers, vec!["nameserver 192.0.2.9", "nameserver 192.0.2.8", "nameserver 192.0.2.7"]);
    }

    #[test]
    fn append_writes_preferred_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = temp_file(&dir);

        file.append(2, Some("lan"), Some("192.0.2.53")).unwrap();

        let content = std::fs::read_to_string(dir.path().join("resolv.conf")).unwrap();
        assert!(content.starts_with(GENERATED_BY_MARKER));
        assert!(content.contains("search lan\n"));
        assert!(content.contains("nameserver 192.0.2.53\n"));
        assert!(!dir.path().join("etc-resolv.conf").exists());
    }

    #[test]
    fn append_rejects_empty_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = temp_file(&dir);
        assert!(matches!(
            file.append(1, Some(""), None),
            Err(ResolverError::InvalidArgument(_))
        ));
        assert!(file.entries().is_empty());
    }

    #[test]
    fn rewrite_truncates_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = temp_file(&dir);

        file.append(1, None, Some("192.0.2.1")).unwrap();
        file.append(1, None, Some("192.0.2.2")).unwrap();
        file.remove(1, None, Some("192.0.2.1")).unwrap();
        file.remove(1, None, Some("192.0.2.2")).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(content, "# Generated by Connection Manager\n");
    }

    #[test]
    fn remove_deletes_every_exact_match() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = temp_file(&dir);

        file.append(1, None, Some("192.0.2.1")).unwrap();
        file.append(1, Some("lan"), Some("192.0.2.1")).unwrap();
        file.append(1, None, Some("192.0.2.1")).unwrap();
        file.append(2, None, Some("192.0.2.1")).unwrap();

        file.remove(1, None, Some("192.0.2.1")).unwrap();
        assert_eq!(
            file.entries(),
            &[record(1, Some("lan"), Some("192.0.2.1")), record(2, None, Some("192.0.2.1"))]
        );
    }

    #[test]
    fn remove_latest_keeps_older_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = temp_file(&dir);

        file.append(1, None, Some("192.0.2.1")).unwrap();
        file.append(1, Some("lan"), None).unwrap();
        file.append(1, None, Some("192.0.2.1")).unwrap();

        file.remove_latest(1, None, Some("192.0.2.1")).unwrap();
        assert_eq!(
            file.entries(),
            &[record(1, None, Some("192.0.2.1")), record(1, Some("lan"), None)]
        );

        file.remove_latest(1, None, Some("192.0.2.9")).unwrap();
        assert_eq!(file.entries().len(), 2);
    }

    #[test]
    fn created_with_mode_0644() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let mut file = temp_file(&dir);
        file.append(1, None, Some("192.0.2.1")).unwrap();

        let mode = std::fs::metadata(file.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn falls_back_to_system_path() {
        let dir = tempfile::tempdir().unwrap();
        let system = dir.path().join("etc-resolv.conf");
        let mut file = ResolvFile::new(dir.path().join("missing").join("resolv.conf"), &system);

        file.append(3, None, Some("2001:db8::53")).unwrap();

        let content = std::fs::read_to_string(&system).unwrap();
        assert!(content.contains("nameserver 2001:db8::53\n"));
    }

    #[test]
    fn write_failure_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = ResolvFile::new(
            dir.path().join("missing").join("resolv.conf"),
            dir.path().join("also-missing").join("resolv.conf"),
        );

        let err = file.append(3, None, Some("192.0.2.9")).unwrap_err();
        assert!(matches!(err, ResolverError::Io(_)));
        assert_eq!(err.errno(), -libc::ENOENT);
        assert_eq!(file.entries().len(), 1);
    }
}
