//! Remote session: current locator + credential + transport
//!
//! Each verb resolves its target from the current locator, performs exactly
//! one round trip through `TransferExecutor`, and reports an explicit
//! outcome. The locator is only replaced after a resolution succeeds, so a
//! failed verb never changes session state.

use std::path::Path;
use std::sync::Arc;

use indicatif::ProgressBar;
use parking_lot::{Mutex, MutexGuard};
use thiserror::Error;

use crate::journal::{JournalEntry, TransferJournal};
use crate::listing::{self, EntryKind, ListingEntry, ListingFormat};
use crate::locator::{Credential, RemoteLocator};
use crate::logger::{Logger, NoopLogger};
use crate::transfer::{Direction, TransferError, TransferExecutor, TransferRequest};
use crate::transport::Transport;

/// Successful verb outcome with a human-readable detail line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report<T> {
    pub value: T,
    pub detail: String,
}

impl<T> Report<T> {
    fn new(value: T, detail: impl Into<String>) -> Self {
        Self {
            value,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not connected; use `connect <url> [user:password]` first")]
    NotConnected,
    /// The name is empty or ends in `/`, `.` or `..`, so it names no entry.
    #[error("'{0}' does not name a remote file or directory")]
    InvalidName(String),
    #[error("{action}: {source}")]
    Transfer {
        action: String,
        #[source]
        source: TransferError,
    },
}

pub type Outcome<T> = Result<Report<T>, SessionError>;

pub struct RemoteSession<T: Transport> {
    transport: T,
    locator: Option<RemoteLocator>,
    credential: Option<Credential>,
    format: ListingFormat,
    logger: Arc<dyn Logger>,
    journal: Option<TransferJournal>,
}

impl<T: Transport> RemoteSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            locator: None,
            credential: None,
            format: ListingFormat::default(),
            logger: Arc::new(NoopLogger),
            journal: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_journal(mut self, journal: Option<TransferJournal>) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_format(mut self, format: ListingFormat) -> Self {
        self.format = format;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Current locator for prompt display; empty before `connect`.
    pub fn current_locator(&self) -> &str {
        self.locator.as_ref().map(RemoteLocator::as_str).unwrap_or("")
    }

    pub fn locator(&self) -> Option<&RemoteLocator> {
        self.locator.as_ref()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    fn require_locator(&self) -> Result<&RemoteLocator, SessionError> {
        self.locator.as_ref().ok_or(SessionError::NotConnected)
    }

    /// Locator of `name` below the current directory, or below the root for
    /// a leading `/`.
    fn entry(&self, name: &str) -> Result<String, SessionError> {
        self.require_locator()?
            .join(name)
            .ok_or_else(|| SessionError::InvalidName(name.to_string()))
    }

    fn fail<V>(&self, action: String, target: &str, source: TransferError) -> Outcome<V> {
        self.logger.error(&action, target, &source.to_string());
        Err(SessionError::Transfer { action, source })
    }

    /// Set base locator and credential. Local only; the server is first
    /// contacted by the next verb that needs it.
    pub fn connect(&mut self, url: &str, userpass: &str) -> Report<()> {
        let locator = RemoteLocator::new(url);
        self.credential = Credential::parse(userpass);
        self.transport.disconnect();
        self.logger.connect(
            locator.as_str(),
            self.credential.as_ref().map(|c| c.user.as_str()),
        );
        let detail = format!("Base URL set to {}", locator);
        self.locator = Some(locator);
        Report::new((), detail)
    }

    /// Fetch and parse the listing of the current directory, in server order.
    pub fn list(&mut self) -> Outcome<Vec<ListingEntry>> {
        let target = self.require_locator()?.as_str().to_string();
        let verb = crate::transport::Command::List(self.format).verb();
        self.logger.round_trip(verb, &target);
        let result = TransferExecutor::new(&mut self.transport, self.credential.as_ref())
            .fetch_listing(&target, self.format);
        let body = match result {
            Ok(body) => body,
            Err(e) => return self.fail(format!("Failed to list {}", target), &target, e),
        };
        let text = String::from_utf8_lossy(&body);
        let mut entries = Vec::new();
        for line in listing::records(&text) {
            let entry = match self.format.try_parse(line) {
                Some(entry) => entry,
                None => {
                    self.logger.parse_anomaly(line);
                    ListingEntry::unparsed(line)
                }
            };
            if self.format == ListingFormat::Mlsd && listing::is_self_or_parent(&entry) {
                continue;
            }
            entries.push(entry);
        }
        let detail = format!("{} entries in {}", entries.len(), target);
        Ok(Report::new(entries, detail))
    }

    /// Move the current locator. Does not check the directory exists; a bad
    /// name surfaces on the next verb that talks to the server.
    pub fn change_directory(&mut self, name: &str) -> Outcome<RemoteLocator> {
        let next = self.require_locator()?.resolve(name);
        self.locator = Some(next.clone());
        let detail = format!("Remote directory is now {}", next);
        Ok(Report::new(next, detail))
    }

    pub fn make_directory(&mut self, name: &str) -> Outcome<()> {
        let target = self.entry(name)?;
        self.logger.round_trip("MKD", &target);
        let result = TransferExecutor::new(&mut self.transport, self.credential.as_ref())
            .make_directory(&target);
        match result {
            Ok(()) => Ok(Report::new((), format!("Remote directory '{}' created", name))),
            Err(e) => {
                let action = format!("Failed to create remote directory '{}'", name);
                self.fail(action, &target, e)
            }
        }
    }

    pub fn delete_entry(&mut self, name: &str, kind: EntryKind) -> Outcome<()> {
        let target = self.entry(name)?;
        let noun = match kind {
            EntryKind::Directory => "directory",
            EntryKind::File => "file",
        };
        self.logger
            .round_trip(crate::transport::Command::Remove(kind).verb(), &target);
        let result = TransferExecutor::new(&mut self.transport, self.credential.as_ref())
            .remove(&target, kind);
        match result {
            Ok(()) => Ok(Report::new((), format!("Remote {} '{}' deleted", noun, name))),
            Err(e) => {
                let action = format!("Failed to delete remote {} '{}'", noun, name);
                self.fail(action, &target, e)
            }
        }
    }

    pub fn download(&mut self, remote: &str, local: &Path) -> Outcome<u64> {
        self.download_with(remote, local, None)
    }

    pub fn download_with(
        &mut self,
        remote: &str,
        local: &Path,
        progress: Option<&ProgressBar>,
    ) -> Outcome<u64> {
        self.stream(Direction::Download, remote, local, progress)
    }

    pub fn upload(&mut self, local: &Path, remote: &str) -> Outcome<u64> {
        self.upload_with(local, remote, None)
    }

    pub fn upload_with(
        &mut self,
        local: &Path,
        remote: &str,
        progress: Option<&ProgressBar>,
    ) -> Outcome<u64> {
        self.stream(Direction::Upload, remote, local, progress)
    }

    fn stream(
        &mut self,
        direction: Direction,
        remote: &str,
        local: &Path,
        progress: Option<&ProgressBar>,
    ) -> Outcome<u64> {
        let target = self.entry(remote)?;
        let verb = match direction {
            Direction::Download => "RETR",
            Direction::Upload => "STOR",
        };
        self.logger.round_trip(verb, &target);
        let result = TransferExecutor::new(&mut self.transport, self.credential.as_ref())
            .with_progress(progress)
            .execute(&TransferRequest {
                locator: &target,
                direction,
                local,
            });

        let entry = JournalEntry::new(direction, &target, local);
        match result {
            Ok(bytes) => {
                self.record(entry.completed(bytes));
                self.logger.transfer_done(verb, &target, local, bytes);
                let detail = match direction {
                    Direction::Download => format!(
                        "File '{}' downloaded to '{}' ({} bytes)",
                        remote,
                        local.display(),
                        bytes
                    ),
                    Direction::Upload => format!(
                        "File '{}' uploaded as '{}' ({} bytes)",
                        local.display(),
                        remote,
                        bytes
                    ),
                };
                Ok(Report::new(bytes, detail))
            }
            Err(e) => {
                self.record(entry.failed(&e.to_string()));
                let action = match direction {
                    Direction::Download => format!("Download of '{}' failed", remote),
                    Direction::Upload => format!("Upload of '{}' failed", local.display()),
                };
                self.fail(action, &target, e)
            }
        }
    }

    fn record(&self, entry: JournalEntry) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.add_entry(&entry) {
                self.logger
                    .error("journal", &entry.remote, &format!("{:#}", e));
            }
        }
    }
}

/// Session shared between callers. Each verb holds the lock for its whole
/// round trip, so at most one operation is in flight per session.
pub struct SharedSession<T: Transport> {
    inner: Arc<Mutex<RemoteSession<T>>>,
}

impl<T: Transport> Clone for SharedSession<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> SharedSession<T> {
    pub fn new(session: RemoteSession<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Run one or more verbs under the session lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut RemoteSession<T>) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    pub fn lock(&self) -> MutexGuard<'_, RemoteSession<T>> {
        self.inner.lock()
    }

    pub fn current_locator(&self) -> String {
        self.inner.lock().current_locator().to_string()
    }
}
