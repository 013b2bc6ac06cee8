//! Single round-trip transfers
//!
//! `TransferExecutor` is stateless per call: it builds the request, wires the
//! local endpoint to the transport and releases every local handle before it
//! returns, success or failure. Nothing here retries.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use thiserror::Error;

use crate::listing::{EntryKind, ListingFormat};
use crate::locator::Credential;
use crate::transport::{Command, Payload, Request, Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Download,
    Upload,
}

/// One streaming transfer; lives for exactly one round trip.
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    /// Absolute locator of the remote file.
    pub locator: &'a str,
    pub direction: Direction,
    /// Download destination or upload source.
    pub local: &'a Path,
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Network(#[from] TransportError),
    /// Local destination could not be created or written.
    #[error("local file '{}': {source}", .path.display())]
    LocalIo { path: PathBuf, source: io::Error },
    /// Upload source missing or unreadable; no network call was made.
    #[error("cannot open local file '{}': {source}", .path.display())]
    LocalSourceUnavailable { path: PathBuf, source: io::Error },
}

pub struct TransferExecutor<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    credential: Option<&'a Credential>,
    progress: Option<&'a ProgressBar>,
}

impl<'a, T: Transport + ?Sized> TransferExecutor<'a, T> {
    pub fn new(transport: &'a mut T, credential: Option<&'a Credential>) -> Self {
        Self {
            transport,
            credential,
            progress: None,
        }
    }

    /// Report streamed bytes to a progress bar.
    pub fn with_progress(mut self, progress: Option<&'a ProgressBar>) -> Self {
        self.progress = progress;
        self
    }

    fn request<'r>(&self, locator: &'r str, command: Command) -> Request<'r>
    where
        'a: 'r,
    {
        Request {
            locator,
            credential: self.credential,
            command,
        }
    }

    /// Run a download or upload; returns bytes transferred.
    ///
    /// A download opens its destination on the first received chunk. A round
    /// trip that fails before any data arrives therefore leaves no file behind,
    /// while one that fails later leaves the partial file in place.
    pub fn execute(&mut self, transfer: &TransferRequest<'_>) -> Result<u64, TransferError> {
        match transfer.direction {
            Direction::Download => self.download(transfer.locator, transfer.local),
            Direction::Upload => self.upload(transfer.locator, transfer.local),
        }
    }

    fn download(&mut self, locator: &str, dest: &Path) -> Result<u64, TransferError> {
        let request = self.request(locator, Command::Retrieve);
        let mut sink = LazyFileSink::new(dest);
        let result = {
            let mut counted = Counted::new(&mut sink, self.progress);
            self.transport.perform(&request, Payload::Sink(&mut counted))
        };
        let local_failure = sink.take_error();
        let flushed = sink.finish();
        match (result, local_failure) {
            (_, Some(source)) => Err(TransferError::LocalIo {
                path: dest.to_path_buf(),
                source,
            }),
            (Err(e), None) => Err(e.into()),
            (Ok(bytes), None) => {
                flushed.map_err(|source| TransferError::LocalIo {
                    path: dest.to_path_buf(),
                    source,
                })?;
                Ok(bytes)
            }
        }
    }

    fn upload(&mut self, locator: &str, source_path: &Path) -> Result<u64, TransferError> {
        let file = File::open(source_path)
            .and_then(|f| match f.metadata() {
                Ok(m) if m.is_dir() => Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "is a directory",
                )),
                Ok(m) => {
                    if let Some(pb) = self.progress {
                        pb.set_length(m.len());
                    }
                    Ok(f)
                }
                Err(e) => Err(e),
            })
            .map_err(|source| TransferError::LocalSourceUnavailable {
                path: source_path.to_path_buf(),
                source,
            })?;
        let request = self.request(locator, Command::Store);
        let mut reader = BufReader::new(file);
        let mut counted = Counted::new(&mut reader, self.progress);
        match self.transport.perform(&request, Payload::Source(&mut counted)) {
            Ok(bytes) => Ok(bytes),
            Err(TransportError::Io(source)) => Err(TransferError::LocalIo {
                path: source_path.to_path_buf(),
                source,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch a raw listing body into memory.
    pub fn fetch_listing(
        &mut self,
        locator: &str,
        format: ListingFormat,
    ) -> Result<Vec<u8>, TransferError> {
        let request = self.request(locator, Command::List(format));
        let mut body = Vec::new();
        self.transport.perform(&request, Payload::Sink(&mut body))?;
        Ok(body)
    }

    /// Create a directory; success is the protocol status alone.
    pub fn make_directory(&mut self, locator: &str) -> Result<(), TransferError> {
        self.administer(locator, Command::MakeDir)
    }

    /// Delete a file or directory, choosing the wire verb by `kind`.
    pub fn remove(&mut self, locator: &str, kind: EntryKind) -> Result<(), TransferError> {
        self.administer(locator, Command::Remove(kind))
    }

    fn administer(&mut self, locator: &str, command: Command) -> Result<(), TransferError> {
        debug_assert!(command.is_administrative());
        let request = self.request(locator, command);
        self.transport.perform(&request, Payload::None)?;
        Ok(())
    }
}

/// Download destination that is created when the first bytes arrive.
struct LazyFileSink<'p> {
    path: &'p Path,
    file: Option<BufWriter<File>>,
    error: Option<io::Error>,
}

impl<'p> LazyFileSink<'p> {
    fn new(path: &'p Path) -> Self {
        Self {
            path,
            file: None,
            error: None,
        }
    }

    fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    /// Flush and close. A sink that never saw data never created a file.
    fn finish(self) -> io::Result<()> {
        match self.file {
            Some(mut w) => w.flush(),
            None => Ok(()),
        }
    }

    fn record(&mut self, e: io::Error) -> io::Error {
        let copy = io::Error::new(e.kind(), e.to_string());
        self.error = Some(e);
        copy
    }
}

impl Write for LazyFileSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.file.is_none() {
            match File::create(self.path) {
                Ok(f) => self.file = Some(BufWriter::new(f)),
                Err(e) => return Err(self.record(e)),
            }
        }
        let result = match self.file.as_mut() {
            Some(w) => w.write(buf),
            None => Ok(0),
        };
        result.map_err(|e| self.record(e))
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

/// Byte counter feeding an optional progress bar.
struct Counted<'a, S> {
    inner: S,
    progress: Option<&'a ProgressBar>,
}

impl<'a, S> Counted<'a, S> {
    fn new(inner: S, progress: Option<&'a ProgressBar>) -> Self {
        Self { inner, progress }
    }

    fn tick(&self, n: usize) {
        if let Some(pb) = self.progress {
            pb.inc(n as u64);
        }
    }
}

impl<S: Write> Write for Counted<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.tick(n);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<S: Read> Read for Counted<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.tick(n);
        Ok(n)
    }
}
