//! Connection-handle abstraction
//!
//! Every round trip is described by an immutable `Request` built fresh for
//! that call. A transport never carries a verb, sink or source over from one
//! call to the next.

use std::io::{Read, Write};

use thiserror::Error;

use crate::listing::{EntryKind, ListingFormat};
use crate::locator::Credential;

/// Protocol verb for one round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Directory listing; the body goes to the sink.
    List(ListingFormat),
    /// Plain retrieval; the body goes to the sink.
    Retrieve,
    /// Plain store; the body comes from the source.
    Store,
    /// Administrative: create a directory.
    MakeDir,
    /// Administrative: delete by entry kind (directory vs file delete).
    Remove(EntryKind),
}

impl Command {
    /// Wire verb sent to an FTP server.
    pub fn verb(self) -> &'static str {
        match self {
            Command::List(ListingFormat::Unix) => "LIST",
            Command::List(ListingFormat::Mlsd) => "MLSD",
            Command::Retrieve => "RETR",
            Command::Store => "STOR",
            Command::MakeDir => "MKD",
            Command::Remove(EntryKind::Directory) => "RMD",
            Command::Remove(EntryKind::File) => "DELE",
        }
    }

    pub fn is_administrative(self) -> bool {
        matches!(self, Command::MakeDir | Command::Remove(_))
    }
}

/// Per-call options. Borrowed, never stored by the transport.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    /// Absolute locator of the target (directory locators end in `/`).
    pub locator: &'a str,
    pub credential: Option<&'a Credential>,
    pub command: Command,
}

/// Local endpoint of a round trip.
pub enum Payload<'a> {
    /// Administrative commands carry no body.
    None,
    /// Write side: response body is streamed here.
    Sink(&'a mut dyn Write),
    /// Read side: request body is streamed from here until exhaustion.
    Source(&'a mut dyn Read),
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// DNS, refused, reset, malformed URL or any other failure to talk to the server.
    #[error("connection failed: {0}")]
    Connection(String),
    /// Credential rejected at login.
    #[error("login rejected: {0}")]
    Auth(String),
    /// Server answered with a non-success status.
    #[error("server replied {code}: {message}")]
    Protocol { code: u16, message: String },
    /// The local sink or source failed mid-stream.
    #[error("local stream error: {0}")]
    Io(#[source] std::io::Error),
}

/// One blocking request/response exchange with the remote server.
pub trait Transport {
    /// Perform `request`, streaming through `payload`. Returns bytes moved
    /// through the payload (0 for administrative commands).
    fn perform(
        &mut self,
        request: &Request<'_>,
        payload: Payload<'_>,
    ) -> Result<u64, TransportError>;

    /// Drop any cached connection; the next round trip starts fresh.
    fn disconnect(&mut self) {}
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn perform(
        &mut self,
        request: &Request<'_>,
        payload: Payload<'_>,
    ) -> Result<u64, TransportError> {
        (**self).perform(request, payload)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn perform(
        &mut self,
        request: &Request<'_>,
        payload: Payload<'_>,
    ) -> Result<u64, TransportError> {
        (**self).perform(request, payload)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }
}
