//! ftpnav library
//!
//! Interactive FTP client core: remote locator tracking, listing parsing and
//! single round-trip transfers, plus the local filesystem commands that run
//! alongside them.

pub mod cli;
pub mod commands;
pub mod config;
pub mod format;
pub mod ftp;
pub mod journal;
pub mod listing;
pub mod local;
pub mod locator;
pub mod logger;
pub mod session;
pub mod transfer;
pub mod transport;

pub use ftp::FtpTransport;
pub use listing::{EntryKind, ListingEntry, ListingFormat};
pub use locator::{Credential, RemoteLocator};
pub use session::{RemoteSession, Report, SessionError, SharedSession};
pub use transfer::{Direction, TransferError};
pub use transport::{Transport, TransportError};
