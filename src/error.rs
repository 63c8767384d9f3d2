//! Error taxonomy shared by the client and the three server architectures.
//!
//! Errors are connection-local by design: a malformed frame or socket
//! failure tears down the owning connection and nothing else. Only the
//! client surfaces errors to a caller.

use std::fmt;
use std::io;

/// Errors produced by wire decoding, the client, and connection handling.
#[derive(Debug)]
pub enum Error {
    /// A TCP connection could not be established or maintained.
    /// Surfaced by [`Client::connect`](crate::client::Client::connect).
    Connection(io::Error),
    /// A frame's declared length cannot be satisfied by the bytes that
    /// actually arrived. Fatal to the owning connection, never reported
    /// to the peer.
    MalformedFrame(&'static str),
    /// Any other socket failure. Fatal to the owning connection.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "connection failed: {e}"),
            Error::MalformedFrame(what) => write!(f, "malformed frame: {what}"),
            Error::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) | Error::Io(e) => Some(e),
            Error::MalformedFrame(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
