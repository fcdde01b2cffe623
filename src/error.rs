//! Error types returned by descriptor transfers.

use nix::errno::Errno;
use std::io;
use thiserror::Error;

/// Errors that can occur when passing file descriptors over a connection.
#[derive(Debug, Error)]
pub enum Error {
    /// The socket of the connection could not be duplicated.
    #[error("access connection socket: {0}")]
    Access(#[source] io::Error),

    /// No single ancillary buffer can carry the requested number of descriptors.
    #[error("ancillary buffer for {count} file descriptors exceeds the platform limit")]
    TooManyDescriptors { count: usize },

    /// A socket syscall failed.
    #[error("{op}: {source}")]
    Syscall {
        /// The name of the failed syscall.
        op: &'static str,

        /// The OS level error code.
        #[source]
        source: Errno,
    },

    /// The received ancillary data could not be decoded.
    #[error("parse control message: {0}")]
    Parse(#[from] ParseError),
}

impl Error {
    pub(crate) fn syscall(op: &'static str) -> impl FnOnce(Errno) -> Self {
        move |source| Self::Syscall { op, source }
    }
}

/// Malformed ancillary data.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum ParseError {
    /// A control message header announces a length which does not fit the buffer.
    #[error("invalid control message length {len} with {remaining} bytes remaining")]
    HeaderLength { len: usize, remaining: usize },

    /// A rights message payload is not a whole number of descriptors.
    #[error("rights payload of {len} bytes is not a multiple of the descriptor size")]
    RightsLength { len: usize },

    /// The kernel discarded ancillary data which did not fit into the receive buffer.
    #[error("control data truncated")]
    Truncated,
}
