//! Receiving file descriptors from a connection.

use crate::{
    cmsg::{self, ControlBuffer},
    connection::{Connection, SocketGuard},
    error::{Error, ParseError},
    handle::NamedFd,
    sys,
};
use getset::Getters;
use std::os::fd::{AsFd, FromRawFd, OwnedFd};
use tracing::debug;

/// The descriptors received by [`get`], together with the first error encountered.
///
/// Handles decoded before a failure are still returned and have to be closed by the caller,
/// which happens automatically when they are dropped.
#[derive(Debug, Default, Getters)]
#[must_use = "received descriptors leak into the process unless they are used or dropped"]
pub struct Received {
    /// The received descriptors in transmission order.
    #[getset(get = "pub")]
    handles: Vec<NamedFd>,

    /// The first error encountered, if any.
    #[getset(get = "pub")]
    error: Option<Error>,
}

impl Received {
    fn failed(error: Error) -> Self {
        Self {
            handles: Vec::new(),
            error: Some(error),
        }
    }

    /// Whether all descriptors were received without error.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Split into the received handles and the error.
    pub fn into_parts(self) -> (Vec<NamedFd>, Option<Error>) {
        (self.handles, self.error)
    }

    /// Convert into a [`Result`], closing all partially received handles on error.
    pub fn into_result(self) -> Result<Vec<NamedFd>, Error> {
        match self.error {
            None => Ok(self.handles),
            Some(err) => Err(err),
        }
    }
}

/// Receive `count` file descriptors from `connection` with a single blocking `recvmsg`.
///
/// The i-th received descriptor is named after `names[i]`, or left unnamed if the list is
/// shorter. A `count` of zero returns immediately without touching the connection.
pub fn get<C>(connection: &C, count: usize, names: &[&str]) -> Received
where
    C: Connection + ?Sized,
{
    if count == 0 {
        return Received::default();
    }

    let Some(size) = cmsg::buffer_size_for(count) else {
        return Received::failed(Error::TooManyDescriptors { count });
    };

    let socket = match SocketGuard::acquire(connection) {
        Ok(socket) => socket,
        Err(err) => return Received::failed(err),
    };

    let mut control = ControlBuffer::zeroed(size);
    let outcome = match sys::recv_control(socket.as_fd(), &mut control) {
        Ok(outcome) => outcome,
        Err(err) => return Received::failed(err),
    };
    drop(socket);

    // Safety: rights messages received from the kernel carry descriptors freshly installed in
    // this process, nothing else owns them.
    let mut received = unsafe { materialize(control.as_bytes(), names) };
    if outcome.truncated && received.error.is_none() {
        received.error = Some(ParseError::Truncated.into());
    }

    debug!(
        "Received {} of {} expected file descriptors ({} filler and {} ancillary bytes)",
        received.handles.len(),
        count,
        outcome.bytes,
        control.len()
    );
    received
}

/// Decode `buf` and take ownership of every descriptor found in its rights messages.
///
/// # Safety
///
/// Every descriptor carried by a rights message in `buf` has to be open and not owned by
/// anything else.
unsafe fn materialize(buf: &[u8], names: &[&str]) -> Received {
    let mut received = Received::default();
    for message in cmsg::decode(buf) {
        let fds = match message.and_then(|message| message.rights()) {
            Ok(fds) => fds,
            Err(err) => {
                received.error = Some(err.into());
                break;
            }
        };
        for fd in fds {
            let name = names.get(received.handles.len()).copied().unwrap_or_default();
            // Safety: guaranteed by the caller.
            let fd = unsafe { OwnedFd::from_raw_fd(fd) };
            received.handles.push(NamedFd::new(fd, name));
        }
    }
    received
}
