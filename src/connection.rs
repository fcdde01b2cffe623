//! Access to the socket underlying a caller owned connection.

use crate::error::Error;
use std::{
    io,
    os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd},
};
use tracing::trace;

#[cfg(test)]
use mockall::automock;

/// An established Unix domain socket endpoint.
///
/// Descriptor transfers never use the connection directly. They work on a short lived
/// duplicate of its socket, which is closed again once the syscall returned.
#[cfg_attr(test, automock)]
pub trait Connection {
    /// Duplicate the underlying socket.
    fn duplicate_socket(&self) -> io::Result<OwnedFd>;
}

impl<T> Connection for T
where
    T: AsFd + ?Sized,
{
    fn duplicate_socket(&self) -> io::Result<OwnedFd> {
        self.as_fd().try_clone_to_owned()
    }
}

/// Scoped duplicate of a connection socket, closed on drop.
#[derive(Debug)]
pub(crate) struct SocketGuard(OwnedFd);

impl SocketGuard {
    pub(crate) fn acquire<C>(connection: &C) -> Result<Self, Error>
    where
        C: Connection + ?Sized,
    {
        let socket = connection.duplicate_socket().map_err(Error::Access)?;
        trace!("Acquired duplicate connection socket {}", socket.as_raw_fd());
        Ok(Self(socket))
    }
}

impl AsFd for SocketGuard {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        trace!("Releasing duplicate connection socket {}", self.0.as_raw_fd());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::{
        io::{ErrorKind, Read},
        os::unix::net::UnixStream,
    };

    #[test]
    fn guard_closes_duplicate_on_drop() -> Result<()> {
        let (a, mut b) = UnixStream::pair()?;
        b.set_nonblocking(true)?;

        let guard = SocketGuard::acquire(&a)?;
        assert_ne!(guard.as_fd().as_raw_fd(), a.as_raw_fd());
        drop(a);

        // The duplicate keeps the socket alive.
        let mut buf = [0; 1];
        let err = b.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);

        drop(guard);
        assert_eq!(b.read(&mut buf)?, 0);
        Ok(())
    }

    #[test]
    fn guard_reports_access_error() {
        let mut mock = MockConnection::new();
        mock.expect_duplicate_socket()
            .times(1)
            .returning(|| Err(io::Error::from_raw_os_error(libc::EBADF)));

        let res = SocketGuard::acquire(&mock);
        assert!(matches!(res, Err(Error::Access(_))));
    }
}
