//! Sending file descriptors over a connection.

use crate::{
    cmsg,
    connection::{Connection, SocketGuard},
    error::Error,
    sys,
};
use std::os::fd::{AsFd, AsRawFd, RawFd};
use tracing::debug;

/// Send `handles` to the peer of `connection` in one `SCM_RIGHTS` message.
///
/// The handles stay owned by the caller and remain open. The peer receives new descriptors
/// referring to the same open files, in the same order. Sending no handles returns immediately
/// without touching the connection.
///
/// The kernel limits the number of descriptors per message (253 on Linux), so keep batches
/// small.
pub fn put<C, F>(connection: &C, handles: &[F]) -> Result<(), Error>
where
    C: Connection + ?Sized,
    F: AsFd,
{
    if handles.is_empty() {
        return Ok(());
    }

    if cmsg::buffer_size_for(handles.len()).is_none() {
        return Err(Error::TooManyDescriptors {
            count: handles.len(),
        });
    }

    let socket = SocketGuard::acquire(connection)?;
    let fds: Vec<RawFd> = handles.iter().map(|h| h.as_fd().as_raw_fd()).collect();
    let control = cmsg::encode(&fds);

    let sent = sys::send_control(socket.as_fd(), &control)?;
    debug!(
        "Sent {} file descriptors ({} filler and {} ancillary bytes)",
        fds.len(),
        sent,
        control.len()
    );
    Ok(())
}
