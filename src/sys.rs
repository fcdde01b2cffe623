//! Raw `sendmsg`/`recvmsg` calls carrying nothing but ancillary data.

use crate::{cmsg::ControlBuffer, error::Error};
use nix::{
    errno::Errno,
    sys::socket::{SockType, getsockopt, sockopt},
};
use std::{
    mem,
    os::fd::{AsRawFd, BorrowedFd},
    ptr,
};

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = 0;

#[cfg(any(target_os = "linux", target_os = "android"))]
const RECV_FLAGS: libc::c_int = libc::MSG_CMSG_CLOEXEC;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const RECV_FLAGS: libc::c_int = 0;

/// Outcome of a successful `recvmsg`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct RecvOutcome {
    /// Regular bytes read, the filler byte on stream sockets.
    pub bytes: usize,

    /// The kernel set `MSG_CTRUNC`.
    pub truncated: bool,
}

/// Stream and seqpacket sockets drop messages without payload, so ancillary data has to ride
/// on a single filler byte there.
fn filler_len(socket: BorrowedFd<'_>) -> Result<usize, Error> {
    match getsockopt(&socket, sockopt::SockType).map_err(Error::syscall("getsockopt"))? {
        SockType::Datagram => Ok(0),
        _ => Ok(1),
    }
}

fn msghdr_for(
    op: &'static str,
    iov: &mut libc::iovec,
    control: *mut libc::c_void,
    len: usize,
) -> Result<libc::msghdr, Error> {
    // Safety: msghdr is plain old data and all-zero is a valid empty header.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_name = ptr::null_mut();
    msg.msg_namelen = 0;
    msg.msg_iov = iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control;
    msg.msg_controllen = len
        .try_into()
        .map_err(|_| Error::syscall(op)(Errno::EINVAL))?;
    Ok(msg)
}

/// Send `control` as the only ancillary data of one message.
pub(crate) fn send_control(
    socket: BorrowedFd<'_>,
    control: &ControlBuffer,
) -> Result<usize, Error> {
    let filler = filler_len(socket)?;
    let mut byte = [0u8; 1];
    let mut iov = libc::iovec {
        iov_base: byte.as_mut_ptr().cast(),
        iov_len: filler,
    };
    // The kernel only reads from the control buffer on send.
    let msg = msghdr_for("sendmsg", &mut iov, control.as_ptr().cast_mut(), control.len())?;

    // Safety: every pointer in `msg` refers to memory which outlives the call.
    let sent = unsafe { libc::sendmsg(socket.as_raw_fd(), &msg, SEND_FLAGS) };
    let sent = Errno::result(sent).map_err(Error::syscall("sendmsg"))?;
    Ok(sent as usize)
}

/// Receive one message into `control`, which is shrunk to the ancillary bytes received.
pub(crate) fn recv_control(
    socket: BorrowedFd<'_>,
    control: &mut ControlBuffer,
) -> Result<RecvOutcome, Error> {
    let filler = filler_len(socket)?;
    let mut byte = [0u8; 1];
    let mut iov = libc::iovec {
        iov_base: byte.as_mut_ptr().cast(),
        iov_len: filler,
    };
    let capacity = control.len();
    let mut msg = msghdr_for("recvmsg", &mut iov, control.as_mut_ptr(), capacity)?;

    // Safety: every pointer in `msg` refers to memory which outlives the call and the control
    // buffer is writable for `capacity` bytes.
    let received = unsafe { libc::recvmsg(socket.as_raw_fd(), &mut msg, RECV_FLAGS) };
    let bytes = Errno::result(received).map_err(Error::syscall("recvmsg"))? as usize;

    control.set_len(msg.msg_controllen as usize);
    Ok(RecvOutcome {
        bytes,
        truncated: msg.msg_flags & libc::MSG_CTRUNC != 0,
    })
}
