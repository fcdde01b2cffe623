//! Pass open file descriptors between processes over Unix domain sockets.
//!
//! Descriptors travel as `SCM_RIGHTS` ancillary data, so the kernel hands the receiving process
//! new descriptors which refer to the same open files, pipes or connections. This allows a
//! process to give live resources to another one, for example to a freshly started copy of
//! itself, without closing and reopening them.
//!
//! ```no_run
//! use std::{fs::File, os::unix::net::UnixStream};
//!
//! # fn main() -> anyhow::Result<()> {
//! let (sender, receiver) = UnixStream::pair()?;
//! let file = File::open("/etc/hostname")?;
//!
//! fd_handoff::put(&sender, &[&file])?;
//! let handles = fd_handoff::get(&receiver, 1, &["hostname"]).into_result()?;
//! assert_eq!(handles[0].name(), "hostname");
//! # Ok(())
//! # }
//! ```
//!
//! Every call issues exactly one blocking syscall. Callers which use the same connection from
//! multiple threads have to serialize their calls.

pub use connection::Connection;
pub use error::{Error, ParseError};
pub use handle::NamedFd;
pub use receiver::{Received, get};
pub use sender::put;

pub mod cmsg;

mod connection;
mod error;
mod handle;
mod receiver;
mod sender;
mod sys;
