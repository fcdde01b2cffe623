//! Owned descriptors handed over by a peer process.

use getset::Getters;
use std::{
    fs::File,
    os::fd::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, OwnedFd, RawFd},
};

/// A received file descriptor together with its display name.
///
/// The descriptor is closed when the value is dropped, unless it has been converted into another
/// owning type first.
#[derive(Debug, Getters)]
pub struct NamedFd {
    /// The name assigned by the receiver, empty if none was given.
    #[getset(get = "pub")]
    name: String,

    fd: OwnedFd,
}

impl NamedFd {
    /// Create a new named descriptor.
    pub fn new(fd: OwnedFd, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fd,
        }
    }

    /// Release the name and keep the descriptor.
    pub fn into_owned_fd(self) -> OwnedFd {
        self.fd
    }

    /// Convert into a [`File`], for example to read from a received pipe.
    pub fn into_file(self) -> File {
        self.fd.into()
    }
}

impl AsFd for NamedFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for NamedFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl IntoRawFd for NamedFd {
    fn into_raw_fd(self) -> RawFd {
        self.fd.into_raw_fd()
    }
}

impl From<NamedFd> for OwnedFd {
    fn from(named: NamedFd) -> Self {
        named.into_owned_fd()
    }
}

impl From<NamedFd> for File {
    fn from(named: NamedFd) -> Self {
        named.into_file()
    }
}
