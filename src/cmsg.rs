//! Socket control message codec.
//!
//! Only `SOL_SOCKET`/`SCM_RIGHTS` messages are produced. Any message type can be decoded, but
//! descriptors are only extracted from rights messages. Sizes follow the platform's
//! `CMSG_LEN`/`CMSG_SPACE` rules and the native width of a [`RawFd`].

use crate::error::ParseError;
use getset::CopyGetters;
use libc::{c_int, c_void, cmsghdr};
use std::{iter::FusedIterator, mem, os::fd::RawFd, ptr, slice};

const FD_SIZE: usize = mem::size_of::<RawFd>();

const _: () = assert!(mem::align_of::<cmsghdr>() <= mem::align_of::<u64>());

/// Offset of the payload from the start of a control message (`CMSG_LEN(0)`).
#[allow(unused_unsafe)]
fn data_offset() -> usize {
    unsafe { libc::CMSG_LEN(0) as usize }
}

/// The platform alignment unit of control messages.
#[allow(unused_unsafe)]
fn align_unit() -> usize {
    let spaced = unsafe { libc::CMSG_SPACE(1) as usize };
    spaced - data_offset()
}

/// The largest ancillary buffer a single message header can describe.
fn max_buffer_size() -> usize {
    (libc::socklen_t::MAX as u64).min(isize::MAX as u64) as usize
}

fn align(len: usize) -> usize {
    let unit = align_unit();
    (len + unit - 1) & !(unit - 1)
}

/// The value of the `cmsg_len` header field for a payload of `len` bytes.
fn message_len(len: usize) -> usize {
    data_offset() + len
}

/// The buffer space occupied by a control message with a payload of `len` bytes, including
/// trailing padding.
pub fn space(len: usize) -> usize {
    data_offset() + align(len)
}

/// The size of an ancillary buffer able to hold one rights message carrying `n` descriptors.
///
/// Returns `None` if such a buffer does not fit into a single message header.
pub fn buffer_size_for(n: usize) -> Option<usize> {
    let unit = align_unit();
    let data = n.checked_mul(FD_SIZE)?;
    let padded = data.checked_add(unit - 1)? & !(unit - 1);
    let size = padded.checked_add(data_offset())?;
    (size <= max_buffer_size()).then_some(size)
}

/// Ancillary data storage, aligned for `cmsghdr`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ControlBuffer {
    storage: Vec<u64>,
    len: usize,
}

impl ControlBuffer {
    /// Create a zero filled buffer of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self {
            storage: vec![0; len.div_ceil(mem::size_of::<u64>())],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn capacity(&self) -> usize {
        self.storage.len() * mem::size_of::<u64>()
    }

    pub fn as_bytes(&self) -> &[u8] {
        // Safety: the storage is initialized and holds at least `len` bytes.
        unsafe { slice::from_raw_parts(self.storage.as_ptr().cast(), self.len) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // Safety: the storage is initialized and holds at least `len` bytes.
        unsafe { slice::from_raw_parts_mut(self.storage.as_mut_ptr().cast(), self.len) }
    }

    pub(crate) fn as_ptr(&self) -> *const c_void {
        self.storage.as_ptr().cast()
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut c_void {
        self.storage.as_mut_ptr().cast()
    }

    /// Shrink the visible length to what the kernel reported as filled in.
    pub(crate) fn set_len(&mut self, len: usize) {
        self.len = len.min(self.capacity());
    }
}

/// Write a single control message to the start of `out`, returning the number of bytes
/// occupied including padding.
///
/// Panics if `out` is smaller than [`space`] of the payload.
pub(crate) fn write_message(out: &mut [u8], level: c_int, kind: c_int, data: &[u8]) -> usize {
    let used = space(data.len());
    let out = &mut out[..used];

    // Safety: cmsghdr is plain old data, every field is overwritten or valid as zero.
    let mut header: cmsghdr = unsafe { mem::zeroed() };
    header.cmsg_len = message_len(data.len()) as _;
    header.cmsg_level = level;
    header.cmsg_type = kind;

    // Safety: `out` spans at least `data_offset()` bytes, which is never less than the size of
    // the header, and the write does not require alignment.
    unsafe { ptr::write_unaligned(out.as_mut_ptr().cast::<cmsghdr>(), header) };

    let offset = data_offset();
    out[offset..offset + data.len()].copy_from_slice(data);
    used
}

/// Encode `fds` into one `SCM_RIGHTS` control message, preserving their order.
pub fn encode(fds: &[RawFd]) -> ControlBuffer {
    let data: Vec<u8> = fds.iter().flat_map(|fd| fd.to_ne_bytes()).collect();
    let mut buffer = ControlBuffer::zeroed(space(data.len()));
    write_message(
        buffer.as_bytes_mut(),
        libc::SOL_SOCKET,
        libc::SCM_RIGHTS,
        &data,
    );
    buffer
}

/// Decode a received ancillary buffer into its control messages.
pub fn decode(buf: &[u8]) -> ControlMessages<'_> {
    ControlMessages { remaining: buf }
}

/// A single decoded control message, borrowing its payload from the receive buffer.
#[derive(Clone, Copy, CopyGetters, Debug, Eq, PartialEq)]
#[getset(get_copy = "pub")]
pub struct ControlMessage<'a> {
    /// The originating protocol, `cmsg_level`.
    level: c_int,

    /// The protocol specific type, `cmsg_type`.
    kind: c_int,

    /// The payload without header and trailing padding.
    data: &'a [u8],
}

impl ControlMessage<'_> {
    /// Whether the message carries descriptor rights.
    pub fn is_rights(&self) -> bool {
        self.level == libc::SOL_SOCKET && self.kind == libc::SCM_RIGHTS
    }

    /// Extract the descriptors carried by a rights message, in order.
    ///
    /// Messages of any other type carry no descriptors and yield an empty list.
    pub fn rights(&self) -> Result<Vec<RawFd>, ParseError> {
        if !self.is_rights() {
            return Ok(Vec::new());
        }
        if self.data.len() % FD_SIZE != 0 {
            return Err(ParseError::RightsLength {
                len: self.data.len(),
            });
        }
        Ok(self
            .data
            .chunks_exact(FD_SIZE)
            .map(|chunk| {
                let mut raw = [0; FD_SIZE];
                raw.copy_from_slice(chunk);
                RawFd::from_ne_bytes(raw)
            })
            .collect())
    }
}

/// Iterator over the control messages of an ancillary buffer.
///
/// Stops after the first malformed header, which is yielded as an error.
#[derive(Clone, Debug)]
pub struct ControlMessages<'a> {
    remaining: &'a [u8],
}

impl<'a> Iterator for ControlMessages<'a> {
    type Item = Result<ControlMessage<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = data_offset();
        if self.remaining.len() < offset {
            return None;
        }

        // Safety: at least `data_offset()` bytes remain, which covers the header. The read
        // does not require alignment.
        let header = unsafe { ptr::read_unaligned(self.remaining.as_ptr().cast::<cmsghdr>()) };
        let len = header.cmsg_len as usize;
        if len < offset || len > self.remaining.len() {
            let remaining = self.remaining.len();
            self.remaining = &[];
            return Some(Err(ParseError::HeaderLength { len, remaining }));
        }

        let message = ControlMessage {
            level: header.cmsg_level,
            kind: header.cmsg_type,
            data: &self.remaining[offset..len],
        };
        let next = align(len).min(self.remaining.len());
        self.remaining = &self.remaining[next..];
        Some(Ok(message))
    }
}

impl FusedIterator for ControlMessages<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};
    use libc::c_uint;

    #[allow(unused_unsafe)]
    fn libc_space(len: usize) -> usize {
        unsafe { libc::CMSG_SPACE(len as c_uint) as usize }
    }

    #[test]
    fn buffer_size_matches_libc() {
        for n in [0, 1, 2, 3, 7, 64, 253] {
            assert_eq!(
                buffer_size_for(n),
                Some(libc_space(n * mem::size_of::<RawFd>()))
            );
        }
    }

    #[test]
    fn buffer_size_is_aligned_and_fits_descriptors() -> Result<()> {
        for n in 1..10 {
            let size = buffer_size_for(n).context("buffer size")?;
            assert_eq!(size % align_unit(), 0);
            assert!(size >= data_offset() + n * mem::size_of::<RawFd>());
        }
        Ok(())
    }

    #[test]
    fn buffer_size_rejects_oversized_counts() {
        for n in [
            usize::MAX,
            usize::MAX / 2,
            usize::MAX / FD_SIZE,
            max_buffer_size() / FD_SIZE + 1,
        ] {
            assert_eq!(buffer_size_for(n), None, "count {n}");
        }
    }

    #[test]
    fn encode_single_rights_message() -> Result<()> {
        let buffer = encode(&[3, 4, 5]);
        assert_eq!(Some(buffer.len()), buffer_size_for(3));

        let messages = decode(buffer.as_bytes()).collect::<Result<Vec<_>, _>>()?;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_rights());
        assert_eq!(messages[0].data().len(), 3 * mem::size_of::<RawFd>());
        assert_eq!(messages[0].rights()?, vec![3, 4, 5]);
        Ok(())
    }

    #[test]
    fn decode_skips_foreign_message_types() -> Result<()> {
        let rights: Vec<u8> = [7, 8].iter().flat_map(|fd: &RawFd| fd.to_ne_bytes()).collect();
        let mut buf = vec![0; space(3) + space(rights.len())];
        let used = write_message(&mut buf, libc::SOL_SOCKET, 0x4242, &[1, 2, 3]);
        write_message(&mut buf[used..], libc::SOL_SOCKET, libc::SCM_RIGHTS, &rights);

        let messages = decode(&buf).collect::<Result<Vec<_>, _>>()?;
        assert_eq!(messages.len(), 2);
        assert!(!messages[0].is_rights());
        assert_eq!(messages[0].kind(), 0x4242);
        assert_eq!(messages[0].data(), &[1, 2, 3]);
        assert!(messages[0].rights()?.is_empty());
        assert_eq!(messages[1].rights()?, vec![7, 8]);
        Ok(())
    }

    #[test]
    fn decode_empty_buffer() {
        assert!(decode(&[]).next().is_none());
    }

    #[test]
    fn decode_ignores_short_trailing_bytes() -> Result<()> {
        let mut buf = encode(&[9]).as_bytes().to_vec();
        buf.extend_from_slice(&[0; 3]);

        let messages = decode(&buf).collect::<Result<Vec<_>, _>>()?;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].rights()?, vec![9]);
        Ok(())
    }

    #[test]
    fn decode_rejects_length_beyond_buffer() {
        let buffer = encode(&[1]);
        let cut = message_len(mem::size_of::<RawFd>()) - 1;

        let mut messages = decode(&buffer.as_bytes()[..cut]);
        assert_eq!(
            messages.next(),
            Some(Err(ParseError::HeaderLength {
                len: cut + 1,
                remaining: cut,
            }))
        );
        assert!(messages.next().is_none());
    }

    #[test]
    fn decode_rejects_length_below_header() {
        let buf = vec![0; data_offset()];
        assert_eq!(
            decode(&buf).next(),
            Some(Err(ParseError::HeaderLength {
                len: 0,
                remaining: data_offset(),
            }))
        );
    }

    #[test]
    fn rights_rejects_partial_descriptor() -> Result<()> {
        let data = vec![0; mem::size_of::<RawFd>() + 1];
        let mut buf = vec![0; space(data.len())];
        write_message(&mut buf, libc::SOL_SOCKET, libc::SCM_RIGHTS, &data);

        let messages = decode(&buf).collect::<Result<Vec<_>, _>>()?;
        assert_eq!(
            messages[0].rights(),
            Err(ParseError::RightsLength { len: data.len() })
        );
        Ok(())
    }
}
