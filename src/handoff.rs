//! The two ends of a descriptor handoff between processes.
//!
//! The sender listens on a socket and writes a manifest which announces how many descriptors
//! follow and how they are named. It then passes the descriptors and waits for a single
//! acknowledgement byte. The manifest is a little endian `u32` length followed by JSON.

use anyhow::{Context, Result, ensure};
use fd_handoff::NamedFd;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{ErrorKind, Read, Write},
    os::{
        fd::{AsFd, AsRawFd, RawFd},
        unix::{
            fs::FileTypeExt,
            net::{UnixListener, UnixStream},
        },
    },
    path::{Path, PathBuf},
};
use tracing::{debug, info, trace};

const ACK: u8 = 0x06;

const MAX_MANIFEST_LEN: usize = 64 * 1024;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
struct Manifest {
    count: usize,
    names: Vec<String>,
}

impl Manifest {
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let body = serde_json::to_vec(self).context("encode manifest")?;
        ensure!(body.len() <= MAX_MANIFEST_LEN, "manifest too large");
        writer.write_all(&(body.len() as u32).to_le_bytes())?;
        writer.write_all(&body).context("write manifest")
    }

    fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut len = [0; 4];
        reader
            .read_exact(&mut len)
            .context("read manifest length")?;
        let len = u32::from_le_bytes(len) as usize;
        ensure!(len <= MAX_MANIFEST_LEN, "manifest of {len} bytes is too large");

        let mut body = vec![0; len];
        reader.read_exact(&mut body).context("read manifest")?;
        serde_json::from_slice(&body).context("decode manifest")
    }
}

/// A JSON friendly description of a received descriptor.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Summary {
    name: String,
    fd: RawFd,
    kind: &'static str,
    size: u64,
}

impl Summary {
    fn describe(handle: &NamedFd) -> Result<Self> {
        let file = File::from(handle.as_fd().try_clone_to_owned()?);
        let metadata = file.metadata().context("stat received descriptor")?;
        let file_type = metadata.file_type();
        let kind = if file_type.is_file() {
            "file"
        } else if file_type.is_dir() {
            "directory"
        } else if file_type.is_fifo() {
            "fifo"
        } else if file_type.is_socket() {
            "socket"
        } else if file_type.is_char_device() {
            "character device"
        } else {
            "other"
        };

        Ok(Self {
            name: handle.name().clone(),
            fd: handle.as_raw_fd(),
            kind,
            size: metadata.len(),
        })
    }
}

/// Removes the socket path when the sender is done.
struct SocketPath<'a>(&'a Path);

impl Drop for SocketPath<'_> {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(self.0) {
            trace!("Unable to remove socket path {}: {}", self.0.display(), e)
        }
    }
}

/// Bind to `path` through `/proc/self/fd`, which lifts the length limit of socket addresses.
fn bind_long_path(path: &Path) -> Result<UnixListener> {
    let parent = path.parent().context(format!(
        "tried to specify / as socket to bind to: {}",
        path.display()
    ))?;
    let name = path.file_name().context(format!(
        "tried to specify '..' as socket to bind to: {}",
        path.display(),
    ))?;

    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => {
            return Err(e).context(format!("remove stale socket {}", path.display()));
        }
        _ => {}
    }

    let parent = File::open(if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    })?;
    let socket_path = PathBuf::from("/proc/self/fd")
        .join(parent.as_raw_fd().to_string())
        .join(name);

    UnixListener::bind(&socket_path).context("bind handoff socket")
}

/// Hand `files` to the first process connecting to `socket`.
pub fn send(socket: &Path, files: &[PathBuf], names: &[String]) -> Result<()> {
    let handles = files
        .iter()
        .map(|path| File::open(path).context(format!("open {}", path.display())))
        .collect::<Result<Vec<_>>>()?;
    let manifest = Manifest {
        count: handles.len(),
        names: files
            .iter()
            .enumerate()
            .map(|(i, path)| {
                names
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| path.display().to_string())
            })
            .collect(),
    };

    let listener = bind_long_path(socket)?;
    let _socket_path = SocketPath(socket);
    info!("Waiting for receiver on {}", socket.display());

    let (mut stream, _) = listener.accept().context("accept receiver")?;
    debug!("Got receiver connection: {:?}", stream);

    manifest.write_to(&mut stream)?;
    fd_handoff::put(&stream, &handles).context("put file descriptors")?;

    let mut ack = [0; 1];
    stream
        .read_exact(&mut ack)
        .context("wait for acknowledgement")?;
    ensure!(ack[0] == ACK, "unexpected acknowledgement {:#04x}", ack[0]);

    info!("Handed over {} file descriptors", handles.len());
    Ok(())
}

/// Receive the descriptors announced by the sender listening on `socket`.
pub fn receive(socket: &Path) -> Result<Vec<NamedFd>> {
    let mut stream = UnixStream::connect(socket)
        .context(format!("connect to {}", socket.display()))?;
    let manifest = Manifest::read_from(&mut stream)?;
    debug!(
        "Expecting {} file descriptors: {:?}",
        manifest.count, manifest.names
    );

    let names: Vec<&str> = manifest.names.iter().map(String::as_str).collect();
    let handles = fd_handoff::get(&stream, manifest.count, &names)
        .into_result()
        .context("get file descriptors")?;
    ensure!(
        handles.len() == manifest.count,
        "received {} file descriptors, but expected {}",
        handles.len(),
        manifest.count
    );

    stream.write_all(&[ACK]).context("acknowledge")?;
    info!("Received {} file descriptors", handles.len());
    Ok(handles)
}

/// Receive the descriptors and print a JSON summary of them to stdout.
pub fn recv(socket: &Path) -> Result<()> {
    let handles = receive(socket)?;
    let summaries = handles
        .iter()
        .map(Summary::describe)
        .collect::<Result<Vec<_>>>()?;

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &summaries).context("write summary")?;
    writeln!(stdout)?;
    Ok(())
}
