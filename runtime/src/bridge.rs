//! Descriptor bridge.
//!
//! Converts live host sockets into guest descriptors: the socket is wrapped
//! as an engine file object and registered with the store's WASI context,
//! while a ground-truth clone is retained in the descriptor table. The
//! guest's close of a descriptor is advisory — table entries survive until
//! session teardown, which also keeps the backing object reachable for the
//! engine's resource tracker.

use std::collections::HashMap;

use tracing::{debug, warn};
use wasi_common::file::FileAccessMode;
use wasi_common::pipe::ReadPipe;
use wasi_common::sync::net::Socket;
use wasi_common::{WasiCtx, WasiFile};
use water_abi::Errno;

use crate::bundle::Bundle;
use crate::conn::SocketConn;
use crate::host::{write_lock, SessionShared};

/// What a descriptor was registered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorKind {
    /// The caller-facing endpoint handed to a role entry.
    Caller,
    /// A network-facing endpoint obtained through `host_dial`/`host_accept`.
    Network,
    /// The guest half of the cancel channel.
    Cancel,
}

/// One registered descriptor.
#[derive(Debug)]
pub struct DescriptorEntry {
    /// Ground-truth connection; stays open until teardown regardless of
    /// guest-side closes.
    pub conn: SocketConn,
    pub kind: DescriptorKind,
    /// Present when the connection is spliced through a halt-workaround
    /// bundle.
    pub bundle: Option<Bundle>,
}

/// Guest descriptor id -> entry. Negative ids encode errors and never
/// appear as keys.
#[derive(Debug, Default)]
pub struct DescriptorTable {
    entries: HashMap<i32, DescriptorEntry>,
}

impl DescriptorTable {
    pub fn insert(&mut self, fd: i32, entry: DescriptorEntry) {
        debug_assert!(fd >= 0);
        self.entries.insert(fd, entry);
    }

    /// O(1) lookup of the ground truth behind a guest descriptor.
    pub fn lookup(&self, fd: i32) -> Option<&DescriptorEntry> {
        self.entries.get(&fd)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return every entry, leaving the table empty.
    pub fn drain(&mut self) -> Vec<DescriptorEntry> {
        self.entries.drain().map(|(_, e)| e).collect()
    }
}

/// Wrap a socket as an engine file object.
fn into_wasi_file(conn: SocketConn) -> Box<dyn WasiFile> {
    match conn {
        SocketConn::Tcp(s) => Socket::from(cap_std::net::TcpStream::from_std(s)).into(),
        SocketConn::Unix(s) => {
            Socket::from(cap_std::os::unix::net::UnixStream::from_std(s)).into()
        }
    }
}

/// Dummy-first-file workaround: the first registration of a session pushes a
/// throwaway read-only file to absorb a known premature-collection bug.
fn ensure_first_file(wasi: &mut WasiCtx, shared: &SessionShared) {
    use std::sync::atomic::Ordering;
    if !shared.workarounds.gc_bug {
        return;
    }
    if shared.first_file_pushed.swap(true, Ordering::SeqCst) {
        return;
    }
    let sink: Box<dyn WasiFile> = Box::new(ReadPipe::from(Vec::new()));
    match wasi.push_file(sink, FileAccessMode::READ) {
        Ok(fd) => debug!(fd, "registered dummy first file"),
        Err(e) => warn!("dummy first file registration failed: {e}"),
    }
}

/// Register a connection with the guest's fd namespace.
///
/// Disables Nagle on TCP, retains a ground-truth clone in the descriptor
/// table, and — when the halt workaround is active — splices TCP through a
/// bundle so the guest-visible side closes on network EOF. Failures release
/// everything acquired so far and surface as an errno for the guest.
pub fn register_conn(
    wasi: &mut WasiCtx,
    shared: &SessionShared,
    conn: SocketConn,
    kind: DescriptorKind,
) -> Result<i32, Errno> {
    ensure_first_file(wasi, shared);

    conn.set_nodelay().map_err(|e| Errno::from_io_error(&e))?;
    let ground = conn.try_clone().map_err(|e| Errno::from_io_error(&e))?;

    let (guest_conn, bundle) =
        if shared.workarounds.conn_halt && conn.is_tcp() && kind != DescriptorKind::Cancel {
            let (guest_half, bundle) =
                Bundle::splice(conn).map_err(|e| Errno::from_io_error(&e))?;
            (SocketConn::Unix(guest_half), Some(bundle))
        } else {
            (conn, None)
        };

    let file = into_wasi_file(guest_conn);
    let fd = wasi
        .push_file(file, FileAccessMode::READ | FileAccessMode::WRITE)
        .map_err(|_| Errno::Nfile)? as i32;

    write_lock(&shared.table).insert(
        fd,
        DescriptorEntry {
            conn: ground,
            kind,
            bundle,
        },
    );
    debug!(fd, ?kind, "registered descriptor");
    Ok(fd)
}

/// Register the config blob as a read-only descriptor.
pub fn register_config_blob(
    wasi: &mut WasiCtx,
    shared: &SessionShared,
    blob: Vec<u8>,
) -> Result<i32, Errno> {
    ensure_first_file(wasi, shared);
    let file: Box<dyn WasiFile> = Box::new(ReadPipe::from(blob));
    let fd = wasi
        .push_file(file, FileAccessMode::READ)
        .map_err(|_| Errno::Nfile)? as i32;
    debug!(fd, "registered config blob");
    Ok(fd)
}
