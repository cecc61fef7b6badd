//! Managed network capabilities.
//!
//! A session never hands the guest a raw `connect` or `accept`; it binds a
//! `ManagedDialer` (network + address + dial function) and/or a
//! `ManagedListener` at link time, and the guest reaches them only through
//! the `host_dial` / `host_accept` imports.

use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::Arc;

use crate::conn::SocketConn;

/// A dial function: `(network, address) -> connection`.
pub type DialFn = dyn Fn(&str, &str) -> io::Result<SocketConn> + Send + Sync;

/// Platform dialer for `tcp` and `unix` networks.
pub fn platform_dial(network: &str, address: &str) -> io::Result<SocketConn> {
    match network {
        "tcp" => Ok(SocketConn::Tcp(TcpStream::connect(address)?)),
        "unix" => Ok(SocketConn::Unix(UnixStream::connect(address)?)),
        other => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("unsupported network '{other}'"),
        )),
    }
}

/// Host-side dial capability bound to one network + address.
#[derive(Clone)]
pub struct ManagedDialer {
    network: String,
    address: String,
    dial_fn: Arc<DialFn>,
}

impl ManagedDialer {
    /// Bind the platform dialer to `network`/`address`.
    pub fn new(network: &str, address: &str) -> Self {
        Self::with_dial_fn(network, address, Arc::new(platform_dial))
    }

    /// Bind a caller-supplied dial function.
    pub fn with_dial_fn(network: &str, address: &str, dial_fn: Arc<DialFn>) -> Self {
        ManagedDialer {
            network: network.to_string(),
            address: address.to_string(),
            dial_fn,
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Dial the bound endpoint.
    pub fn dial(&self) -> io::Result<SocketConn> {
        (self.dial_fn)(&self.network, &self.address)
    }
}

impl fmt::Debug for ManagedDialer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedDialer")
            .field("network", &self.network)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Host-side accept capability over a held listener.
#[derive(Clone, Debug)]
pub struct ManagedListener {
    inner: Arc<ListenerInner>,
}

#[derive(Debug)]
enum ListenerInner {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl ManagedListener {
    pub fn tcp(listener: TcpListener) -> Self {
        ManagedListener {
            inner: Arc::new(ListenerInner::Tcp(listener)),
        }
    }

    pub fn unix(listener: UnixListener) -> Self {
        ManagedListener {
            inner: Arc::new(ListenerInner::Unix(listener)),
        }
    }

    /// Accept one connection.
    pub fn accept(&self) -> io::Result<SocketConn> {
        match &*self.inner {
            ListenerInner::Tcp(l) => Ok(SocketConn::Tcp(l.accept()?.0)),
            ListenerInner::Unix(l) => Ok(SocketConn::Unix(l.accept()?.0)),
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.inner {
            ListenerInner::Tcp(l) => l.local_addr().ok(),
            ListenerInner::Unix(_) => None,
        }
    }
}

impl From<TcpListener> for ManagedListener {
    fn from(l: TcpListener) -> Self {
        ManagedListener::tcp(l)
    }
}

impl From<UnixListener> for ManagedListener {
    fn from(l: UnixListener) -> Self {
        ManagedListener::unix(l)
    }
}
