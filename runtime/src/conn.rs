//! The minimal connection contract and the registrable socket type.
//!
//! `Conn` is what the rest of the runtime (and tests) program against:
//! read, write, shutdown, a non-blocking toggle, optional cooperative polls,
//! optional addresses, and best-effort deadlines that may report
//! "unsupported". `SocketConn` is the ground-truth, OS-backed stream — the
//! only kind of connection the descriptor bridge can lend to a guest.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::unix::net::UnixStream;
use std::time::Duration;

pub(crate) fn unsupported() -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, "not supported by this connection")
}

/// Minimal contract shared by real sockets and the in-process wrappers.
///
/// Deadlines are best-effort: implementations without timer support return
/// an `Unsupported` error rather than silently ignoring the request.
pub trait Conn: Read + Write + Send {
    /// Shut down both directions; the peer observes EOF.
    fn shutdown(&self) -> io::Result<()>;

    /// Toggle non-blocking mode for reads and writes.
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;

    /// Wait until a read would make progress (data or EOF). `None` blocks
    /// indefinitely; returns `Ok(false)` on timeout.
    fn poll_readable(&self, timeout: Option<Duration>) -> io::Result<bool> {
        let _ = timeout;
        Err(unsupported())
    }

    /// Wait until a write would make progress.
    fn poll_writable(&self, timeout: Option<Duration>) -> io::Result<bool> {
        let _ = timeout;
        Err(unsupported())
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        let _ = timeout;
        Err(unsupported())
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        let _ = timeout;
        Err(unsupported())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// A real OS stream socket, registrable with the guest's fd namespace.
#[derive(Debug)]
pub enum SocketConn {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl SocketConn {
    /// Duplicate the underlying socket handle.
    ///
    /// Both handles refer to the same connection; shutting one down is
    /// observed through the other.
    pub fn try_clone(&self) -> io::Result<SocketConn> {
        match self {
            SocketConn::Tcp(s) => Ok(SocketConn::Tcp(s.try_clone()?)),
            SocketConn::Unix(s) => Ok(SocketConn::Unix(s.try_clone()?)),
        }
    }

    /// Disable Nagle on TCP; no-op for Unix streams.
    pub fn set_nodelay(&self) -> io::Result<()> {
        match self {
            SocketConn::Tcp(s) => s.set_nodelay(true),
            SocketConn::Unix(_) => Ok(()),
        }
    }

    pub fn is_tcp(&self) -> bool {
        matches!(self, SocketConn::Tcp(_))
    }

    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        match self {
            SocketConn::Tcp(s) => s.shutdown(how),
            SocketConn::Unix(s) => s.shutdown(how),
        }
    }
}

impl Read for SocketConn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SocketConn::Tcp(s) => s.read(buf),
            SocketConn::Unix(s) => s.read(buf),
        }
    }
}

impl Write for SocketConn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            SocketConn::Tcp(s) => s.write(buf),
            SocketConn::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            SocketConn::Tcp(s) => s.flush(),
            SocketConn::Unix(s) => s.flush(),
        }
    }
}

impl Conn for SocketConn {
    fn shutdown(&self) -> io::Result<()> {
        SocketConn::shutdown(self, Shutdown::Both)
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        match self {
            SocketConn::Tcp(s) => s.set_nonblocking(nonblocking),
            SocketConn::Unix(s) => s.set_nonblocking(nonblocking),
        }
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            SocketConn::Tcp(s) => s.set_read_timeout(timeout),
            SocketConn::Unix(s) => s.set_read_timeout(timeout),
        }
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            SocketConn::Tcp(s) => s.set_write_timeout(timeout),
            SocketConn::Unix(s) => s.set_write_timeout(timeout),
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            SocketConn::Tcp(s) => s.local_addr().ok(),
            SocketConn::Unix(_) => None,
        }
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        match self {
            SocketConn::Tcp(s) => s.peer_addr().ok(),
            SocketConn::Unix(_) => None,
        }
    }
}

impl From<TcpStream> for SocketConn {
    fn from(s: TcpStream) -> Self {
        SocketConn::Tcp(s)
    }
}

impl From<UnixStream> for SocketConn {
    fn from(s: UnixStream) -> Self {
        SocketConn::Unix(s)
    }
}

/// An interconnected pair of in-process stream sockets.
///
/// One half is typically handed to the guest through the bridge, the other
/// kept by the caller.
pub fn unix_pair() -> io::Result<(SocketConn, SocketConn)> {
    let (a, b) = UnixStream::pair()?;
    Ok((SocketConn::Unix(a), SocketConn::Unix(b)))
}
