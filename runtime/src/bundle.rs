//! Socket splice bundle.
//!
//! Interposes an in-process socketpair between a real stream socket and the
//! guest: two pump threads copy bytes in each direction, and the host keeps
//! clones of both ends so it can proactively shut the guest-visible side
//! down when the network side reaches EOF. This is the halt-on-peer-close
//! workaround surface, also handy for tests that want a guest-registrable
//! view of an arbitrary stream.

use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::thread;

use tracing::trace;

use crate::conn::SocketConn;

const PUMP_BUF: usize = 16 * 1024;

/// Host-side handle to a spliced connection.
///
/// Dropping the bundle does not stop the pumps; call [`Bundle::sever`] to
/// tear the splice down. The pump threads exit on their own once both
/// underlying streams have reached EOF or errored.
#[derive(Debug)]
pub struct Bundle {
    socket: SocketConn,
    host_half: UnixStream,
}

impl Bundle {
    /// Splice `conn` onto a fresh socketpair and return the guest-facing
    /// half together with the host-side handle.
    pub fn splice(conn: SocketConn) -> io::Result<(UnixStream, Bundle)> {
        let (guest_half, host_half) = UnixStream::pair()?;

        let mut from_sock = conn.try_clone()?;
        let mut to_sock = conn.try_clone()?;
        let mut from_pipe = host_half.try_clone()?;
        let mut to_pipe = host_half.try_clone()?;

        // socket -> pipe; on socket EOF the guest-visible side is closed.
        thread::Builder::new()
            .name("water-bundle-rx".into())
            .spawn(move || {
                pump(&mut from_sock, &mut to_pipe);
                let _ = to_pipe.shutdown(Shutdown::Write);
                trace!("bundle rx pump finished");
            })?;

        // pipe -> socket; on guest close the network side sees EOF.
        thread::Builder::new()
            .name("water-bundle-tx".into())
            .spawn(move || {
                pump(&mut from_pipe, &mut to_sock);
                let _ = to_sock.shutdown(Shutdown::Write);
                trace!("bundle tx pump finished");
            })?;

        Ok((
            guest_half,
            Bundle {
                socket: conn,
                host_half,
            },
        ))
    }

    /// The ground-truth socket behind the splice.
    pub fn socket(&self) -> &SocketConn {
        &self.socket
    }

    /// Shut both ends down; both pump threads unblock and exit.
    pub fn sever(&self) {
        let _ = self.socket.shutdown(Shutdown::Both);
        let _ = self.host_half.shutdown(Shutdown::Both);
    }
}

fn pump<R: Read, W: Write>(src: &mut R, dst: &mut W) {
    let mut buf = [0u8; PUMP_BUF];
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        if dst.write_all(&buf[..n]).is_err() {
            return;
        }
    }
}
