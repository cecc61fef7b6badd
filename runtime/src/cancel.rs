//! In-band cancellation channel.
//!
//! An in-process socketpair: the guest half is registered as a descriptor
//! and polled by the WATM worker; the host half is held by the harness. Any
//! readability on the guest half — a signal byte or EOF from the host half
//! being dropped — means "cease work and return `ECANCELED`".

use std::io::{self, Write};
use std::os::unix::net::UnixStream;

use crate::conn::SocketConn;

/// Host-side half of the cancel socketpair.
#[derive(Debug)]
pub struct CancelChannel {
    host: UnixStream,
}

impl CancelChannel {
    /// Create the pair; the first element is the guest half, ready for
    /// registration with the descriptor bridge.
    pub fn pair() -> io::Result<(SocketConn, CancelChannel)> {
        let (guest, host) = UnixStream::pair()?;
        Ok((SocketConn::Unix(guest), CancelChannel { host }))
    }

    /// Wake the guest: a single byte is enough.
    pub fn signal(&self) -> io::Result<()> {
        (&self.host).write_all(&[1])
    }
}

// Dropping the host half closes it; the guest observes EOF, which is an
// equally valid cancellation trigger.
