//! Channel-backed pseudo-connection.
//!
//! An in-process, optionally bounded, full-duplex byte stream used by tests
//! and internal relays. Supports a non-blocking mode and cooperative
//! poll-for-read / poll-for-write. Deadlines are *not* supported and say so.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::conn::Conn;
use crate::host::lock;

/// One direction of a `ChannelConn` pair.
struct Half {
    state: Mutex<HalfState>,
    /// Signalled when bytes arrive or the direction closes.
    readable: Condvar,
    /// Signalled when space frees up or the direction closes.
    writable: Condvar,
    /// `None` means unbuffered growth without bound.
    capacity: Option<usize>,
}

#[derive(Default)]
struct HalfState {
    buf: VecDeque<u8>,
    closed: bool,
}

impl Half {
    fn new(capacity: Option<usize>) -> Arc<Self> {
        Arc::new(Half {
            state: Mutex::new(HalfState::default()),
            readable: Condvar::new(),
            writable: Condvar::new(),
            capacity,
        })
    }

    fn close(&self) {
        lock(&self.state).closed = true;
        self.readable.notify_all();
        self.writable.notify_all();
    }
}

/// One endpoint of an in-process full-duplex byte stream.
pub struct ChannelConn {
    /// Direction we read from (peer writes here).
    rx: Arc<Half>,
    /// Direction we write into (peer reads here).
    tx: Arc<Half>,
    nonblocking: AtomicBool,
}

/// Create an interconnected pair.
///
/// `capacity` bounds each direction's in-flight bytes; `None` is unbounded.
pub fn channel_pair(capacity: Option<usize>) -> (ChannelConn, ChannelConn) {
    let ab = Half::new(capacity);
    let ba = Half::new(capacity);
    (
        ChannelConn {
            rx: ba.clone(),
            tx: ab.clone(),
            nonblocking: AtomicBool::new(false),
        },
        ChannelConn {
            rx: ab,
            tx: ba,
            nonblocking: AtomicBool::new(false),
        },
    )
}

impl ChannelConn {
    fn is_nonblocking(&self) -> bool {
        self.nonblocking.load(Ordering::Relaxed)
    }

    /// Close both directions; the peer reads EOF and further writes from
    /// either side fail with `BrokenPipe`.
    pub fn close(&self) {
        self.rx.close();
        self.tx.close();
    }
}

impl Read for ChannelConn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = lock(&self.rx.state);
        loop {
            if !state.buf.is_empty() {
                let n = buf.len().min(state.buf.len());
                for slot in buf[..n].iter_mut() {
                    // VecDeque is non-empty for the first n pops.
                    *slot = state.buf.pop_front().unwrap_or_default();
                }
                self.rx.writable.notify_all();
                return Ok(n);
            }
            if state.closed {
                return Ok(0);
            }
            if self.is_nonblocking() {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            state = self
                .rx
                .readable
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }
}

impl Write for ChannelConn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = lock(&self.tx.state);
        loop {
            if state.closed {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            let room = match self.tx.capacity {
                Some(cap) => cap.saturating_sub(state.buf.len()),
                None => buf.len(),
            };
            if room > 0 {
                let n = buf.len().min(room);
                state.buf.extend(&buf[..n]);
                self.tx.readable.notify_all();
                return Ok(n);
            }
            if self.is_nonblocking() {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            state = self
                .tx
                .writable
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Conn for ChannelConn {
    fn shutdown(&self) -> io::Result<()> {
        self.close();
        Ok(())
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.nonblocking.store(nonblocking, Ordering::Relaxed);
        Ok(())
    }

    fn poll_readable(&self, timeout: Option<Duration>) -> io::Result<bool> {
        let mut state = lock(&self.rx.state);
        loop {
            if !state.buf.is_empty() || state.closed {
                return Ok(true);
            }
            match timeout {
                None => {
                    state = self
                        .rx
                        .readable
                        .wait(state)
                        .unwrap_or_else(|e| e.into_inner());
                }
                Some(t) => {
                    let (guard, res) = self
                        .rx
                        .readable
                        .wait_timeout(state, t)
                        .unwrap_or_else(|e| e.into_inner());
                    state = guard;
                    if res.timed_out() {
                        return Ok(!state.buf.is_empty() || state.closed);
                    }
                }
            }
        }
    }

    fn poll_writable(&self, timeout: Option<Duration>) -> io::Result<bool> {
        let mut state = lock(&self.tx.state);
        loop {
            // A closed direction is "ready": the write fails fast.
            let ready = state.closed
                || match self.tx.capacity {
                    Some(cap) => state.buf.len() < cap,
                    None => true,
                };
            if ready {
                return Ok(true);
            }
            match timeout {
                None => {
                    state = self
                        .tx
                        .writable
                        .wait(state)
                        .unwrap_or_else(|e| e.into_inner());
                }
                Some(t) => {
                    let (guard, res) = self
                        .tx
                        .writable
                        .wait_timeout(state, t)
                        .unwrap_or_else(|e| e.into_inner());
                    state = guard;
                    if res.timed_out() {
                        return Ok(state.closed || state.buf.len() < self.tx.capacity.unwrap_or(usize::MAX));
                    }
                }
            }
        }
    }

    // Deadlines are unsupported by design; the default trait impls report it.
}

impl Drop for ChannelConn {
    fn drop(&mut self) {
        self.close();
    }
}
