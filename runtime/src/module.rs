//! Transport-module session — the central state machine.
//!
//! `New → Linked → Initialized → Running → Terminated`. A session wraps one
//! compiled WATM, binds the host-side network capabilities, initializes the
//! guest, enters exactly one role, supervises the worker, and tears
//! everything down exactly once on any exit path.

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::Duration;

use tracing::{debug, warn};
use water_abi::v0;
use water_abi::Errno;

use crate::bridge::DescriptorKind;
use crate::conn::{Conn, SocketConn};
use crate::core::Core;
use crate::error::RuntimeError;
use crate::host::{read_lock, write_lock};
use crate::linker;
use crate::net::{ManagedDialer, ManagedListener};
use crate::worker::{WorkerHarness, WorkerOutcome};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionState {
    New,
    Linked,
    Initialized,
    Running,
    Terminated,
}

/// One WATM instance, one engine store, at most one supervised worker.
pub struct TransportModule {
    core: Core,
    state: SessionState,
    role_called: bool,
    harness: Option<WorkerHarness>,
}

impl std::fmt::Debug for TransportModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportModule")
            .field("state", &self.state)
            .field("role_called", &self.role_called)
            .finish_non_exhaustive()
    }
}

impl TransportModule {
    /// Wrap a prepared core in a fresh session. Most callers go through
    /// [`crate::Registry::session`] instead, which also negotiates the ABI
    /// version and validates the module.
    pub fn new(core: Core) -> Self {
        TransportModule {
            core,
            state: SessionState::New,
            role_called: false,
            harness: None,
        }
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    /// Bind the host-side network capabilities.
    ///
    /// Absent capabilities are linked as stubs returning `-EPERM`, so a
    /// guest probing for them gets a decodable refusal instead of a link
    /// error.
    pub fn link_network_interface(
        &mut self,
        dialer: Option<ManagedDialer>,
        listener: Option<ManagedListener>,
    ) -> Result<(), RuntimeError> {
        if self.state != SessionState::New {
            return Err(RuntimeError::InvalidState("link_network_interface"));
        }
        linker::link_network_interface(
            self.core.linker_mut(),
            dialer.is_some(),
            listener.is_some(),
        )?;
        {
            let mut binding = write_lock(&self.core.shared().binding);
            binding.dialer = dialer;
            binding.listener = listener;
        }
        self.state = SessionState::Linked;
        Ok(())
    }

    /// Link the runtime imports and WASI, instantiate, and run
    /// `_water_init`. A non-zero init return aborts construction.
    pub fn initialize(&mut self) -> Result<(), RuntimeError> {
        match self.state {
            SessionState::New => self.link_network_interface(None, None)?,
            SessionState::Linked => {}
            _ => return Err(RuntimeError::InvalidState("initialize")),
        }
        linker::link_runtime_imports(self.core.linker_mut())?;
        self.core.link_wasi()?;
        self.core.instantiate()?;

        let ret = self.core.call_i32(v0::EXPORT_INIT, ())?;
        if ret != 0 {
            let errno = Errno::from_negated(ret)
                .map_err(|_| RuntimeError::AbiViolation(format!("_water_init returned {ret}")))?;
            return Err(RuntimeError::InitFailed(errno));
        }
        self.state = SessionState::Initialized;
        debug!("session initialized");
        Ok(())
    }

    /// Dialer role entry.
    ///
    /// Registers the caller-facing endpoint, lets the guest dial out through
    /// `host_dial`, starts the worker, and returns the descriptor-bridge
    /// view of the network socket the guest chose.
    pub fn dial_from(&mut self, caller: SocketConn) -> Result<SocketConn, RuntimeError> {
        self.enter_role()?;
        let caller_fd = self.register(caller, DescriptorKind::Caller)?;
        let net_fd = self.role_return(self.core.call_i32(v0::EXPORT_DIAL, caller_fd))?;
        let view = self.bridge_view(net_fd)?;
        self.start_worker()?;
        debug!(caller_fd, net_fd, "dialer running");
        Ok(view)
    }

    /// Listener role entry; the guest accepts the source through
    /// `host_accept`.
    pub fn accept_for(&mut self, caller: SocketConn) -> Result<SocketConn, RuntimeError> {
        self.enter_role()?;
        let caller_fd = self.register(caller, DescriptorKind::Caller)?;
        let src_fd = self.role_return(self.core.call_i32(v0::EXPORT_ACCEPT, caller_fd))?;
        let view = self.bridge_view(src_fd)?;
        self.start_worker()?;
        debug!(caller_fd, src_fd, "listener running");
        Ok(view)
    }

    /// Relay role entry; accept and dial both happen inside the guest.
    pub fn associate(&mut self) -> Result<(), RuntimeError> {
        self.enter_role()?;
        let ret = self.role_return(self.core.call_i32(v0::EXPORT_ASSOCIATE, ()))?;
        if ret != 0 {
            return Err(RuntimeError::AbiViolation(format!(
                "_water_associate returned {ret}"
            )));
        }
        self.start_worker()?;
        debug!("relay running");
        Ok(())
    }

    /// Request cancellation and tear the session down.
    ///
    /// On a running session this delivers the in-band signal, waits for the
    /// worker's outcome, and returns it. If the worker already returned on
    /// its own, its result is returned without signalling. After
    /// termination, further calls return `AlreadyCancelled` without
    /// blocking.
    pub fn cancel(&mut self) -> Result<WorkerOutcome, RuntimeError> {
        match self.state {
            SessionState::Terminated => Err(RuntimeError::AlreadyCancelled),
            SessionState::Running => {
                let result = match self.harness.as_mut() {
                    Some(harness) => harness.cancel(),
                    None => Err(RuntimeError::WorkerFailed("worker harness missing".into())),
                };
                self.terminate();
                result
            }
            _ => {
                // Nothing ran yet; tearing down is all there is to do.
                self.terminate();
                Ok(WorkerOutcome::Clean)
            }
        }
    }

    /// Ground-truth connection behind a guest descriptor, if registered.
    pub fn lookup(&self, fd: i32) -> Option<SocketConn> {
        let table = read_lock(&self.core.shared().table);
        table.lookup(fd).and_then(|e| e.conn.try_clone().ok())
    }

    /// Number of live descriptors; zero after termination.
    pub fn descriptor_count(&self) -> usize {
        read_lock(&self.core.shared().table).len()
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SessionState::Terminated
    }

    /// Register a host-side cleanup to run at teardown, or earlier when the
    /// guest calls `host_defer`.
    pub fn defer(&self, f: impl FnOnce() + Send + 'static) {
        self.core.shared().defer(f);
    }

    fn enter_role(&mut self) -> Result<(), RuntimeError> {
        match self.state {
            SessionState::Initialized if !self.role_called => {
                self.role_called = true;
                Ok(())
            }
            SessionState::Initialized | SessionState::Running => Err(RuntimeError::AlreadyRunning),
            SessionState::Terminated => Err(RuntimeError::InvalidState("role entry")),
            SessionState::New | SessionState::Linked => {
                Err(RuntimeError::InvalidState("role entry before initialize"))
            }
        }
    }

    fn register(&self, conn: SocketConn, kind: DescriptorKind) -> Result<i32, RuntimeError> {
        let mut store = self.core.lock_store();
        let ctx = &mut *store.data_mut();
        crate::bridge::register_conn(&mut ctx.wasi, &ctx.shared, conn, kind)
            .map_err(|e| RuntimeError::Io(e.into()))
    }

    /// Decode a role-entry return: negative values carry an errno.
    fn role_return(&self, ret: Result<i32, RuntimeError>) -> Result<i32, RuntimeError> {
        let ret = ret?;
        if ret < 0 {
            return Err(match Errno::from_negated(ret) {
                Ok(errno) => RuntimeError::Guest(errno),
                Err(e) => e.into(),
            });
        }
        Ok(ret)
    }

    /// A role entry's return must name a descriptor the bridge knows.
    fn bridge_view(&self, fd: i32) -> Result<SocketConn, RuntimeError> {
        self.lookup(fd).ok_or(RuntimeError::Guest(Errno::Badf))
    }

    fn start_worker(&mut self) -> Result<(), RuntimeError> {
        match WorkerHarness::start(&self.core) {
            Ok(harness) => {
                self.harness = Some(harness);
                self.state = SessionState::Running;
                Ok(())
            }
            Err(e) => {
                self.terminate();
                Err(e)
            }
        }
    }

    /// Idempotent teardown: close every ground-truth socket and bundle,
    /// empty the descriptor table, and run deferred functions exactly once.
    fn terminate(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }
        self.state = SessionState::Terminated;
        self.harness = None;

        let entries = write_lock(&self.core.shared().table).drain();
        let closed = entries.len();
        for entry in entries {
            if let Some(bundle) = &entry.bundle {
                bundle.sever();
            }
            if let Err(e) = Conn::shutdown(&entry.conn) {
                // Already closed by the peer is the common benign case.
                if e.kind() != io::ErrorKind::NotConnected {
                    warn!("descriptor shutdown: {e}");
                }
            }
        }
        self.core.shared().run_deferred();
        debug!(closed, "session terminated");
    }
}

impl Drop for TransportModule {
    fn drop(&mut self) {
        if self.state == SessionState::Running {
            if let Err(e) = self.cancel() {
                warn!("cancel on drop: {e}");
            }
        } else {
            self.terminate();
        }
    }
}

/// Caller-facing connection over a running session.
///
/// Reads and writes move plaintext through the caller-side endpoint; the
/// guest transforms them on the way to the network socket. Dropping the
/// connection cancels the session.
pub struct WaterConn {
    local: SocketConn,
    remote_view: Option<SocketConn>,
    session: TransportModule,
}

impl WaterConn {
    pub(crate) fn new(
        session: TransportModule,
        local: SocketConn,
        remote_view: Option<SocketConn>,
    ) -> Self {
        WaterConn {
            local,
            remote_view,
            session,
        }
    }

    /// The descriptor-bridge view of the network-side socket.
    pub fn remote_view(&self) -> Option<&SocketConn> {
        self.remote_view.as_ref()
    }

    pub fn session(&self) -> &TransportModule {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut TransportModule {
        &mut self.session
    }

    /// Cancel the underlying session.
    pub fn cancel(&mut self) -> Result<WorkerOutcome, RuntimeError> {
        self.session.cancel()
    }
}

impl Read for WaterConn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.local.read(buf)
    }
}

impl Write for WaterConn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.local.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.local.flush()
    }
}

impl Conn for WaterConn {
    fn shutdown(&self) -> io::Result<()> {
        Conn::shutdown(&self.local)
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.local.set_nonblocking(nonblocking)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.local.set_read_timeout(timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.local.set_write_timeout(timeout)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Conn::local_addr(&self.local)
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.remote_view.as_ref().and_then(|v| Conn::peer_addr(v))
    }
}
