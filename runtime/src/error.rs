//! Runtime error types.

use water_abi::{AbiError, Errno};

/// Top-level error type for the runtime crate.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Wasmtime engine, compilation, or instantiation error.
    #[error("wasmtime error: {0}")]
    Wasmtime(#[from] anyhow::Error),

    /// Construction-time configuration error (missing binary, bad preopen,
    /// missing listener for a listener-role session, etc.).
    #[error("configuration error: {0}")]
    Config(String),

    /// The module does not satisfy the WATER ABI (missing export, wrong
    /// signature, unexpected import).
    #[error("ABI violation: {0}")]
    AbiViolation(String),

    /// No registered `_water_vN` sentinel is exported by the module.
    #[error("connector version not found")]
    VersionNotFound,

    /// A second registry entry was made under the same sentinel.
    #[error("version {0} already registered")]
    AlreadyRegistered(String),

    /// A negative guest return did not decode to a table errno.
    #[error(transparent)]
    Abi(#[from] AbiError),

    /// The guest reported an errno from an export or import call.
    #[error("guest reported {0}")]
    Guest(Errno),

    /// `_water_init` returned a non-zero value.
    #[error("_water_init failed with {0}")]
    InitFailed(Errno),

    /// A second role entry was attempted on this session.
    #[error("already running")]
    AlreadyRunning,

    /// `cancel()` was called on a session that already terminated.
    #[error("already cancelled")]
    AlreadyCancelled,

    /// A session operation was attempted in a state that does not allow it.
    #[error("invalid session state for {0}")]
    InvalidState(&'static str),

    /// The worker thread exited abnormally (engine trap, lost result).
    #[error("worker returned error: {0}")]
    WorkerFailed(String),

    /// The guest trapped outside the worker (role entry or init).
    #[error("guest trapped: {0}")]
    GuestTrapped(String),

    /// Host-side I/O error (dial, accept, socketpair, registration).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
