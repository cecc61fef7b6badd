//! Host import registration via the engine linker.
//!
//! Registers the `env` capability imports a WATM may call. Each callback
//! runs on whatever thread is executing the guest, reads session state
//! through the store data, and reports failure as a negated WATER errno —
//! the i32 is the only thing that crosses the boundary.

use tracing::{debug, warn};
use wasmtime::{Caller, Linker};
use water_abi::v0;
use water_abi::Errno;

use crate::bridge::{self, DescriptorKind};
use crate::error::RuntimeError;
use crate::host::{lock, read_lock, HostCtx};

/// Link `host_dial` and `host_accept`, substituting `-EPERM` stubs for
/// capabilities the session does not carry.
pub fn link_network_interface(
    linker: &mut Linker<HostCtx>,
    has_dialer: bool,
    has_listener: bool,
) -> Result<(), RuntimeError> {
    if has_dialer {
        register_host_dial(linker)?;
    } else {
        register_stub(linker, v0::IMPORT_HOST_DIAL)?;
    }
    if has_listener {
        register_host_accept(linker)?;
    } else {
        register_stub(linker, v0::IMPORT_HOST_ACCEPT)?;
    }
    Ok(())
}

/// Link `pull_config` and `host_defer`.
pub fn link_runtime_imports(linker: &mut Linker<HostCtx>) -> Result<(), RuntimeError> {
    register_pull_config(linker)?;
    register_host_defer(linker)?;
    Ok(())
}

/// Stub for an unbound capability: always `-EPERM`.
fn register_stub(linker: &mut Linker<HostCtx>, name: &str) -> Result<(), RuntimeError> {
    linker.func_wrap(v0::HOST_MODULE, name, || -> i32 { Errno::Perm.negated() })?;
    Ok(())
}

fn register_host_dial(linker: &mut Linker<HostCtx>) -> Result<(), RuntimeError> {
    linker.func_wrap(
        v0::HOST_MODULE,
        v0::IMPORT_HOST_DIAL,
        |mut caller: Caller<'_, HostCtx>| -> i32 {
            let shared = caller.data().shared.clone();
            let dialer = match read_lock(&shared.binding).dialer.clone() {
                Some(d) => d,
                None => return Errno::Perm.negated(),
            };
            let conn = match dialer.dial() {
                Ok(c) => c,
                Err(e) => {
                    warn!("host_dial: {e}");
                    return Errno::from_io_error(&e).negated();
                }
            };
            match bridge::register_conn(
                &mut caller.data_mut().wasi,
                &shared,
                conn,
                DescriptorKind::Network,
            ) {
                Ok(fd) => {
                    debug!(fd, "host_dial connected");
                    fd
                }
                Err(errno) => errno.negated(),
            }
        },
    )?;
    Ok(())
}

fn register_host_accept(linker: &mut Linker<HostCtx>) -> Result<(), RuntimeError> {
    linker.func_wrap(
        v0::HOST_MODULE,
        v0::IMPORT_HOST_ACCEPT,
        |mut caller: Caller<'_, HostCtx>| -> i32 {
            let shared = caller.data().shared.clone();
            let listener = match read_lock(&shared.binding).listener.clone() {
                Some(l) => l,
                None => return Errno::Perm.negated(),
            };
            let conn = match listener.accept() {
                Ok(c) => c,
                Err(e) => {
                    warn!("host_accept: {e}");
                    return Errno::from_io_error(&e).negated();
                }
            };
            match bridge::register_conn(
                &mut caller.data_mut().wasi,
                &shared,
                conn,
                DescriptorKind::Network,
            ) {
                Ok(fd) => {
                    debug!(fd, "host_accept connected");
                    fd
                }
                Err(errno) => errno.negated(),
            }
        },
    )?;
    Ok(())
}

fn register_pull_config(linker: &mut Linker<HostCtx>) -> Result<(), RuntimeError> {
    linker.func_wrap(
        v0::HOST_MODULE,
        v0::IMPORT_PULL_CONFIG,
        |mut caller: Caller<'_, HostCtx>| -> i32 {
            let shared = caller.data().shared.clone();
            // The blob is consumed by the first pull.
            let blob = match lock(&shared.config_blob).take() {
                Some(b) => b,
                None => return Errno::NoEnt.negated(),
            };
            match bridge::register_config_blob(&mut caller.data_mut().wasi, &shared, blob) {
                Ok(fd) => fd,
                Err(errno) => errno.negated(),
            }
        },
    )?;
    Ok(())
}

fn register_host_defer(linker: &mut Linker<HostCtx>) -> Result<(), RuntimeError> {
    linker.func_wrap(
        v0::HOST_MODULE,
        v0::IMPORT_HOST_DEFER,
        |caller: Caller<'_, HostCtx>| {
            caller.data().shared.run_deferred();
        },
    )?;
    Ok(())
}
