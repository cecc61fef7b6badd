//! Per-session state held in the engine store.
//!
//! `HostCtx` is the store's data: the guest's WASI context plus the shared
//! session state the host imports and the teardown path both reach for. The
//! shared half lives behind an `Arc` because import callbacks run on the
//! worker thread inside the engine while cleanup runs on whichever thread
//! triggered teardown.

use std::sync::atomic::AtomicBool;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

use wasi_common::WasiCtx;

use crate::bridge::DescriptorTable;
use crate::config::Workarounds;
use crate::net::{ManagedDialer, ManagedListener};

/// Poison-absorbing mutex lock. A panic while holding one of these locks
/// leaves plain data; continuing with it beats tearing the session down with
/// a second panic.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn read_lock<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn write_lock<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(|e| e.into_inner())
}

/// A host-side cleanup registered to run at teardown (or earlier, when the
/// guest calls `host_defer`).
pub type DeferredFn = Box<dyn FnOnce() + Send>;

/// The network capabilities bound by `link_network_interface`.
#[derive(Default)]
pub struct NetworkBinding {
    pub dialer: Option<ManagedDialer>,
    pub listener: Option<ManagedListener>,
}

/// Session state shared between the store, the import callbacks, and the
/// teardown path.
pub struct SessionShared {
    /// Guest descriptor id -> ground-truth connection.
    pub table: RwLock<DescriptorTable>,
    /// Dial/accept capabilities; absent ones are linked as `-EPERM` stubs.
    pub binding: RwLock<NetworkBinding>,
    /// Config blob for `pull_config`; consumed on first pull.
    pub config_blob: Mutex<Option<Vec<u8>>>,
    /// Engine-bug workaround toggles.
    pub workarounds: Workarounds,
    /// Whether the dummy-first-file workaround already ran for this session.
    pub first_file_pushed: AtomicBool,
    deferred: Mutex<Vec<DeferredFn>>,
}

impl SessionShared {
    pub fn new(workarounds: Workarounds) -> Self {
        SessionShared {
            table: RwLock::new(DescriptorTable::default()),
            binding: RwLock::new(NetworkBinding::default()),
            config_blob: Mutex::new(None),
            workarounds,
            first_file_pushed: AtomicBool::new(false),
            deferred: Mutex::new(Vec::new()),
        }
    }

    /// Register a deferred cleanup.
    pub fn defer(&self, f: impl FnOnce() + Send + 'static) {
        lock(&self.deferred).push(Box::new(f));
    }

    /// Run and drop every registered deferred function. Each runs at most
    /// once no matter how many times this is called.
    pub fn run_deferred(&self) {
        let pending = std::mem::take(&mut *lock(&self.deferred));
        for f in pending {
            f();
        }
    }
}

/// Store data for one session.
pub struct HostCtx {
    pub wasi: WasiCtx,
    pub shared: Arc<SessionShared>,
}
