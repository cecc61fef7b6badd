//! Worker harness — host-side supervision of the guest's blocking worker.
//!
//! Start: create the cancel socketpair, register the guest half, arm the
//! guest through `_water_cancel_with`, then spawn one OS thread that runs
//! `_water_worker` to completion. The outcome is published on a small
//! bounded channel — twice, defensively, so a result cannot be lost between
//! observers — and the sender is dropped so later receives fail fast.
//!
//! Local recovery is forbidden here: any non-success outcome terminates the
//! session, and the caller builds a fresh one to retry.

use std::sync::mpsc::{sync_channel, Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};
use wasmtime::{Instance, Store};
use water_abi::v0;
use water_abi::Errno;

use crate::bridge::{self, DescriptorKind};
use crate::cancel::CancelChannel;
use crate::core::Core;
use crate::error::RuntimeError;
use crate::host::{lock, HostCtx};

/// How `_water_worker` came back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Returned 0.
    Clean,
    /// Returned a negated table errno; `ECANCELED` after a cancel handshake.
    Errno(Errno),
    /// Engine trap, guest panic, or an undecodable return.
    Failed(String),
}

impl WorkerOutcome {
    /// True when the worker acknowledged a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerOutcome::Errno(Errno::Canceled))
    }
}

/// Supervision state for one running worker.
///
/// The cancel socket handle is written once at start and taken once on
/// cancel; it is writable exactly while the worker is running.
pub struct WorkerHarness {
    cancel: Option<CancelChannel>,
    result_rx: Receiver<WorkerOutcome>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerHarness {
    /// Arm the cancel channel and launch `_water_worker`.
    ///
    /// Pre-conditions: the module is initialized and a role entry has been
    /// called. A non-zero return from `_water_cancel_with` aborts before any
    /// thread is spawned.
    pub fn start(core: &Core) -> Result<Self, RuntimeError> {
        let (guest_half, cancel) = CancelChannel::pair()?;

        let cancel_fd = {
            let mut store = core.lock_store();
            let ctx = &mut *store.data_mut();
            bridge::register_conn(&mut ctx.wasi, &ctx.shared, guest_half, DescriptorKind::Cancel)
                .map_err(|e| RuntimeError::Io(e.into()))?
        };

        let ret = core.call_i32(v0::EXPORT_CANCEL_WITH, cancel_fd)?;
        if ret != 0 {
            return Err(match Errno::from_negated(ret) {
                Ok(errno) => RuntimeError::Guest(errno),
                Err(e) => e.into(),
            });
        }

        let (tx, result_rx) = sync_channel::<WorkerOutcome>(2);
        let instance = core.instance()?;
        let store = Arc::clone(core.store());
        let handle = thread::Builder::new()
            .name("water-worker".into())
            .spawn(move || {
                let outcome = run_worker(&store, instance);
                debug!(?outcome, "worker exited");
                let _ = tx.send(outcome.clone());
                let _ = tx.send(outcome);
            })?;
        debug!(cancel_fd, "worker launched");

        Ok(WorkerHarness {
            cancel: Some(cancel),
            result_rx,
            handle: Some(handle),
        })
    }

    /// Request cancellation and wait for the worker's outcome.
    ///
    /// If the worker already finished, its result is returned without
    /// signalling. Otherwise a single byte on the cancel socket asks the
    /// guest to stop, and the call blocks — indefinitely, by design — until
    /// the worker publishes its outcome.
    pub fn cancel(&mut self) -> Result<WorkerOutcome, RuntimeError> {
        match self.result_rx.try_recv() {
            Ok(outcome) => {
                self.finish();
                return Ok(outcome);
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.finish();
                return Err(RuntimeError::WorkerFailed(
                    "worker exited without publishing a result".into(),
                ));
            }
        }

        if let Some(cancel) = &self.cancel {
            if let Err(e) = cancel.signal() {
                // The worker may have raced us to exit; the recv below
                // settles it either way.
                warn!("cancel signal failed: {e}");
            }
        }

        let result = self.result_rx.recv();
        self.finish();
        match result {
            Ok(outcome) => Ok(outcome),
            Err(_) => Err(RuntimeError::WorkerFailed(
                "worker exited without publishing a result".into(),
            )),
        }
    }

    /// Close the cancel socket and join the (now finished) worker thread.
    fn finish(&mut self) {
        self.cancel = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker(store: &Arc<Mutex<Store<HostCtx>>>, instance: Instance) -> WorkerOutcome {
    let mut store = lock(store);
    let func = match instance.get_typed_func::<(), i32>(&mut *store, v0::EXPORT_WORKER) {
        Ok(f) => f,
        Err(e) => return WorkerOutcome::Failed(format!("export '_water_worker': {e}")),
    };
    match func.call(&mut *store, ()) {
        Ok(0) => WorkerOutcome::Clean,
        Ok(ret) if ret < 0 => match Errno::from_negated(ret) {
            Ok(errno) => WorkerOutcome::Errno(errno),
            Err(e) => WorkerOutcome::Failed(e.to_string()),
        },
        Ok(ret) => WorkerOutcome::Failed(format!("unexpected worker return {ret}")),
        Err(e) => WorkerOutcome::Failed(format!("{e:#}")),
    }
}
