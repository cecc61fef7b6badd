//! Relay role front-end.

use tracing::debug;

use crate::config::WatmConfig;
use crate::error::RuntimeError;
use crate::module::TransportModule;
use crate::net::{ManagedDialer, ManagedListener};
use crate::registry::Registry;
use crate::worker::WorkerOutcome;

/// Builds relay sessions: the guest accepts a source, dials the remote, and
/// shuttles bytes between them entirely in-module.
pub struct WaterRelay {
    config: WatmConfig,
    registry: Registry,
    listener: ManagedListener,
}

/// A running relay; exists to be cancelled.
pub struct RelaySession {
    session: TransportModule,
}

impl WaterRelay {
    /// Requires `config.listener`; its absence is a construction error.
    pub fn new(config: WatmConfig) -> Result<Self, RuntimeError> {
        Self::with_registry(config, Registry::builtin())
    }

    pub fn with_registry(config: WatmConfig, registry: Registry) -> Result<Self, RuntimeError> {
        let listener = config.listener.clone().ok_or_else(|| {
            RuntimeError::Config("relay role requires a network listener".into())
        })?;
        Ok(WaterRelay {
            config,
            registry,
            listener,
        })
    }

    /// Splice the next accepted source onto `address` through a fresh
    /// session. Returns once the guest has both ends connected and its
    /// worker is relaying.
    pub fn associate(&self, network: &str, address: &str) -> Result<RelaySession, RuntimeError> {
        let dialer = match &self.config.dial_fn {
            Some(f) => ManagedDialer::with_dial_fn(network, address, f.clone()),
            None => ManagedDialer::new(network, address),
        };

        let mut session = self.registry.session(self.config.clone())?;
        session.link_network_interface(Some(dialer), Some(self.listener.clone()))?;
        session.initialize()?;
        session.associate()?;
        debug!(network, address, "relay session established");
        Ok(RelaySession { session })
    }
}

impl RelaySession {
    pub fn session(&self) -> &TransportModule {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut TransportModule {
        &mut self.session
    }

    /// Cancel the relay and collect the worker's outcome.
    pub fn cancel(&mut self) -> Result<WorkerOutcome, RuntimeError> {
        self.session.cancel()
    }
}
