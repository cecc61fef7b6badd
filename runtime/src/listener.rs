//! Listener role front-end.

use std::net::SocketAddr;

use tracing::debug;

use crate::config::WatmConfig;
use crate::conn::unix_pair;
use crate::error::RuntimeError;
use crate::module::WaterConn;
use crate::net::ManagedListener;
use crate::registry::Registry;

/// Builds one listener session per accepted connection.
///
/// The held network listener is the managed capability; each `accept` spins
/// up a fresh session whose guest pulls the next connection off it through
/// `host_accept`.
pub struct WaterListener {
    config: WatmConfig,
    registry: Registry,
    listener: ManagedListener,
}

impl WaterListener {
    /// Requires `config.listener`; its absence is a construction error.
    pub fn new(config: WatmConfig) -> Result<Self, RuntimeError> {
        Self::with_registry(config, Registry::builtin())
    }

    pub fn with_registry(config: WatmConfig, registry: Registry) -> Result<Self, RuntimeError> {
        let listener = config.listener.clone().ok_or_else(|| {
            RuntimeError::Config("listener role requires a network listener".into())
        })?;
        Ok(WaterListener {
            config,
            registry,
            listener,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept one connection through a fresh session.
    ///
    /// Blocks (inside the guest's `host_accept`) until a source connects.
    pub fn accept(&self) -> Result<WaterConn, RuntimeError> {
        let mut session = self.registry.session(self.config.clone())?;
        session.link_network_interface(None, Some(self.listener.clone()))?;
        session.initialize()?;

        let (app_half, guest_half) = unix_pair()?;
        let view = session.accept_for(guest_half)?;
        debug!("listener session established");
        Ok(WaterConn::new(session, app_half, Some(view)))
    }
}
