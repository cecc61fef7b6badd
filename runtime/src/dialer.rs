//! Dialer role front-end.

use tracing::debug;

use crate::config::WatmConfig;
use crate::conn::unix_pair;
use crate::error::RuntimeError;
use crate::module::WaterConn;
use crate::net::ManagedDialer;
use crate::registry::Registry;

/// Builds one dialer session per `dial` call.
///
/// The caller gets a [`WaterConn`] whose bytes are transformed by the guest
/// before they reach the dialed endpoint.
pub struct WaterDialer {
    config: WatmConfig,
    registry: Registry,
}

impl WaterDialer {
    pub fn new(config: WatmConfig) -> Self {
        WaterDialer {
            config,
            registry: Registry::builtin(),
        }
    }

    /// Use a caller-supplied version registry.
    pub fn with_registry(config: WatmConfig, registry: Registry) -> Self {
        WaterDialer { config, registry }
    }

    /// Dial `address` on `network` through a fresh session.
    ///
    /// The managed dialer is bound to exactly this endpoint; the guest
    /// reaches it only through `host_dial`.
    pub fn dial(&self, network: &str, address: &str) -> Result<WaterConn, RuntimeError> {
        let dialer = match &self.config.dial_fn {
            Some(f) => ManagedDialer::with_dial_fn(network, address, f.clone()),
            None => ManagedDialer::new(network, address),
        };

        let mut session = self.registry.session(self.config.clone())?;
        session.link_network_interface(Some(dialer), None)?;
        session.initialize()?;

        let (app_half, guest_half) = unix_pair()?;
        let view = session.dial_from(guest_half)?;
        debug!(network, address, "dialer session established");
        Ok(WaterConn::new(session, app_half, Some(view)))
    }
}
