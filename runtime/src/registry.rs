//! Version registry — export sentinel to session factory.
//!
//! A loaded module advertises its ABI generation through a `_water_vN`
//! export; the registry maps known sentinels to constructors. The builtin
//! registry carries v0. Future generations register under their own
//! sentinel without touching the negotiation logic.

use std::sync::Arc;

use tracing::debug;
use wasmtime::Module;
use water_abi::v0;

use crate::config::WatmConfig;
use crate::core::Core;
use crate::error::RuntimeError;
use crate::module::TransportModule;
use crate::validation;

/// Builds a session around a prepared core.
pub type SessionFactory = Arc<dyn Fn(Core) -> Result<TransportModule, RuntimeError> + Send + Sync>;

/// Registry of known connector versions, in registration order.
pub struct Registry {
    entries: Vec<(String, SessionFactory)>,
}

impl Registry {
    /// An empty registry; mostly useful in tests.
    pub fn empty() -> Self {
        Registry {
            entries: Vec::new(),
        }
    }

    /// The default registry with the v0 protocol registered.
    pub fn builtin() -> Self {
        let factory: SessionFactory = Arc::new(v0_factory);
        Registry {
            entries: vec![(v0::EXPORT_VERSION.to_string(), factory)],
        }
    }

    /// Register a constructor under a version sentinel.
    pub fn register(
        &mut self,
        sentinel: &str,
        factory: SessionFactory,
    ) -> Result<(), RuntimeError> {
        if self.entries.iter().any(|(name, _)| name == sentinel) {
            return Err(RuntimeError::AlreadyRegistered(sentinel.to_string()));
        }
        self.entries.push((sentinel.to_string(), factory));
        Ok(())
    }

    pub fn lookup(&self, sentinel: &str) -> Option<&SessionFactory> {
        self.entries
            .iter()
            .find(|(name, _)| name == sentinel)
            .map(|(_, f)| f)
    }

    /// Pick the first known version sentinel the module exports.
    pub fn negotiate(&self, module: &Module) -> Result<(String, SessionFactory), RuntimeError> {
        for export in module.exports() {
            let name = export.name();
            if !name.starts_with(v0::VERSION_PREFIX) {
                continue;
            }
            if let Some(factory) = self.lookup(name) {
                return Ok((name.to_string(), factory.clone()));
            }
        }
        Err(RuntimeError::VersionNotFound)
    }

    /// Compile the module, negotiate its version, and construct a session.
    pub fn session(&self, config: WatmConfig) -> Result<TransportModule, RuntimeError> {
        let core = Core::new(config)?;
        let (version, factory) = self.negotiate(core.module())?;
        debug!(%version, "negotiated connector version");
        factory(core)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::builtin()
    }
}

fn v0_factory(core: Core) -> Result<TransportModule, RuntimeError> {
    validation::validate_v0_module(core.module())?;
    Ok(TransportModule::new(core))
}
