//! Session construction configuration.

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use crate::net::{DialFn, ManagedListener};

/// Where the module config blob comes from.
#[derive(Clone, Debug)]
pub enum ConfigSource {
    /// Read the file at construction time.
    Path(PathBuf),
    /// Use the bytes as-is.
    Bytes(Vec<u8>),
}

impl ConfigSource {
    pub fn load(&self) -> io::Result<Vec<u8>> {
        match self {
            ConfigSource::Path(p) => fs::read(p),
            ConfigSource::Bytes(b) => Ok(b.clone()),
        }
    }
}

/// Workaround toggles for known engine bugs.
///
/// Defaults come from the `gc-bug` / `conn-halt-bug` cargo features but both
/// stay runtime-selectable, since the underlying engine version usually
/// cannot be pinned by the embedding application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Workarounds {
    /// Register a throwaway file before the first real registration of a
    /// session, absorbing a premature-collection bug in the engine's
    /// resource tracker.
    pub gc_bug: bool,
    /// Splice TCP sockets through a Unix-socket bundle so the host can close
    /// the guest-visible side when the network side reaches EOF.
    pub conn_halt: bool,
}

impl Default for Workarounds {
    fn default() -> Self {
        Workarounds {
            gc_bug: cfg!(feature = "gc-bug"),
            conn_halt: cfg!(feature = "conn-halt-bug"),
        }
    }
}

/// Configuration for one transport-module session.
///
/// Only the module binary is required. The network capabilities are bound by
/// the role front-ends (or directly via
/// `TransportModule::link_network_interface`).
#[derive(Clone)]
pub struct WatmConfig {
    /// The WATM binary (or WAT text, which the engine also accepts).
    pub module_bytes: Vec<u8>,
    /// Optional opaque blob exposed to the guest through `pull_config`.
    pub module_config: Option<ConfigSource>,
    /// Custom dial function for the dialer/relay roles; platform TCP/Unix
    /// dialer when absent.
    pub dial_fn: Option<Arc<DialFn>>,
    /// Network listener; required for the listener and relay roles.
    pub listener: Option<ManagedListener>,
    /// Guest argv.
    pub argv: Vec<String>,
    /// Guest environment.
    pub envv: Vec<(String, String)>,
    /// Inherit the host's stdio streams into the guest.
    pub inherit_stdio: bool,
    /// Pre-opened directories, `(host path, guest path)`.
    pub preopen_dirs: Vec<(PathBuf, String)>,
    /// Force the engine's baseline non-optimizing tier.
    pub force_interpreter: bool,
    /// Engine-bug workaround toggles.
    pub workarounds: Workarounds,
}

impl WatmConfig {
    pub fn new(module_bytes: impl Into<Vec<u8>>) -> Self {
        WatmConfig {
            module_bytes: module_bytes.into(),
            module_config: None,
            dial_fn: None,
            listener: None,
            argv: Vec::new(),
            envv: Vec::new(),
            inherit_stdio: false,
            preopen_dirs: Vec::new(),
            force_interpreter: false,
            workarounds: Workarounds::default(),
        }
    }

    /// Attach a config blob from a file path.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_config = Some(ConfigSource::Path(path.into()));
        self
    }

    /// Attach a config blob directly.
    pub fn with_config_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.module_config = Some(ConfigSource::Bytes(bytes.into()));
        self
    }

    /// Attach the listener for listener/relay sessions.
    pub fn with_listener(mut self, listener: ManagedListener) -> Self {
        self.listener = Some(listener);
        self
    }
}

impl fmt::Debug for WatmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatmConfig")
            .field("module_bytes", &self.module_bytes.len())
            .field("module_config", &self.module_config.is_some())
            .field("dial_fn", &self.dial_fn.is_some())
            .field("listener", &self.listener)
            .field("argv", &self.argv)
            .field("inherit_stdio", &self.inherit_stdio)
            .field("force_interpreter", &self.force_interpreter)
            .field("workarounds", &self.workarounds)
            .finish_non_exhaustive()
    }
}
