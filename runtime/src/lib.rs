//! `water-runtime` — host runtime for WebAssembly Transport Modules.
//!
//! Loads a user-supplied WATM and drives it as a pluggable application-layer
//! protocol handler between a caller-facing endpoint and a network-facing
//! endpoint. It enforces:
//!
//! - **Capability confinement:** the guest reaches the network only through
//!   the bound managed dialer/listener; absent capabilities answer `-EPERM`
//! - **Resource lifetime:** every descriptor's backing socket is retained in
//!   the descriptor table until session teardown, guest closes included
//! - **Single worker:** at most one supervised worker thread per session,
//!   cancelled cooperatively over an in-band socketpair
//! - **Failure isolation:** traps, guest errnos, and cancellation all funnel
//!   into one teardown path that runs exactly once
//!
//! The role front-ends [`WaterDialer`], [`WaterListener`] and [`WaterRelay`]
//! are the usual entry points; [`TransportModule`] is the underlying session
//! state machine.

pub mod bridge;
pub mod bundle;
pub mod cancel;
pub mod chanconn;
pub mod config;
pub mod conn;
pub mod core;
pub mod dialer;
pub mod error;
pub mod host;
pub mod linker;
pub mod listener;
pub mod module;
pub mod net;
pub mod registry;
pub mod relay;
pub mod validation;
pub mod worker;

pub use bundle::Bundle;
pub use chanconn::{channel_pair, ChannelConn};
pub use config::{ConfigSource, WatmConfig, Workarounds};
pub use conn::{Conn, SocketConn};
pub use core::Core;
pub use dialer::WaterDialer;
pub use error::RuntimeError;
pub use listener::WaterListener;
pub use module::{TransportModule, WaterConn};
pub use net::{ManagedDialer, ManagedListener};
pub use registry::Registry;
pub use relay::{RelaySession, WaterRelay};
pub use worker::WorkerOutcome;

pub use water_abi::{AbiError, Errno};
