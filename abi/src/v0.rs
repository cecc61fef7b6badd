//! Name and signature tables for the `_water_v0` protocol.
//!
//! The host provides the `env` imports; the guest provides the `_water_*`
//! exports. All parameters and results are i32. A signature is recorded as
//! `(name, i32 param count, i32 result count)` so a loaded module can be
//! checked before any call is made.

/// Import module name for host capabilities.
pub const HOST_MODULE: &str = "env";

/// Dial the managed dialer; returns a descriptor or a negated errno.
pub const IMPORT_HOST_DIAL: &str = "host_dial";
/// Accept from the managed listener; returns a descriptor or a negated errno.
pub const IMPORT_HOST_ACCEPT: &str = "host_accept";
/// Returns a read-only descriptor for the module config blob, or `-ENOENT`.
pub const IMPORT_PULL_CONFIG: &str = "pull_config";
/// Advisory: run host-side deferred cleanups now.
pub const IMPORT_HOST_DEFER: &str = "host_defer";

/// Version sentinel; presence selects the v0 protocol.
pub const EXPORT_VERSION: &str = "_water_v0";
/// One-shot init; may call `pull_config`. Returns 0 or a negated errno.
pub const EXPORT_INIT: &str = "_water_init";
/// Dialer role entry; takes the caller descriptor, returns the network one.
pub const EXPORT_DIAL: &str = "_water_dial";
/// Listener role entry; takes the caller descriptor, returns the source one.
pub const EXPORT_ACCEPT: &str = "_water_accept";
/// Relay role entry; accept + dial happen inside the guest.
pub const EXPORT_ASSOCIATE: &str = "_water_associate";
/// Hands the guest the descriptor it must poll to learn of cancellation.
pub const EXPORT_CANCEL_WITH: &str = "_water_cancel_with";
/// Blocking byte relay; returns 0 or a negated errno on exit.
pub const EXPORT_WORKER: &str = "_water_worker";

/// Prefix shared by all version sentinels (`_water_v0`, `_water_v1`, ...).
pub const VERSION_PREFIX: &str = "_water_v";

/// Exports every v0 module must carry, with `(i32 params, i32 results)`.
///
/// Role entries (`_water_dial`, `_water_accept`, `_water_associate`) are
/// checked lazily when the role is exercised; a module only has to export
/// the ones for the roles it supports.
pub const REQUIRED_EXPORTS: &[(&str, usize, usize)] = &[
    (EXPORT_VERSION, 0, 0),
    (EXPORT_INIT, 0, 1),
    (EXPORT_CANCEL_WITH, 1, 1),
    (EXPORT_WORKER, 0, 1),
];

/// Role entry signatures, checked at call time.
pub const ROLE_EXPORTS: &[(&str, usize, usize)] = &[
    (EXPORT_DIAL, 1, 1),
    (EXPORT_ACCEPT, 1, 1),
    (EXPORT_ASSOCIATE, 0, 1),
];
