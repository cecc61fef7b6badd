//! `water-abi` — the guest/host ABI shared by the WATER runtime and WATM
//! guests.
//!
//! Everything that crosses the WebAssembly boundary is an `i32`; this crate
//! pins down what those integers mean. It provides:
//!
//! - `Errno` — the fixed WATER errno table (1..76), distinct from the host
//!   OS numbering, with translation to and from `std::io::Error`
//! - `AbiError` — decode failures ("unknown WATER errno N")
//! - `v0` — import/export names and signatures of the `_water_v0` protocol
//!
//! The negation convention: 0 is success, a positive return is a descriptor,
//! and a negative return is `-(errno)`. Descriptors and errnos are disjoint
//! namespaces and must never be conflated.

pub mod errno;
pub mod v0;

pub use errno::{AbiError, Errno};
