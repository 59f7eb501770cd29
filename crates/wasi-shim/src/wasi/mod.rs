//! An implementation of the WASI API on top of host system calls.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

pub mod common;
pub mod linkage;
#[cfg(feature = "wasmtime")]
pub mod wasmtime;
