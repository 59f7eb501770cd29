//! A WASI host-call shim
//!
//! Translates the WASI calls of a 32-bit WebAssembly guest into host system
//! calls.  The shim does not execute WebAssembly itself: an embedding runtime
//! lends it the guest's linear memory through `MemoryHandler`, binds the host
//! functions to the guest's imports through `ModuleLinker` (see `link_wasi`),
//! and stops the guest when a call returns `HostCallOutcome::Exit`.
//!
//! Every offset received from the guest is checked against the bounds of its
//! linear memory before it is used, and every host failure is reported to the
//! guest as a WASI error code.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

#[macro_use]
extern crate num_derive;

pub mod errno;
pub mod linker;
pub mod memory;
pub mod options;
pub mod preopen;
pub mod random;
pub mod strace;
pub mod wasi;

pub use errno::{convert_to_errno, errno_to_wasi, ErrNo, ShimResult};
pub use linker::{HostCallOutcome, HostFunction, ImportTable, LinkError, ModuleLinker, Signature, Value, ValueType};
pub use memory::{GuestMemory, MemoryHandler};
pub use options::Options;
pub use preopen::{Preopen, PreopenTable};
pub use wasi::{
    common::{FatalShimError, WasiAPIName, WasiShim},
    linkage::{link_wasi, WASI_IMPORTS, WASI_MODULE_NAMES},
};
#[cfg(feature = "wasmtime")]
pub use wasi::wasmtime::run_program;
