//! Preopened capabilities.
//!
//! The file descriptors a guest may use without opening them first.  The
//! table is indexed by file descriptor.  Slots 0, 1 and 2 always describe the
//! standard streams; they are not directories and so are never resolvable as
//! preopens.  Directory capabilities follow from descriptor 3 onwards.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use crate::errno::{ErrNo, ShimResult};
use serde::{Deserialize, Serialize};

/// The only preopen type WASI defines.
pub const PREOPENTYPE_DIR: u32 = 0;

/// The first descriptor a guest may resolve through the table.
pub const FIRST_PREOPEN_FD: u32 = 3;

/// Names of the three standard stream slots.
pub const STANDARD_STREAMS: [&str; 3] = ["<stdin>", "<stdout>", "<stderr>"];

/// A single preopened capability, identified by a descriptive name rather
/// than a path lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preopen {
    name: String,
}

impl Preopen {
    #[inline]
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self { name: name.into() }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Length of the name in bytes, as reported to the guest.
    #[inline]
    pub fn name_len(&self) -> u32 {
        self.name.len() as u32
    }
}

/// The ordered, immutable table of preopens handed to a `WasiShim`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreopenTable {
    entries: Vec<Preopen>,
}

impl Default for PreopenTable {
    /// The standard streams and nothing else.
    fn default() -> Self {
        Self {
            entries: STANDARD_STREAMS.iter().map(|s| Preopen::new(*s)).collect(),
        }
    }
}

impl PreopenTable {
    /// Appends a directory capability at the next free descriptor.
    pub fn with_directory<T: Into<String>>(mut self, name: T) -> Self {
        self.entries.push(Preopen::new(name));
        self
    }

    /// Number of slots, including the standard streams.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks the first three slots hold the standard streams.  Tables read
    /// from configuration must pass this before use.
    pub fn has_standard_streams(&self) -> bool {
        self.entries.len() >= STANDARD_STREAMS.len()
            && self
                .entries
                .iter()
                .zip(STANDARD_STREAMS.iter())
                .all(|(entry, name)| entry.name() == *name)
    }

    /// Resolves `fd` to its preopen.  Only descriptors in
    /// `[FIRST_PREOPEN_FD, len)` resolve; everything else is `ErrNo::BadF`.
    pub fn get(&self, fd: u32) -> ShimResult<&Preopen> {
        if fd < FIRST_PREOPEN_FD {
            return Err(ErrNo::BadF);
        }
        self.entries.get(fd as usize).ok_or(ErrNo::BadF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_resolves_nothing() {
        let table = PreopenTable::default();
        assert_eq!(table.len(), 3);
        assert!(table.has_standard_streams());
        for fd in 0..8 {
            assert_eq!(table.get(fd), Err(ErrNo::BadF));
        }
    }

    #[test]
    fn directories_land_after_the_standard_streams() {
        let table = PreopenTable::default()
            .with_directory("/tmp")
            .with_directory("./");
        assert_eq!(table.get(2), Err(ErrNo::BadF));
        assert_eq!(table.get(3).map(Preopen::name), Ok("/tmp"));
        assert_eq!(table.get(4).map(Preopen::name_len), Ok(2));
        assert_eq!(table.get(5), Err(ErrNo::BadF));
    }

    #[test]
    fn tables_missing_standard_streams_are_detected() {
        let table: PreopenTable = serde_json::from_str(r#"[{"name": "/tmp"}]"#).unwrap();
        assert!(!table.has_standard_streams());
    }
}
