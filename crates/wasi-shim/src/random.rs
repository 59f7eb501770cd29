//! Random number sources
//!
//! A random-fill primitive may return fewer bytes than asked for, or be
//! interrupted by a signal.  `fill_random` turns any such primitive into an
//! exact fill.  The platform primitive is selected here, at the boundary, and
//! nowhere else.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use crate::errno::{errno_to_wasi, ErrNo, ShimResult};
use cfg_if::cfg_if;
use nix::errno::Errno;

/// A source of cryptographically secure random bytes.
pub trait EntropySource {
    /// Fills a prefix of `buffer` and returns its length.  May return fewer
    /// bytes than `buffer.len()`.
    fn fill(&mut self, buffer: &mut [u8]) -> Result<usize, Errno>;
}

/// The random number source of the host operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        impl EntropySource for OsEntropy {
            fn fill(&mut self, buffer: &mut [u8]) -> Result<usize, Errno> {
                // SAFETY: `buffer` is a live, exclusively borrowed region of
                // exactly `buffer.len()` bytes.
                let ret = unsafe {
                    nix::libc::getrandom(buffer.as_mut_ptr() as *mut nix::libc::c_void, buffer.len(), 0)
                };
                Errno::result(ret).map(|n| n as usize)
            }
        }
    } else {
        /// Largest request `getentropy`-style platforms accept at once.
        const ENTROPY_CHUNK: usize = 256;

        impl EntropySource for OsEntropy {
            fn fill(&mut self, buffer: &mut [u8]) -> Result<usize, Errno> {
                let len = buffer.len().min(ENTROPY_CHUNK);
                getrandom::getrandom(&mut buffer[..len]).map_err(|e| {
                    e.raw_os_error().map(Errno::from_i32).unwrap_or(Errno::EIO)
                })?;
                Ok(len)
            }
        }
    }
}

/// Fills all of `buffer` from `source`, retrying on partial fills and on
/// `EINTR`.  Every successful round strictly shrinks what is left, and every
/// other outcome returns, so the loop terminates.
pub fn fill_random(source: &mut dyn EntropySource, buffer: &mut [u8]) -> ShimResult<()> {
    let mut remaining = buffer;
    while !remaining.is_empty() {
        match source.fill(remaining) {
            Ok(n) if n > 0 && n <= remaining.len() => {
                remaining = &mut std::mem::take(&mut remaining)[n..];
            }
            Ok(_) => return Err(ErrNo::Io),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(errno_to_wasi(e)),
        }
    }
    Ok(())
}
