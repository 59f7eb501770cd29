//! Strace-like tracing of host calls.
//!
//! When enabled through `Options::enable_strace`, each host call is logged as
//! one line, e.g. `fd_write(1, "hello\n", 1) = Success`.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use crate::{errno::ShimResult, memory::MemoryHandler};
use log::info;
use std::fmt;

/// How many characters to display from a string or memory buffer.
const BUFFER_DISPLAY_LEN: usize = 32;

pub struct Strace {
    enabled: bool,
    line: String,
    args: usize,
}

/// Convert a vector of bytes into a printable ASCII string.
/// The string may contain readable text, which is useful to display,
/// but it may also contain binary data, so we cannot decode it as UTF-8.
pub fn strace_string(bytes: &[u8], max: usize) -> String {
    let mut res = String::from("\"");
    let n = bytes.len().min(max);
    for i in 0..n {
        let b = bytes[i];
        if (0x20..0x7f).contains(&b) {
            if b == b'\\' || b == b'"' {
                res.push('\\');
            }
            res.push(b as char);
        } else if b == b'\t' {
            res.push_str("\\t")
        } else if b == b'\n' {
            res.push_str("\\n")
        } else if i + 1 < n && bytes[i + 1].is_ascii_digit() {
            // The following character is a digit, so use three octal digits.
            res.push_str(&format!("\\{:03o}", b))
        } else {
            res.push_str(&format!("\\{:o}", b))
        }
    }
    res.push('"');
    if bytes.len() > max {
        res.push_str("...")
    }
    res
}

impl Strace {
    /// Start tracing a call to `name`.
    pub fn func(enabled: bool, name: &str) -> Self {
        let line = if enabled {
            format!("{}(", name)
        } else {
            String::new()
        };
        Strace {
            enabled,
            line,
            args: 0,
        }
    }

    /// Prints a separating comma as required.  Returns `false` when tracing is
    /// off and the argument should be skipped.
    fn arg(&mut self) -> bool {
        if !self.enabled {
            return false;
        }
        if self.args > 0 {
            self.line.push_str(", ");
        }
        self.args += 1;
        true
    }

    /// Argument shown as a decimal value.
    pub fn arg_dec<T: fmt::Display>(&mut self, n: T) {
        if self.arg() {
            self.line.push_str(&n.to_string());
        }
    }

    /// Argument shown as a hexadecimal value.
    pub fn arg_hex<T: fmt::LowerHex>(&mut self, n: T) {
        if self.arg() {
            self.line.push_str(&format!("0x{:x}", n));
        }
    }

    /// Argument that is a memory buffer.
    pub fn arg_buffer(&mut self, memory: &mut dyn MemoryHandler, address: u32, len: u32) {
        if self.arg() {
            let shown = match memory.slice(address, len) {
                Ok(bytes) => strace_string(bytes, BUFFER_DISPLAY_LEN),
                Err(_) => String::from("BAD_MEM_REF"),
            };
            self.line.push_str(&shown);
        }
    }

    /// Argument that is a list of I/O vectors; shows as many of the bytes
    /// they cover as the call stored at `len_address`, or `_` if the call
    /// failed.
    pub fn arg_iovec<T>(
        &mut self,
        result: &ShimResult<T>,
        memory: &mut dyn MemoryHandler,
        base: u32,
        count: u32,
        len_address: u32,
    ) {
        if !self.arg() {
            return;
        }
        if result.is_err() {
            self.line.push('_');
            return;
        }
        let len = memory.read_u32(len_address).unwrap_or(0) as usize;
        // This copies everything, but it's only used for tracing.
        let shown = match memory.copy_iovecs_to_host(base, count) {
            Ok(iovecs) => memory.memory_region().map(|region| {
                let mut bytes = Vec::new();
                for iovec in iovecs.iter() {
                    bytes.extend_from_slice(&region[iovec.range()]);
                }
                bytes.truncate(len);
                strace_string(&bytes, BUFFER_DISPLAY_LEN)
            }),
            Err(e) => Err(e),
        };
        self.line
            .push_str(&shown.unwrap_or_else(|_| String::from("BAD_IOVEC")));
    }

    /// Out-parameter holding a `u32`, shown after the call.
    pub fn arg_p_u32<T>(&mut self, result: &ShimResult<T>, memory: &mut dyn MemoryHandler, address: u32) {
        if !self.arg() {
            return;
        }
        if result.is_err() {
            self.line.push('_');
            return;
        }
        match memory.read_u32(address) {
            Ok(x) => self.line.push_str(&x.to_string()),
            Err(_) => self.line.push_str("BAD_MEM_REF"),
        }
    }

    /// Out-parameter holding a `u64`, shown after the call.
    pub fn arg_p_u64<T>(&mut self, result: &ShimResult<T>, memory: &mut dyn MemoryHandler, address: u32) {
        if !self.arg() {
            return;
        }
        if result.is_err() {
            self.line.push('_');
            return;
        }
        match memory.read_u64(address) {
            Ok(x) => self.line.push_str(&x.to_string()),
            Err(_) => self.line.push_str("BAD_MEM_REF"),
        }
    }

    /// Argument that is not displayed.
    pub fn arg_dots(&mut self) {
        if self.arg() {
            self.line.push_str("...");
        }
    }

    /// Finish the line with the call's outcome and emit it.
    pub fn result<T>(self, result: ShimResult<T>) -> ShimResult<T> {
        if self.enabled {
            match &result {
                Ok(_) => info!("{}) = Success", self.line),
                Err(e) => info!("{}) = {:?}", self.line, e),
            }
        }
        result
    }

    /// Prints the line for a call that does not return to the guest.
    pub fn no_return(self) {
        if self.enabled {
            info!("{}) = ?", self.line);
        }
    }

    #[cfg(test)]
    fn line(&self) -> &str {
        &self.line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errno::ErrNo;

    #[test]
    fn printable_text_is_quoted() {
        assert_eq!(strace_string(b"hello", 32), "\"hello\"");
        assert_eq!(strace_string(b"say \"hi\"\n", 32), "\"say \\\"hi\\\"\\n\"");
    }

    #[test]
    fn binary_data_is_escaped_in_octal() {
        assert_eq!(strace_string(&[0, b'a'], 32), "\"\\0a\"");
        assert_eq!(strace_string(&[1, b'7'], 32), "\"\\0017\"");
        assert_eq!(strace_string(&[0xff], 32), "\"\\377\"");
    }

    #[test]
    fn long_buffers_are_truncated() {
        assert_eq!(strace_string(b"abcdef", 3), "\"abc\"...");
    }

    #[test]
    fn arguments_are_comma_separated() {
        let mut memory = b"hello".to_vec();
        let mut trace = Strace::func(true, "fd_write");
        trace.arg_dec(1);
        trace.arg_buffer(&mut memory, 0, 5);
        trace.arg_hex(255u32);
        trace.arg_dots();
        assert_eq!(trace.line(), "fd_write(1, \"hello\", 0xff, ...");
        assert_eq!(trace.result(Err::<(), _>(ErrNo::BadF)), Err(ErrNo::BadF));
    }

    #[test]
    fn iovecs_show_only_the_transferred_bytes() {
        let mut memory = vec![0u8; 64];
        memory[32..40].copy_from_slice(b"hello, w");
        memory.write_u32(0, 32).unwrap();
        memory.write_u32(4, 8).unwrap();
        memory.write_u32(16, 5).unwrap();
        let mut trace = Strace::func(true, "fd_write");
        trace.arg_iovec(&Ok(()), &mut memory, 0, 1, 16);
        assert_eq!(trace.line(), "fd_write(\"hello\"");

        let mut trace = Strace::func(true, "fd_read");
        trace.arg_iovec(&Err::<(), _>(ErrNo::BadF), &mut memory, 0, 1, 16);
        assert_eq!(trace.line(), "fd_read(_");
    }

    #[test]
    fn disabled_trace_records_nothing() {
        let mut memory = vec![0u8; 4];
        let mut trace = Strace::func(false, "fd_close");
        trace.arg_dec(3);
        trace.arg_buffer(&mut memory, 0, 4);
        assert_eq!(trace.line(), "");
    }
}
