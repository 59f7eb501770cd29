//! Runtime options for a guest program.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use crate::{preopen::PreopenTable, wasi::common::FatalShimError};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Runtime options for a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// A list of strings, corresponding to the command-line arguments of the program,
    /// if any.
    pub program_arguments: Vec<String>,
    /// The preopened capabilities, indexed by file descriptor.
    pub preopens: PreopenTable,
    /// Whether clock-related functionality is enabled for the program.  If not
    /// enabled, clock- and time-related WASI host-calls return an unimplemented
    /// status code.
    pub enable_clock: bool,
    /// Whether strace-like output is enabled.
    pub enable_strace: bool,
    /// Whether `proc_exit` terminates the whole host process, instead of
    /// handing the exit code back to the embedding runtime.
    pub terminate_process_on_exit: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            program_arguments: Vec::new(),
            preopens: PreopenTable::default(),
            enable_clock: true,
            enable_strace: false,
            terminate_process_on_exit: false,
        }
    }
}

impl Options {
    /// Parses options from a JSON document.  Missing fields take their
    /// default values.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Options = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Checks the options are usable by a `WasiShim`.
    pub fn validate(&self) -> Result<(), FatalShimError> {
        if !self.preopens.has_standard_streams() {
            return Err(FatalShimError::InvalidConfiguration(String::from(
                "the first three preopen slots must be <stdin>, <stdout> and <stderr>",
            )));
        }
        if self.program_arguments.iter().any(|arg| arg.contains('\0')) {
            return Err(FatalShimError::InvalidConfiguration(String::from(
                "program arguments must not contain NUL bytes",
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        assert_eq!(Options::from_json("{}").unwrap(), Options::default());
    }

    #[test]
    fn fields_are_read() {
        let options = Options::from_json(
            r#"{
                "program_arguments": ["prog", "--verbose"],
                "preopens": [
                    {"name": "<stdin>"}, {"name": "<stdout>"}, {"name": "<stderr>"},
                    {"name": "/tmp"}
                ],
                "enable_clock": false,
                "enable_strace": true
            }"#,
        )
        .unwrap();
        assert_eq!(options.program_arguments, vec!["prog", "--verbose"]);
        assert_eq!(options.preopens.get(3).unwrap().name(), "/tmp");
        assert!(!options.enable_clock);
        assert!(options.enable_strace);
        assert!(!options.terminate_process_on_exit);
    }

    #[test]
    fn bad_preopen_tables_are_refused() {
        assert!(Options::from_json(r#"{"preopens": [{"name": "/"}]}"#).is_err());
    }

    #[test]
    fn nul_in_arguments_is_refused() {
        let options = Options {
            program_arguments: vec![String::from("a\0b")],
            ..Options::default()
        };
        assert!(options.validate().is_err());
    }
}
