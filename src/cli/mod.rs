//! CLI support
//!
//! Exit codes shared by the `hil-harness` binary and anything scripting it.

pub mod exit_codes;

pub use exit_codes::{exit_code_description, print_exit_codes, CliResult, ExitCodes};
