//! Process-level I/O conventions for the CLI.

pub mod exit_code;

pub use exit_code::ExitCode;
