//! Command Line Interface (CLI) layer for eostack.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the dispatch logic (`runner`) from subcommands to the file-level
//! library API in `eostack::api`.
//!
//! If you are embedding eostack into another application, prefer using
//! the high-level `eostack::api` module instead of calling the CLI code.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
