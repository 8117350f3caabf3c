//! # CLI
//!
//! The only place that knows about the process: arguments, the tracing
//! subscriber, the tokio runtime, stdout and exit codes.
//!
//! - `setup`: argument parsing via clap
//! - `commands`: dispatch of `serve` and `config`

mod commands;
pub mod setup;

pub use commands::run;
