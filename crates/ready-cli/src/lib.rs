//! CLI argument models for the bootstrap binary.
//!
//! Every flag also reads a `READY_*` environment variable so build hosts can
//! configure a run without editing `ready.toml`.

pub mod cli_args;
pub mod cli_types;

pub use cli_args::Cli;
pub use cli_types::*;
