//! Foundational low-level utilities shared across the bootstrap crates.
//!
//! Provides atomic file writes, time helpers, executable discovery, and the
//! `CommandRunner` seam every phase uses to reach external tooling.

pub mod atomic_io;
pub mod executable;
pub mod process;
#[cfg(any(test, feature = "test-support"))]
pub mod scripted;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use executable::resolve_executable;
pub use process::{CommandOutcome, CommandRunner, CommandSpec, SystemCommandRunner};
#[cfg(any(test, feature = "test-support"))]
pub use scripted::{ScriptedCommandRunner, ScriptedResponse};
pub use time_utils::{current_unix_timestamp_ms, elapsed_ms};
