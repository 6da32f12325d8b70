//! Print-job storage navigator for G-code motion controller firmware.
//!
//! The navigator owns everything between the raw storage driver and the
//! G-code interpreter: directory enumeration over a constrained
//! filesystem, a bounded working-directory stack, a single streaming job
//! session with byte-accurate resume position, and a bounded sub-call
//! stack for job files that invoke other job files. Hardware access goes
//! through the [`backend::StorageBackend`] capability; host-visible
//! output goes through the [`console::Console`] sink. Nothing here
//! allocates.

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod autostart;
pub mod backend;
pub mod command;
pub mod console;
pub mod entry;
pub mod navigator;
pub mod session;
pub mod walker;
pub mod workdir;

#[cfg(test)]
pub(crate) mod testfs;

pub use backend::{ChipSelect, RawRecord, StorageBackend};
pub use console::{Console, NullConsole};
pub use entry::DirEntry;
pub use navigator::{CardNavigator, JobFinish, NavConfig, NavError, QueuedCommand};
pub use session::SessionMode;
pub use walker::{TraversalPolicy, WalkOutcome};

/// Longest absolute path the navigator will track or reconstruct.
pub const PATH_MAX: usize = 160;
/// Formatted 8.3 short name: eight base characters, a dot, three of extension.
pub const SHORT_NAME_MAX: usize = 12;
/// Longest associated long filename carried alongside a directory record.
pub const LONG_NAME_MAX: usize = 64;
/// Working-directory nesting bound; also caps recursive listing depth.
pub const MAX_DIR_DEPTH: usize = 10;
/// How many job files may be suspended waiting on a nested sub-call.
pub const MAX_SUBCALL_DEPTH: usize = 4;
/// Longest command line accepted for streaming into a write session.
pub const WRITE_LINE_MAX: usize = 192;
/// Scratch capacity for console lines that carry a path plus framing text.
pub const LINE_MAX: usize = PATH_MAX + 64;
/// Outbound queue depth for commands handed back to the interpreter.
pub const COMMAND_QUEUE_DEPTH: usize = 4;
