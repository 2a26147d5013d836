//! Command parsing for comment commands.
//!
//! Users drive the bot from pull-request, issue and commit comments with
//! lines of the form `<prefix> <command> [args]`. The prefix depends on the
//! deployment (`/packit` in production, `/packit-stg` in staging).
//!
//! Which commands exist is decided by the handler registry; a command no
//! handler registered for selects nothing.
//!
//! # Example
//!
//! ```
//! use packit_dispatch::commands::{parse_command, Command};
//!
//! let comment = "Rebuilding after the chroot fix.\n\n/packit copr-build";
//! assert_eq!(parse_command(comment, "/packit"), Some(Command::new("copr-build")));
//! ```

mod parser;
mod types;

pub use parser::parse_command;
pub use types::Command;
