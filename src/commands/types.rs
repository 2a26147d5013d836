//! Command types for `/packit` comment commands.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A parsed `<prefix> <command> [args]` line from a comment.
///
/// The command name is kept verbatim; whether it is known is decided by the
/// handler registry, not by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Command {
    /// The command word, e.g. `build` or `koji-tag`.
    pub name: String,

    /// Whitespace-separated arguments following the command word.
    pub args: Vec<String>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Command {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// `koji-tag` restricts downstream re-triggering to side-tag builds.
    pub fn is_koji_tag(&self) -> bool {
        self.name == "koji-tag"
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}
