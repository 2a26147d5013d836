//! Comment command parsing.
//!
//! Pure string handling: no knowledge of handlers or jobs lives here. The
//! registry decides what a parsed [`Command`] name means.

use super::types::Command;

/// Parses the first command line found in comment text.
///
/// * `text` - Raw comment body
/// * `prefix` - The deployment's command prefix (e.g., `"/packit"` or `"/packit-stg"`)
///
/// # Parsing Rules
///
/// - Comments are scanned line by line; blank lines are skipped
/// - A command line starts with the prefix as a whole word, compared exactly
///   (so `/packit-stg` never answers `/packit` and vice versa)
/// - The prefix must be followed by at least one more word, the command name
/// - Whitespace between tokens is flexible (spaces, tabs)
/// - The first command line wins, later ones are ignored
/// - Returns `None` if no command line is found
///
/// # Examples
///
/// ```
/// use packit_dispatch::commands::{parse_command, Command};
///
/// assert_eq!(parse_command("/packit build", "/packit"), Some(Command::new("build")));
/// assert_eq!(
///     parse_command("LGTM\n/packit test --identifier fedora", "/packit"),
///     Some(Command::new("test").with_args(["--identifier", "fedora"]))
/// );
/// assert_eq!(parse_command("/packit", "/packit"), None);
/// assert_eq!(parse_command("/packit-stg build", "/packit"), None);
/// ```
pub fn parse_command(text: &str, prefix: &str) -> Option<Command> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find_map(|line| try_parse_line(line, prefix))
}

/// Attempts to parse a single trimmed line as `<prefix> <command> [args]`.
fn try_parse_line(line: &str, prefix: &str) -> Option<Command> {
    let (mark, rest) = split_first_word(line);
    if mark != prefix {
        return None;
    }

    let mut words = rest.split_ascii_whitespace();
    let name = words.next()?;
    Some(Command {
        name: name.to_string(),
        args: words.map(str::to_string).collect(),
    })
}

/// `(first word, remainder)`; the remainder keeps its leading whitespace.
fn split_first_word(text: &str) -> (&str, &str) {
    match text.find(|c: char| c.is_ascii_whitespace()) {
        Some(pos) => (&text[..pos], &text[pos..]),
        None => (text, ""),
    }
}
