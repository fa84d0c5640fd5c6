//! Terminal output helpers.

use colored::Colorize;

/// A section header.
pub(crate) fn header(text: &str) -> String {
    text.bold().to_string()
}

/// A success line.
pub(crate) fn success(text: &str) -> String {
    format!("{} {text}", "ok:".green().bold())
}

/// A warning line.
pub(crate) fn warning(text: &str) -> String {
    format!("{} {text}", "warning:".yellow().bold())
}

/// An error line.
pub(crate) fn error(text: &str) -> String {
    format!("{} {text}", "error:".red().bold())
}

/// A dimmed informational line.
pub(crate) fn info(text: &str) -> String {
    text.dimmed().to_string()
}

/// A horizontal separator.
pub(crate) fn separator() -> String {
    "-".repeat(60).dimmed().to_string()
}
