//! Classification of octocrab failures into [`ForgeError`]s.
//!
//! - **Transient**: 5xx, 429, 403 caused by rate limiting, connection problems,
//!   and responses that ask the caller to try again
//! - **Permanent**: every other 4xx and anything unrecognized

use crate::forge::{ForgeError, ForgeErrorKind};

/// Turns an octocrab error raised by `operation` into a [`ForgeError`].
pub(crate) fn classify(operation: &str, err: octocrab::Error) -> ForgeError {
    let text = err.to_string();
    let status_code = match &err {
        octocrab::Error::GitHub { source, .. } => Some(source.status_code.as_u16()),
        _ => extract_status_code(&text),
    };

    let kind = if is_transient_message(&text) {
        ForgeErrorKind::Transient
    } else {
        match status_code {
            Some(429) => ForgeErrorKind::Transient,
            Some(403) if is_rate_limit_error(&text) => ForgeErrorKind::Transient,
            Some(code) if (500..600).contains(&code) => ForgeErrorKind::Transient,
            Some(_) => ForgeErrorKind::Permanent,
            None if is_network_error(&text) => ForgeErrorKind::Transient,
            None => ForgeErrorKind::Permanent,
        }
    };

    let message = format!("{}: {}", operation, text);
    let error = match kind {
        ForgeErrorKind::Transient => ForgeError::transient(message),
        ForgeErrorKind::Permanent => ForgeError::permanent(message),
    };
    let error = match status_code {
        Some(code) => error.with_status(code),
        None => error,
    };
    error.with_source(err)
}

/// Extracts the HTTP status code from a rendered error message, for error
/// variants that do not carry a structured GitHub response.
fn extract_status_code(text: &str) -> Option<u16> {
    if let Some(idx) = text.find("status: ") {
        let digits: String = text[idx + 8..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let Ok(code) = digits.parse() {
            return Some(code);
        }
    }

    let lower = text.to_lowercase();
    if text.contains("404") && lower.contains("not found") {
        return Some(404);
    }
    [422, 403, 401, 429, 500, 502, 503]
        .into_iter()
        .find(|code| text.contains(&code.to_string()))
}

fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("try again") || lower.contains("server error")
}

fn is_rate_limit_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("rate limit")
        || lower.contains("api rate")
        || lower.contains("secondary rate")
        || lower.contains("abuse detection")
}

fn is_network_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("timeout")
        || lower.contains("connection")
        || lower.contains("network")
        || lower.contains("dns")
        || lower.contains("timed out")
}
