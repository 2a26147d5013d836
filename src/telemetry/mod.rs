//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins when set; otherwise only this crate logs, at the given
//! level. JSON output is meant for log collectors, the plain format for
//! terminals.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. Returns `false` if one was already
/// installed (by an earlier call or by a test harness).
pub fn init_tracing(json: bool, default_level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(default_level)));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.is_ok()
}

fn default_filter(level: &str) -> String {
    format!("packit_dispatch={},tower_http={}", level, level)
}
