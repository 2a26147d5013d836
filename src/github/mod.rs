//! GitHub bindings.
//!
//! - [`GitHubForge`] implements [`Forge`](crate::forge::Forge) over octocrab
//! - [`GitHubConfigResolver`] resolves projects and their job configuration
//!
//! Both bound each request by a timeout and retry transient failures in place.

mod client;
mod error;
mod resolver;

pub use client::GitHubForge;
pub use resolver::{CONFIG_FILE, GitHubConfigResolver, parse_packages_config};
