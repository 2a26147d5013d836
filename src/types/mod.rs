//! Core identifier types shared across the dispatcher.

pub mod ids;

pub use ids::{BuildId, CommentId, PrNumber, ProjectUrl, RepoId, Sha};
