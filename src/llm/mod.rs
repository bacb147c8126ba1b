//! Generation client module.
//!
//! This module provides a trait-based abstraction over the app generation
//! service, with Gemini as the primary implementation. Generation is a single
//! best-effort call; there is no retry at this layer.

mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use thiserror::Error;

use crate::task::{GeneratedFileSet, TaskSubmission};

/// Errors from the generation service.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation service error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("request to generation service failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("could not parse generated output: {0}")]
    InvalidOutput(String),
}

/// Trait for app generation clients.
///
/// Implementations turn a task submission into a mapping of relative file
/// path to file content. An empty set is a valid (if useless) outcome; the
/// caller decides whether to treat it as a failure.
#[async_trait]
pub trait AppGenerator: Send + Sync {
    async fn generate_app(
        &self,
        submission: &TaskSubmission,
    ) -> Result<GeneratedFileSet, GenerationError>;
}
