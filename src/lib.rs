//! # PageForge
//!
//! A webhook-driven service that turns task briefs into deployed static web apps.
//!
//! This library provides:
//! - An HTTP API for task submission and health checks
//! - LLM-backed generation of static application files
//! - Publishing to GitHub repositories with Pages hosting enabled
//! - Result delivery to a caller-supplied callback URL with bounded retry
//!
//! ## Task Flow
//! 1. Receive a task submission via the API and authenticate it
//! 2. Ask the generation model for a file map (path -> content)
//! 3. Create or reuse the target repository and commit each file
//! 4. Enable Pages hosting and post the result to the evaluation URL
//! 5. Return the acknowledgement
//!
//! ## Modules
//! - `api`: HTTP surface and request orchestration
//! - `config`: environment-derived configuration
//! - `task`: submission and generated-file types
//! - `llm`: generation client (Gemini)
//! - `github`: repository publisher
//! - `notify`: callback delivery with retry

pub mod api;
pub mod config;
pub mod github;
pub mod llm;
pub mod notify;
pub mod task;

pub use config::Config;
