//! API request/response types.

use serde::{Deserialize, Serialize};

/// Health check response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Synchronous acknowledgement for a processed task submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAck {
    pub status: String,
    /// Human-readable summary embedding the repository URL.
    pub message: String,
    /// Final output URL: the Pages site when available, the repository
    /// otherwise.
    pub commit_url: String,
    pub evaluation_url: Option<String>,
    /// Elapsed wall-clock time, two decimal places with a unit suffix.
    pub time_taken: String,
}
