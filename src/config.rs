//! Process configuration loaded from environment variables.
//!
//! Missing credentials do not abort startup: the server still serves health
//! checks, and requests that need an uninitialized dependency fail with 503.

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address for the HTTP server.
    pub host: String,
    /// Bind port for the HTTP server.
    pub port: u16,
    /// Shared secrets accepted on task submissions. Empty means every
    /// request is rejected (fail-closed).
    pub accepted_secrets: Vec<String>,
    /// Comma-separated CORS origins. `None` or `*` permits all origins.
    pub allowed_origins: Option<String>,
    /// Credential for the generation service.
    pub gemini_api_key: Option<String>,
    /// Generation model id.
    pub gemini_model: String,
    /// GitHub personal access token (needs `repo` scope).
    pub github_token: Option<String>,
    /// GitHub account that owns the created repositories.
    pub github_username: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// - `HOST` / `PORT` - bind address (default `0.0.0.0:8080`)
    /// - `ACCEPTED_SECRETS` - comma-separated submission secrets
    /// - `ALLOW_ORIGINS` - comma-separated CORS origins, `*` for any
    /// - `GEMINI_API_KEY` / `GEMINI_MODEL` - generation service
    /// - `GITHUB_TOKEN` / `GITHUB_USERNAME` - repository host
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            accepted_secrets: std::env::var("ACCEPTED_SECRETS")
                .map(|raw| parse_secret_list(&raw))
                .unwrap_or_default(),
            allowed_origins: std::env::var("ALLOW_ORIGINS").ok(),
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
            gemini_model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
            github_token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
            github_username: std::env::var("GITHUB_USERNAME")
                .ok()
                .filter(|u| !u.is_empty()),
        }
    }
}

/// Split a comma-separated secret list, trimming entries and dropping blanks.
pub fn parse_secret_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
