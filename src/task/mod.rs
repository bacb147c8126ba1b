//! Task domain types: inbound submissions, target identifiers, and the
//! generated file set handed to the publisher.

use serde::{Deserialize, Serialize};

/// A file attached to a task submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
}

/// Inbound task submission.
///
/// `secret` is compared against the server-side allow-list and must never be
/// logged. `round` is unsigned, so the non-negativity invariant holds by
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSubmission {
    pub email: String,
    pub secret: String,
    /// Free-text task name, e.g. "Todo App".
    pub task: String,
    pub round: u32,
    /// Opaque correlation token echoed back in the callback.
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brief: Option<String>,
    /// Ordered requirement strings, possibly empty.
    #[serde(default)]
    pub checks: Vec<String>,
    /// Callback target for the result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_url: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Deterministic slug naming the remote repository for a task/round pair.
///
/// Repeated submissions for the same task and round derive the same
/// identifier, so they update the existing repository instead of creating a
/// duplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetId(String);

impl TargetId {
    /// Derive the identifier: lower-cased task name, spaces replaced with
    /// hyphens, suffixed with the round number.
    pub fn new(task: &str, round: u32) -> Self {
        let slug = task.to_lowercase().replace(' ', "-");
        Self(format!("{}-round-{}", slug, round))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One generated file: relative path plus text content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}

/// Ordered set of generated files, keyed by relative path.
///
/// Order is the order the generation service emitted the files; the publisher
/// commits them in that order. Blank-content entries are kept here and
/// skipped at publish time.
#[derive(Debug, Clone, Default)]
pub struct GeneratedFileSet {
    files: Vec<GeneratedFile>,
}

impl GeneratedFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a file set from a JSON object mapping path -> content.
    ///
    /// Entries with empty paths or non-string values are dropped.
    pub fn from_json_map(map: serde_json::Map<String, serde_json::Value>) -> Self {
        let files = map
            .into_iter()
            .filter(|(path, _)| !path.is_empty())
            .filter_map(|(path, value)| match value {
                serde_json::Value::String(content) => Some(GeneratedFile { path, content }),
                _ => None,
            })
            .collect();
        Self { files }
    }

    pub fn push(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.files.push(GeneratedFile {
            path: path.into(),
            content: content.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeneratedFile> {
        self.files.iter()
    }

    /// File paths in set order.
    pub fn paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.path.as_str()).collect()
    }
}

/// Minimal syntactic email check: one `@`, a non-empty local part, and a
/// domain containing a dot with non-empty labels around it.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty() && !tld.is_empty() && !domain.contains(char::is_whitespace)
}
