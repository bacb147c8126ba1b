//! GitHub publisher: repository creation, file commits, and Pages hosting.
//!
//! Publishing is idempotent by convergence: the repository name is derived
//! deterministically from the target identifier, creation falls back to
//! reuse when the name is taken, and per-file commits update existing
//! content. File updates carry the current blob sha as a compare-and-swap
//! precondition; a stale sha surfaces as [`PublishError::Conflict`].

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::task::{GeneratedFile, GeneratedFileSet, TargetId};

const GITHUB_API_BASE: &str = "https://api.github.com";

/// Errors from the repository host.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("{path} changed on the remote between read and write")]
    Conflict { path: String },

    #[error("request to GitHub failed: {0}")]
    Network(#[from] reqwest::Error),
}

/// Outcome of a publish: where the code lives and where it is served.
#[derive(Debug, Clone)]
pub struct PublishResult {
    /// Canonical repository URL.
    pub repo_url: String,
    /// Sha of the last commit made across all files; empty when every file
    /// was skipped.
    pub commit_sha: String,
    /// Deterministic Pages URL, returned regardless of enablement outcome.
    pub pages_url: String,
    /// Whether the host confirmed Pages hosting (created or already active).
    pub pages_confirmed: bool,
}

/// Trait for repository publishers.
#[async_trait]
pub trait RepoPublisher: Send + Sync {
    async fn publish(
        &self,
        target: &TargetId,
        files: &GeneratedFileSet,
    ) -> Result<PublishResult, PublishError>;
}

/// Publisher backed by the GitHub REST v3 API.
pub struct GitHubPublisher {
    client: Client,
    token: String,
    username: String,
    api_base: String,
}

impl GitHubPublisher {
    /// Create a publisher against the public GitHub API.
    pub fn new(token: String, username: String) -> Self {
        Self::with_api_base(token, username, GITHUB_API_BASE.to_string())
    }

    /// Create a publisher against a custom API base URL.
    pub fn with_api_base(token: String, username: String, api_base: String) -> Self {
        let client = Client::builder()
            .user_agent(concat!("pageforge/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            token,
            username,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Remote repository name for a target identifier.
    pub fn repo_name(target: &TargetId) -> String {
        format!("llm-app-{}", target.as_str().to_lowercase())
    }

    /// Pages URL convention: fixed and predictable for a given account and
    /// repository, independent of enablement confirmation.
    fn pages_url(&self, repo_name: &str) -> String {
        format!("https://{}.github.io/{}/", self.username, repo_name)
    }

    fn repo_api(&self, repo_name: &str) -> String {
        format!("{}/repos/{}/{}", self.api_base, self.username, repo_name)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Accept", "application/vnd.github.v3+json")
            .header("Authorization", format!("token {}", self.token))
    }

    /// Create the repository, or fetch it when the name is already taken.
    async fn create_or_get_repo(
        &self,
        repo_name: &str,
        target: &TargetId,
    ) -> Result<RepoInfo, PublishError> {
        let body = serde_json::json!({
            "name": repo_name,
            "description": format!("LLM generated code for task {}", target),
            "private": false,
        });

        let resp = self
            .request(reqwest::Method::POST, format!("{}/user/repos", self.api_base))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if status.is_success() {
            tracing::info!("Created repository: {}", repo_name);
            return parse_json(&status, &text);
        }

        if !is_name_already_exists(status, &text) {
            return Err(PublishError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        tracing::info!("Repository already exists: {}. Updating files...", repo_name);

        let resp = self
            .request(reqwest::Method::GET, self.repo_api(repo_name))
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(PublishError::Api {
                status: status.as_u16(),
                message: text,
            });
        }
        parse_json(&status, &text)
    }

    /// Best-effort check that a `main` ref exists. Absence (or any other
    /// failure) is tolerated: the host creates the branch on first commit.
    async fn check_main_branch(&self, repo_name: &str) {
        let url = format!("{}/git/ref/heads/main", self.repo_api(repo_name));
        match self.request(reqwest::Method::GET, url).send().await {
            Ok(resp) if resp.status() == StatusCode::NOT_FOUND => {
                tracing::debug!("No main ref on {} yet; created on first commit", repo_name);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("Branch check on {} failed: {}", repo_name, e);
            }
        }
    }

    /// Current state of a file on `main`, or `None` when it does not exist.
    async fn get_file(
        &self,
        repo_name: &str,
        path: &str,
    ) -> Result<Option<RemoteFile>, PublishError> {
        let url = format!(
            "{}/contents/{}?ref=main",
            self.repo_api(repo_name),
            encode_path(path)
        );

        let resp = self.request(reqwest::Method::GET, url).send().await?;
        let status = resp.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(PublishError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        Ok(Some(parse_json(&status, &text)?))
    }

    /// Create or update one file on `main`; returns the resulting commit sha.
    ///
    /// `current_sha` is the optimistic-concurrency precondition: when set,
    /// the host rejects the write with 409 if the file changed since the
    /// sha was read.
    async fn put_file(
        &self,
        repo_name: &str,
        file: &GeneratedFile,
        current_sha: Option<&str>,
        target: &TargetId,
    ) -> Result<String, PublishError> {
        let message = match current_sha {
            Some(_) => format!("Update {} for task {}", file.path, target),
            None => format!("Initial commit of {} for task {}", file.path, target),
        };

        let mut body = serde_json::json!({
            "message": message,
            "content": BASE64.encode(file.content.as_bytes()),
            "branch": "main",
        });
        if let Some(sha) = current_sha {
            body["sha"] = serde_json::Value::String(sha.to_string());
        }

        let url = format!("{}/contents/{}", self.repo_api(repo_name), encode_path(&file.path));
        let resp = self
            .request(reqwest::Method::PUT, url)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::CONFLICT {
            return Err(PublishError::Conflict {
                path: file.path.clone(),
            });
        }

        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(PublishError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let put: PutContentsResponse = parse_json(&status, &text)?;
        Ok(put.commit.sha)
    }

    /// Ask the host to serve `main` at the root path as a static site.
    ///
    /// Returns whether hosting is confirmed active. 409 means it already
    /// was; any other failure is a warning, never a publish failure.
    async fn enable_pages(&self, repo_name: &str) -> bool {
        let body = serde_json::json!({
            "source": { "branch": "main", "path": "/" }
        });

        let result = self
            .request(reqwest::Method::POST, format!("{}/pages", self.repo_api(repo_name)))
            .json(&body)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!("Pages enabled on {} (main branch)", repo_name);
                true
            }
            Ok(resp) if resp.status() == StatusCode::CONFLICT => {
                tracing::info!("Pages already enabled on {}", repo_name);
                true
            }
            Ok(resp) => {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                tracing::warn!("Pages setup on {} failed: {} - {}", repo_name, status, text);
                false
            }
            Err(e) => {
                tracing::warn!("Pages setup on {} failed: {}", repo_name, e);
                false
            }
        }
    }
}

#[async_trait]
impl RepoPublisher for GitHubPublisher {
    async fn publish(
        &self,
        target: &TargetId,
        files: &GeneratedFileSet,
    ) -> Result<PublishResult, PublishError> {
        let repo_name = Self::repo_name(target);

        let repo = self.create_or_get_repo(&repo_name, target).await?;
        self.check_main_branch(&repo_name).await;

        let mut commit_sha = String::new();
        for file in files.iter() {
            if file.content.trim().is_empty() {
                tracing::info!("Skipping empty file: {}", file.path);
                continue;
            }

            let existing = self.get_file(&repo_name, &file.path).await?;
            if let Some(remote) = &existing {
                if remote.matches(&file.content) {
                    tracing::info!("Unchanged file: {}; no commit needed", file.path);
                    continue;
                }
            }

            let current_sha = existing.as_ref().map(|r| r.sha.as_str());
            let sha = self.put_file(&repo_name, file, current_sha, target).await?;
            tracing::info!("Committed {}. SHA: {:.7}", file.path, sha);
            commit_sha = sha;
        }

        let pages_confirmed = self.enable_pages(&repo_name).await;
        let pages_url = self.pages_url(&repo_name);

        Ok(PublishResult {
            repo_url: repo.html_url,
            commit_sha,
            pages_url,
            pages_confirmed,
        })
    }
}

/// Whether a failed repository creation means the name is already taken.
fn is_name_already_exists(status: StatusCode, body: &str) -> bool {
    status == StatusCode::UNPROCESSABLE_ENTITY && body.contains("already exists")
}

/// URL-encode a repository path, preserving `/` separators.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn parse_json<T: serde::de::DeserializeOwned>(
    status: &StatusCode,
    text: &str,
) -> Result<T, PublishError> {
    serde_json::from_str(text).map_err(|e| PublishError::Api {
        status: status.as_u16(),
        message: format!("unexpected response shape: {} - {}", e, text),
    })
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    html_url: String,
}

/// Contents-API view of an existing file: blob sha plus base64 content
/// (absent for blobs the host declines to inline).
#[derive(Debug, Deserialize)]
struct RemoteFile {
    sha: String,
    #[serde(default)]
    content: Option<String>,
}

impl RemoteFile {
    /// Whether the remote content equals `content`. Unknown remote content
    /// counts as a mismatch, forcing a fresh commit.
    fn matches(&self, content: &str) -> bool {
        let Some(encoded) = &self.content else {
            return false;
        };
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        match BASE64.decode(compact.as_bytes()) {
            Ok(bytes) => bytes == content.as_bytes(),
            Err(_) => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    commit: CommitInfo,
}

#[derive(Debug, Deserialize)]
struct CommitInfo {
    sha: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_repo_name_derivation() {
        let target = TargetId::new("Todo App", 0);
        assert_eq!(GitHubPublisher::repo_name(&target), "llm-app-todo-app-round-0");
    }

    #[test]
    fn test_pages_url_convention() {
        let publisher = GitHubPublisher::new("t".to_string(), "octo".to_string());
        assert_eq!(
            publisher.pages_url("llm-app-todo-app-round-0"),
            "https://octo.github.io/llm-app-todo-app-round-0/"
        );
    }

    #[test]
    fn test_encode_path_preserves_separators() {
        assert_eq!(encode_path("assets/app 1.js"), "assets/app%201.js");
        assert_eq!(encode_path("index.html"), "index.html");
    }

    #[test]
    fn test_is_name_already_exists() {
        let body = r#"{"errors": [{"message": "name already exists on this account"}]}"#;
        assert!(is_name_already_exists(StatusCode::UNPROCESSABLE_ENTITY, body));
        assert!(!is_name_already_exists(StatusCode::UNPROCESSABLE_ENTITY, "bad field"));
        assert!(!is_name_already_exists(StatusCode::BAD_REQUEST, body));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Publish flow against an in-memory fake of the GitHub API
    // ─────────────────────────────────────────────────────────────────────

    #[derive(Default)]
    struct FakeHub {
        /// repo name -> (path -> (blob sha, base64 content))
        repos: HashMap<String, HashMap<String, (String, String)>>,
        pages_enabled: HashSet<String>,
        create_calls: usize,
        put_calls: Vec<String>,
        commit_counter: usize,
        force_put_conflict: bool,
        fail_pages: bool,
    }

    type Hub = Arc<Mutex<FakeHub>>;

    async fn create_repo(State(hub): State<Hub>, Json(body): Json<serde_json::Value>) -> impl IntoResponse {
        let name = body["name"].as_str().unwrap_or_default().to_string();
        let mut hub = hub.lock().unwrap();
        hub.create_calls += 1;
        if hub.repos.contains_key(&name) {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({
                    "errors": [{"message": "name already exists on this account"}]
                })),
            );
        }
        hub.repos.insert(name.clone(), HashMap::new());
        (
            StatusCode::CREATED,
            Json(serde_json::json!({"html_url": format!("https://github.test/{}", name)})),
        )
    }

    async fn get_repo(State(hub): State<Hub>, Path((_, repo)): Path<(String, String)>) -> impl IntoResponse {
        let hub = hub.lock().unwrap();
        if hub.repos.contains_key(&repo) {
            (
                StatusCode::OK,
                Json(serde_json::json!({"html_url": format!("https://github.test/{}", repo)})),
            )
        } else {
            (StatusCode::NOT_FOUND, Json(serde_json::json!({"message": "Not Found"})))
        }
    }

    async fn get_ref(Path((_, repo)): Path<(String, String)>, State(hub): State<Hub>) -> impl IntoResponse {
        let hub = hub.lock().unwrap();
        let populated = hub.repos.get(&repo).map(|f| !f.is_empty()).unwrap_or(false);
        if populated {
            (StatusCode::OK, Json(serde_json::json!({"ref": "refs/heads/main"})))
        } else {
            (StatusCode::NOT_FOUND, Json(serde_json::json!({"message": "Not Found"})))
        }
    }

    async fn get_contents(
        State(hub): State<Hub>,
        Path((_, repo, path)): Path<(String, String, String)>,
    ) -> impl IntoResponse {
        let hub = hub.lock().unwrap();
        match hub.repos.get(&repo).and_then(|files| files.get(&path)) {
            Some((sha, content)) => (
                StatusCode::OK,
                Json(serde_json::json!({"sha": sha, "content": content})),
            ),
            None => (StatusCode::NOT_FOUND, Json(serde_json::json!({"message": "Not Found"}))),
        }
    }

    async fn put_contents(
        State(hub): State<Hub>,
        Path((_, repo, path)): Path<(String, String, String)>,
        Json(body): Json<serde_json::Value>,
    ) -> impl IntoResponse {
        let mut hub = hub.lock().unwrap();
        if hub.force_put_conflict {
            return (StatusCode::CONFLICT, Json(serde_json::json!({"message": "is at a different sha"})));
        }

        let stored = hub.repos.get(&repo).and_then(|f| f.get(&path)).cloned();
        let given = body["sha"].as_str().map(|s| s.to_string());
        if let Some((stored_sha, _)) = &stored {
            if given.as_deref() != Some(stored_sha) {
                return (StatusCode::CONFLICT, Json(serde_json::json!({"message": "is at a different sha"})));
            }
        }

        hub.commit_counter += 1;
        let commit = format!("commit-{}", hub.commit_counter);
        let blob = format!("blob-{}", hub.commit_counter);
        let content = body["content"].as_str().unwrap_or_default().to_string();
        hub.put_calls.push(path.clone());
        hub.repos.entry(repo).or_default().insert(path, (blob, content));
        (
            StatusCode::CREATED,
            Json(serde_json::json!({"commit": {"sha": commit}})),
        )
    }

    async fn enable_pages(State(hub): State<Hub>, Path((_, repo)): Path<(String, String)>) -> impl IntoResponse {
        let mut hub = hub.lock().unwrap();
        if hub.fail_pages {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"message": "boom"})));
        }
        if hub.pages_enabled.contains(&repo) {
            (StatusCode::CONFLICT, Json(serde_json::json!({"message": "already enabled"})))
        } else {
            hub.pages_enabled.insert(repo);
            (StatusCode::CREATED, Json(serde_json::json!({"status": "building"})))
        }
    }

    async fn spawn_fake_hub(hub: Hub) -> String {
        let app = Router::new()
            .route("/user/repos", post(create_repo))
            .route("/repos/:owner/:repo", get(get_repo))
            .route("/repos/:owner/:repo/git/ref/heads/main", get(get_ref))
            .route("/repos/:owner/:repo/contents/*path", get(get_contents).put(put_contents))
            .route("/repos/:owner/:repo/pages", post(enable_pages))
            .with_state(hub);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn publisher(base: String) -> GitHubPublisher {
        GitHubPublisher::with_api_base("test-token".to_string(), "octo".to_string(), base)
    }

    fn file_set(entries: &[(&str, &str)]) -> GeneratedFileSet {
        let mut files = GeneratedFileSet::new();
        for (path, content) in entries {
            files.push(*path, *content);
        }
        files
    }

    #[tokio::test]
    async fn test_publish_creates_repo_and_commits_in_order() {
        let hub: Hub = Arc::new(Mutex::new(FakeHub::default()));
        let base = spawn_fake_hub(Arc::clone(&hub)).await;

        let target = TargetId::new("Todo App", 0);
        let files = file_set(&[("index.html", "<html></html>"), ("app.js", "let x;")]);

        let result = publisher(base).publish(&target, &files).await.unwrap();

        assert_eq!(result.repo_url, "https://github.test/llm-app-todo-app-round-0");
        assert_eq!(result.commit_sha, "commit-2");
        assert_eq!(result.pages_url, "https://octo.github.io/llm-app-todo-app-round-0/");
        assert!(result.pages_confirmed);

        let hub = hub.lock().unwrap();
        assert_eq!(hub.put_calls, vec!["index.html", "app.js"]);
    }

    #[tokio::test]
    async fn test_publish_twice_reuses_repository() {
        let hub: Hub = Arc::new(Mutex::new(FakeHub::default()));
        let base = spawn_fake_hub(Arc::clone(&hub)).await;

        let target = TargetId::new("Todo App", 0);
        let files = file_set(&[("index.html", "<html></html>")]);
        let publisher = publisher(base);

        publisher.publish(&target, &files).await.unwrap();
        let unchanged = publisher.publish(&target, &files).await.unwrap();

        // Identical content: the repository is reused and no new commit is made.
        {
            let hub = hub.lock().unwrap();
            assert_eq!(hub.repos.len(), 1, "second publish must not create a new repo");
            assert_eq!(hub.create_calls, 2);
            assert_eq!(hub.put_calls, vec!["index.html"]);
        }
        assert!(unchanged.commit_sha.is_empty());
        assert!(unchanged.pages_confirmed, "409 from pages means already enabled");

        // Changed content goes through the update path with the current sha.
        let changed = file_set(&[("index.html", "<html>v2</html>")]);
        let third = publisher.publish(&target, &changed).await.unwrap();
        assert_eq!(third.commit_sha, "commit-2");
        assert_eq!(
            hub.lock().unwrap().put_calls,
            vec!["index.html", "index.html"]
        );
    }

    #[tokio::test]
    async fn test_publish_skips_blank_files() {
        let hub: Hub = Arc::new(Mutex::new(FakeHub::default()));
        let base = spawn_fake_hub(Arc::clone(&hub)).await;

        let target = TargetId::new("Todo App", 1);
        let files = file_set(&[("empty.txt", "   \n"), ("index.html", "<html></html>")]);

        let result = publisher(base).publish(&target, &files).await.unwrap();

        assert_eq!(result.commit_sha, "commit-1");
        let hub = hub.lock().unwrap();
        assert_eq!(hub.put_calls, vec!["index.html"]);
    }

    #[tokio::test]
    async fn test_publish_with_all_files_blank_is_degenerate_success() {
        let hub: Hub = Arc::new(Mutex::new(FakeHub::default()));
        let base = spawn_fake_hub(Arc::clone(&hub)).await;

        let target = TargetId::new("Todo App", 2);
        let files = file_set(&[("a.txt", ""), ("b.txt", "  ")]);

        let result = publisher(base).publish(&target, &files).await.unwrap();
        assert!(result.commit_sha.is_empty());
        assert!(hub.lock().unwrap().repos.contains_key("llm-app-todo-app-round-2"));
    }

    #[tokio::test]
    async fn test_remote_conflict_propagates() {
        let hub: Hub = Arc::new(Mutex::new(FakeHub {
            force_put_conflict: true,
            ..FakeHub::default()
        }));
        let base = spawn_fake_hub(Arc::clone(&hub)).await;

        let target = TargetId::new("Todo App", 0);
        let files = file_set(&[("index.html", "<html></html>")]);

        let err = publisher(base).publish(&target, &files).await.unwrap_err();
        match err {
            PublishError::Conflict { path } => assert_eq!(path, "index.html"),
            other => panic!("expected Conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pages_failure_does_not_fail_publish() {
        let hub: Hub = Arc::new(Mutex::new(FakeHub {
            fail_pages: true,
            ..FakeHub::default()
        }));
        let base = spawn_fake_hub(Arc::clone(&hub)).await;

        let target = TargetId::new("Todo App", 0);
        let files = file_set(&[("index.html", "<html></html>")]);

        let result = publisher(base).publish(&target, &files).await.unwrap();
        assert!(!result.pages_confirmed);
        assert_eq!(result.pages_url, "https://octo.github.io/llm-app-todo-app-round-0/");
    }
}
