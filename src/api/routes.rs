//! HTTP route handlers and request orchestration.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::HeaderValue,
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::github::{GitHubPublisher, RepoPublisher};
use crate::llm::{AppGenerator, GeminiClient};
use crate::notify::{CallbackNotifier, CallbackPayload, ResultNotifier};
use crate::task::{self, TargetId, TaskSubmission};

use super::error::ApiError;
use super::types::{HealthResponse, TaskAck};

/// Shared application state.
///
/// The dependency clients are built once at startup and shared read-only
/// across requests. A dependency left `None` (missing credentials) keeps the
/// server up; requests that need it fail with 503.
pub struct AppState {
    pub config: Config,
    pub generator: Option<Arc<dyn AppGenerator>>,
    pub publisher: Option<Arc<dyn RepoPublisher>>,
    pub notifier: Arc<dyn ResultNotifier>,
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let generator: Option<Arc<dyn AppGenerator>> = match &config.gemini_api_key {
        Some(key) => Some(Arc::new(GeminiClient::new(
            key.clone(),
            config.gemini_model.clone(),
        ))),
        None => {
            tracing::error!("LLM initialization failed - GEMINI_API_KEY is not set");
            None
        }
    };

    let publisher: Option<Arc<dyn RepoPublisher>> =
        match (&config.github_token, &config.github_username) {
            (Some(token), Some(username)) => Some(Arc::new(GitHubPublisher::new(
                token.clone(),
                username.clone(),
            ))),
            _ => {
                tracing::error!(
                    "GitHub initialization failed - GITHUB_TOKEN or GITHUB_USERNAME is not set"
                );
                None
            }
        };

    let cors = cors_layer(&config);
    let addr = format!("{}:{}", config.host, config.port);

    let state = Arc::new(AppState {
        config,
        generator,
        publisher,
        notifier: Arc::new(CallbackNotifier::new()),
    });

    let app = router(state).layer(cors).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Build the application router.
fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/tasks", post(submit_task))
        .with_state(state)
}

/// CORS policy from configuration; permissive unless origins are restricted.
fn cors_layer(config: &Config) -> CorsLayer {
    match config.allowed_origins.as_deref() {
        None | Some("*") => CorsLayer::permissive(),
        Some(list) => {
            let origins: Vec<HeaderValue> = list
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}

/// Wait for a shutdown signal (ctrl-c or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Receive a task submission.
async fn submit_task(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<TaskSubmission>,
) -> Result<Json<TaskAck>, ApiError> {
    process_submission(&state, submission).await.map(Json)
}

/// Drive one submission through generation, publish, and callback.
///
/// The three dependency calls are strictly sequential. Callback delivery is
/// best-effort: it is awaited (so `time_taken` covers it) but its outcome
/// never changes the acknowledgement.
pub(crate) async fn process_submission(
    state: &AppState,
    submission: TaskSubmission,
) -> Result<TaskAck, ApiError> {
    if !task::is_valid_email(&submission.email) {
        return Err(ApiError::Validation(format!(
            "invalid email address: {}",
            submission.email
        )));
    }

    authorize(&state.config.accepted_secrets, &submission.secret)?;

    let generator = state
        .generator
        .as_ref()
        .ok_or(ApiError::ServiceUnavailable("LLM"))?;
    let publisher = state
        .publisher
        .as_ref()
        .ok_or(ApiError::ServiceUnavailable("GitHub publisher"))?;

    tracing::info!(
        "Processing request for task: {}, round: {}",
        submission.task,
        submission.round
    );
    let start = Instant::now();

    let target = TargetId::new(&submission.task, submission.round);

    let files = generator
        .generate_app(&submission)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if files.is_empty() {
        return Err(ApiError::Internal(
            "LLM failed to generate any files.".to_string(),
        ));
    }
    tracing::info!("Generated files for task ID: {}: {:?}", target, files.paths());

    let publish = publisher
        .publish(&target, &files)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let final_url = if publish.pages_url.is_empty() {
        publish.repo_url.clone()
    } else {
        publish.pages_url.clone()
    };

    match submission.evaluation_url.as_deref().filter(|u| !u.is_empty()) {
        Some(evaluation_url) => {
            let payload = CallbackPayload::new(&submission, &publish);
            state.notifier.notify(evaluation_url, &payload).await;
        }
        None => {
            tracing::warn!("No evaluation URL on submission; skipping callback");
        }
    }

    Ok(TaskAck {
        status: "success".to_string(),
        message: format!(
            "Code generated and deployed successfully to new repository: {}",
            publish.repo_url
        ),
        commit_url: final_url,
        evaluation_url: submission.evaluation_url,
        time_taken: format!("{:.2} seconds", start.elapsed().as_secs_f64()),
    })
}

/// Check the submitted secret against the allow-list.
///
/// An empty allow-list rejects everything: fail-closed, never fail-open.
fn authorize(accepted_secrets: &[String], secret: &str) -> Result<(), ApiError> {
    if accepted_secrets.is_empty() {
        return Err(ApiError::Unauthorized("No server-side secret configured"));
    }
    if accepted_secrets.iter().any(|s| constant_time_eq(s, secret)) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("Invalid secret"))
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    if a_bytes.len() != b_bytes.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for i in 0..a_bytes.len() {
        diff |= a_bytes[i] ^ b_bytes[i];
    }
    diff == 0
}
