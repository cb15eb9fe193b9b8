use crate::config::ServerConfig;
use crate::models::{AppError, ValidationResult};
use crate::services::report::summary_line;
use crate::services::ValidationService;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::{
    fs,
    io::{AsyncWriteExt, BufWriter},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub engine: Arc<ValidationService>,
}

impl AppState {
    pub fn new(config: ServerConfig, engine: ValidationService) -> Self {
        Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateResponse {
    #[serde(flatten)]
    pub result: ValidationResult,
    pub filename: String,
    pub summary: String,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/validate", post(validate_upload))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Removes its staging directory when the request ends, whatever the outcome.
struct StagedUpload {
    dir: PathBuf,
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove staged upload {}: {}", self.dir.display(), e);
            }
        }
    }
}

async fn validate_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, HandlerError> {
    sweep_stale_uploads(&state.config.upload_dir, state.config.upload_max_age).await;

    let mut field = loop {
        let next = multipart.next_field().await.map_err(|e| {
            let message = format!("Invalid multipart form: {e}");
            bad_request(&message)
        })?;
        match next {
            Some(field) if field.name() == Some("file") => break field,
            Some(_) => continue,
            None => return Err(bad_request("No file uploaded")),
        }
    };

    let original_name = field
        .file_name()
        .map(|name| name.to_string())
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| bad_request("No file selected"))?;
    let safe_name = Path::new(&original_name.replace('\\', "/"))
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
        .ok_or_else(|| bad_request("Invalid file name"))?;

    let is_zip = Path::new(&safe_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if !is_zip {
        warn!("Rejected upload with invalid file type: {}", safe_name);
        return Err(bad_request("Invalid file type - must be ZIP"));
    }

    let staged = StagedUpload {
        dir: state
            .config
            .upload_dir
            .join(Uuid::new_v4().simple().to_string()),
    };
    fs::create_dir_all(&staged.dir)
        .await
        .map_err(internal_error)?;

    let file_path = staged.dir.join(&safe_name);
    let mut file = BufWriter::new(fs::File::create(&file_path).await.map_err(internal_error)?);

    let mut size: u64 = 0;
    while let Some(chunk) = field.chunk().await.map_err(internal_error)? {
        size = size.saturating_add(chunk.len() as u64);
        if size > state.config.max_upload_size {
            let message = format!("File too large (max {})", state.config.max_upload_size_label);
            return Err(payload_too_large(&message));
        }
        file.write_all(&chunk).await.map_err(internal_error)?;
    }
    file.flush().await.map_err(internal_error)?;
    drop(file);

    info!("File uploaded: {} ({} bytes)", safe_name, size);

    let engine = state.engine.clone();
    let input = file_path.clone();
    let timeout = state.config.validation_timeout;
    let outcome = tokio::time::timeout(
        timeout,
        tokio::task::spawn_blocking(move || engine.validate(input)),
    )
    .await;

    let result = match outcome {
        Err(_) => {
            warn!("Validation of {} timed out", safe_name);
            return Err(app_error(&AppError::Timeout(timeout.as_secs())));
        }
        Ok(Err(join_error)) => return Err(internal_error(join_error)),
        Ok(Ok(Err(archive_error))) => {
            warn!("Archive {} rejected: {}", safe_name, archive_error);
            return Err(app_error(&AppError::from(archive_error)));
        }
        Ok(Ok(Ok(result))) => result,
    };

    let status = if result.valid {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    let summary = format!(
        "{} for {}",
        summary_line(
            result.valid,
            result.shapefiles.len(),
            result.error_count(),
            result.warning_count()
        ),
        safe_name
    );

    info!("{}", summary);

    let body = ValidateResponse {
        result,
        filename: safe_name,
        summary,
    };
    Ok((status, Json(body)).into_response())
}

/// Deletes staged uploads left behind by earlier requests.
pub async fn sweep_stale_uploads(upload_dir: &Path, max_age: std::time::Duration) {
    let Ok(max_age) = chrono::Duration::from_std(max_age) else {
        return;
    };
    let cutoff = Utc::now() - max_age;

    let mut entries = match fs::read_dir(upload_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            error!("Error during cleanup of {}: {}", upload_dir.display(), e);
            return;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if DateTime::<Utc>::from(modified) >= cutoff {
            continue;
        }

        let path = entry.path();
        let removed = if metadata.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        match removed {
            Ok(()) => info!("Cleaned up stale upload: {}", path.display()),
            Err(e) => warn!("Failed to clean up {}: {}", path.display(), e),
        }
    }
}

fn app_error(err: &AppError) -> HandlerError {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorResponse {
            error: err.message(),
            category: Some(err.category().to_string()),
        }),
    )
}

fn bad_request(message: &str) -> HandlerError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
            category: None,
        }),
    )
}

fn payload_too_large(message: &str) -> HandlerError {
    (
        StatusCode::PAYLOAD_TOO_LARGE,
        Json(ErrorResponse {
            error: message.to_string(),
            category: Some("too-large".to_string()),
        }),
    )
}

fn internal_error<E: std::fmt::Debug>(err: E) -> HandlerError {
    error!("Internal error: {:?}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Internal Server Error".to_string(),
            category: None,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn sweep_removes_only_stale_entries() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("old")).await.unwrap();
        fs::write(dir.path().join("old").join("a.zip"), b"x")
            .await
            .unwrap();

        sweep_stale_uploads(dir.path(), Duration::from_secs(3600)).await;
        assert!(dir.path().join("old").exists());

        tokio::time::sleep(Duration::from_millis(20)).await;
        sweep_stale_uploads(dir.path(), Duration::from_millis(1)).await;
        assert!(!dir.path().join("old").exists());
    }

    #[tokio::test]
    async fn sweep_tolerates_missing_directory() {
        let dir = TempDir::new().unwrap();
        sweep_stale_uploads(&dir.path().join("nope"), Duration::from_secs(1)).await;
    }

    #[test]
    fn archive_errors_map_to_client_statuses() {
        let (status, Json(body)) = app_error(&AppError::from(
            crate::models::ArchiveError::UnsafePath("../x".into()),
        ));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.category.as_deref(), Some("unsafe-path"));

        let (status, _) = app_error(&AppError::Timeout(3));
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    }
}
