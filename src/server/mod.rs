//! Upload form and analysis endpoint

use axum::{
    extract::{multipart::Field, DefaultBodyLimit, Multipart, State},
    http::header,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::analysis::MediaAnalysisWorkflow;
use crate::media::{check_admission, MediaFormat, MediaUpload};
use crate::utils::sanitize_filename;

pub mod error;

pub use error::AppError;

/// Room left in the request body limit for multipart framing
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

const UPLOAD_FIELD: &str = "file";

#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<MediaAnalysisWorkflow>,
    pub max_upload_bytes: u64,
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = usize::try_from(state.max_upload_bytes + MULTIPART_OVERHEAD).unwrap_or(usize::MAX);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/analyze", post(analyze))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn serve(state: AppState, bind_address: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .map_err(|e| anyhow::anyhow!("Cannot listen on {}: {}", bind_address, e))?;

    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn index(State(state): State<AppState>) -> Html<String> {
    let accept = MediaFormat::ALL
        .iter()
        .map(|format| format!(".{}", format.as_str()))
        .collect::<Vec<_>>()
        .join(",");

    Html(format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Video/Audio Summarizer</title></head>
<body>
<h1>Video/Audio Summarizer</h1>
<p>Upload a video or audio file up to {limit}. It is transcribed and summarized in five key points with {model}.</p>
<form action="/analyze" method="post" enctype="multipart/form-data">
<input type="file" name="{field}" accept="{accept}" required>
<button type="submit">Generate Transcript and Summary</button>
</form>
</body>
</html>
"#,
        limit = crate::utils::format_file_size(state.max_upload_bytes),
        model = state.workflow.model(),
        field = UPLOAD_FIELD,
        accept = accept,
    ))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "model": state.workflow.model(),
    }))
}

async fn analyze(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let upload = read_upload(&mut multipart, state.max_upload_bytes).await?;

    let format = check_admission(&upload, state.max_upload_bytes)?;
    tracing::info!(
        "Accepted {} ({}, detected {})",
        upload.filename,
        crate::utils::format_file_size(upload.size()),
        upload.effective_content_type()
    );
    tracing::debug!("Recognised format: {}", format.as_str());

    // Detached from the request so a dropped connection still runs cleanup
    let workflow = Arc::clone(&state.workflow);
    let analysis = tokio::spawn(async move { workflow.analyze(&upload).await })
        .await
        .map_err(|e| AppError::Internal(format!("Analysis task failed: {}", e)))??;

    Ok((
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        analysis.text,
    )
        .into_response())
}

/// Pull the upload field out of the form, stopping as soon as it passes the limit
async fn read_upload(multipart: &mut Multipart, max_bytes: u64) -> Result<MediaUpload, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = sanitize_filename(field.file_name().unwrap_or_default());
        let content_type = field.content_type().map(str::to_string);
        let bytes = read_field(field, max_bytes).await?;

        return Ok(MediaUpload::new(bytes, filename, content_type));
    }

    Err(AppError::BadRequest(format!(
        "Missing multipart field '{}'",
        UPLOAD_FIELD
    )))
}

async fn read_field(mut field: Field<'_>, max_bytes: u64) -> Result<Vec<u8>, AppError> {
    let mut bytes = Vec::new();

    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if (bytes.len() + chunk.len()) as u64 > max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File size limit exceeded. Please upload a file smaller than {}",
                crate::utils::format_file_size(max_bytes)
            )));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    let message = err.to_string();
    if message.contains("length limit exceeded") {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(message)
    }
}
