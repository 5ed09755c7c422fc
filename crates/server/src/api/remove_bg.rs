//! `POST /remove-bg`: upload an image, get it back without its background.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use cutout_core::{
    JobHandle, JobMetadata, JobOutcome, JobRequest, OutputFormat, RejectReason, TransformOptions,
};

use crate::state::AppState;

/// Multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";

/// Seconds a client should wait before retrying a busy response.
pub const RETRY_AFTER_SECS: u64 = 5;

pub const JOB_ID_HEADER: HeaderName = HeaderName::from_static("x-job-id");
pub const PROCESSING_TIME_HEADER: HeaderName = HeaderName::from_static("x-processing-time-ms");

// ============================================================================
// Error responses
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// An error response with a stable machine-readable code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    retry_after: Option<u64>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_input", message)
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            format!("Image exceeds the {} byte limit", limit),
        )
    }

    pub fn busy(reason: RejectReason) -> Self {
        let message = match reason {
            RejectReason::Busy { .. } => format!("Server is busy: {}. Try again shortly.", reason),
            RejectReason::ShuttingDown => format!("Server is unavailable: {}.", reason),
        };
        Self {
            retry_after: Some(RETRY_AFTER_SECS),
            ..Self::new(StatusCode::SERVICE_UNAVAILABLE, "server_busy", message)
        }
    }

    pub fn processing_failed(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "processing_failed",
            message,
        )
    }

    pub fn storage_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Maps a multipart read failure, keeping the body-limit status.
    fn from_multipart(error: MultipartError, limit: usize) -> Self {
        if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::payload_too_large(limit)
        } else {
            Self::invalid_input(format!("Malformed multipart body: {}", error.body_text()))
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.code.to_string(),
            message: self.message,
        });
        let mut response = (self.status, body).into_response();
        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

// ============================================================================
// Upload parsing
// ============================================================================

/// A validated upload, still in memory.
#[derive(Debug)]
struct Upload {
    bytes: Vec<u8>,
    file_name: String,
    mime_type: String,
    options: TransformOptions,
}

fn parse_format(text: &str) -> Result<OutputFormat, ApiError> {
    text.trim()
        .parse::<OutputFormat>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid format: {}", e)))
}

fn parse_quality(text: &str) -> Result<u8, ApiError> {
    match text.trim().parse::<u8>() {
        Ok(quality) if (1..=100).contains(&quality) => Ok(quality),
        _ => Err(ApiError::invalid_input(format!(
            "Invalid quality '{}': expected an integer from 1 to 100",
            text.trim()
        ))),
    }
}

async fn read_upload(state: &AppState, mut multipart: Multipart) -> Result<Upload, ApiError> {
    let upload = state.upload();
    let limit = upload.max_file_bytes;

    let mut image: Option<(Vec<u8>, String, String)> = None;
    let mut options = TransformOptions::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::from_multipart(e, limit))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            IMAGE_FIELD => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field.content_type().unwrap_or("").to_string();
                if !upload.allows(&mime_type) {
                    return Err(ApiError::invalid_input(format!(
                        "Unsupported image type '{}'. Accepted: {}",
                        mime_type,
                        upload.allowed_mime_types.join(", ")
                    )));
                }

                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::from_multipart(e, limit))?;
                if bytes.len() > limit {
                    return Err(ApiError::payload_too_large(limit));
                }
                image = Some((bytes.to_vec(), file_name, mime_type));
            }
            "format" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::from_multipart(e, limit))?;
                options.format = parse_format(&text)?;
            }
            "quality" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::from_multipart(e, limit))?;
                options.quality = Some(parse_quality(&text)?);
            }
            _ => {}
        }
    }

    match image {
        Some((bytes, file_name, mime_type)) if !bytes.is_empty() => Ok(Upload {
            bytes,
            file_name,
            mime_type,
            options,
        }),
        Some(_) => Err(ApiError::invalid_input("Uploaded image is empty")),
        None => Err(ApiError::invalid_input(format!(
            "No image provided. Send it in the '{}' multipart field",
            IMAGE_FIELD
        ))),
    }
}

// ============================================================================
// Handler
// ============================================================================

/// Stores the upload and hands it to the scheduler.
///
/// A rejected upload is released here, before the error is returned.
async fn admit(
    state: Arc<AppState>,
    bytes: Vec<u8>,
    file_name: String,
    mime_type: String,
    options: TransformOptions,
) -> Result<JobHandle, ApiError> {
    let size_bytes = bytes.len() as u64;
    let artifact = state
        .store()
        .persist(&bytes, &file_name)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to persist upload");
            ApiError::storage_error(format!("Failed to store upload: {}", e))
        })?;
    drop(bytes);

    let request = JobRequest {
        metadata: JobMetadata {
            original_name: file_name,
            mime_type,
            size_bytes,
        },
        artifact,
        options,
    };

    match state.scheduler().submit(request) {
        Ok(handle) => Ok(handle),
        Err(rejected) => {
            state.store().release(&rejected.request.artifact).await;
            Err(ApiError::busy(rejected.reason))
        }
    }
}

/// Removes the background of the uploaded image.
///
/// The request holds until the job finishes. A full queue is answered
/// straight away with 503.
pub async fn remove_background(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let multipart = multipart.map_err(|e| {
        ApiError::invalid_input(format!("Expected a multipart/form-data body: {}", e.body_text()))
    })?;
    let Upload {
        bytes,
        file_name,
        mime_type,
        options,
    } = read_upload(&state, multipart).await?;

    // Detached so a disconnecting client cannot leave a stored upload unowned.
    let admission = tokio::spawn(admit(
        Arc::clone(&state),
        bytes,
        file_name,
        mime_type,
        options,
    ));
    let handle = admission.await.map_err(|e| {
        tracing::error!(error = %e, "Upload admission task failed");
        ApiError::storage_error("Failed to store upload")
    })??;

    let job_id = handle.id();
    match handle.wait().await {
        JobOutcome::Completed(output) => {
            let content_type = HeaderValue::from_str(&output.content_type)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
            let duration_ms = output.duration_ms;

            let mut response = (StatusCode::OK, output.bytes).into_response();
            let headers = response.headers_mut();
            headers.insert(header::CONTENT_TYPE, content_type);
            if let Ok(value) = HeaderValue::from_str(&job_id.to_string()) {
                headers.insert(JOB_ID_HEADER, value);
            }
            headers.insert(PROCESSING_TIME_HEADER, HeaderValue::from(duration_ms));
            Ok(response)
        }
        JobOutcome::Failed(failure) => {
            tracing::warn!(job_id = %job_id, kind = ?failure.kind, "Returning failure to client");
            Err(ApiError::processing_failed(failure.message))
        }
    }
}
