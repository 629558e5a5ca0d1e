//! HTTP surface: enrollment, verification and a liveness probe.

use crate::context::AppContext;
use crate::error::ApiError;
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use facegate_core::VerificationResult;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

type Ctx = State<Arc<AppContext>>;

#[derive(Debug, Serialize)]
pub struct EnrollResponse {
    pub message: &'static str,
    pub embedding_id: String,
}

/// Fields of an enrollment or verification form.
#[derive(Debug)]
struct PhotoForm {
    user_id: String,
    photo: Vec<u8>,
}

impl PhotoForm {
    async fn read(multipart: Result<Multipart, MultipartRejection>) -> Result<Self, ApiError> {
        let mut multipart =
            multipart.map_err(|e| ApiError::InvalidInput(format!("Expected a multipart form: {e}")))?;

        let mut user_id = None;
        let mut photo = None;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::InvalidInput(format!("Malformed form data: {e}")))?
        {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some("photo") => {
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::InvalidInput(format!("Failed to read photo: {e}")))?;
                    photo = Some(bytes.to_vec());
                }
                Some("user_id") => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| ApiError::InvalidInput(format!("Failed to read user_id: {e}")))?;
                    user_id = Some(text);
                }
                _ => {}
            }
        }

        let photo = photo
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ApiError::InvalidInput("No photo provided".into()))?;
        let user_id = user_id
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ApiError::InvalidInput("user_id is required".into()))?;

        Ok(Self { user_id, photo })
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn upload_profile(
    State(ctx): Ctx,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<EnrollResponse>, ApiError> {
    let form = PhotoForm::read(multipart).await?;
    tracing::info!(user_id = %form.user_id, bytes = form.photo.len(), "enrollment request");

    ctx.enroll(&form.user_id, form.photo).await?;
    Ok(Json(EnrollResponse {
        message: "Profile photo uploaded successfully",
        embedding_id: form.user_id,
    }))
}

async fn verify(
    State(ctx): Ctx,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<VerificationResult>, ApiError> {
    let form = PhotoForm::read(multipart).await?;
    tracing::info!(user_id = %form.user_id, bytes = form.photo.len(), "verification request");

    let result = ctx.verify(&form.user_id, form.photo).await?;
    Ok(Json(result))
}

/// Build the service router.
pub fn router(ctx: Arc<AppContext>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/upload-profile", post(upload_profile))
        .route("/verify", post(verify))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Serve `router` on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    router: Router,
    shutdown: F,
) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
