use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{info, instrument};

use crate::{
    error::{ApiError, ApiResult},
    images::{self, read_form, MAX_UPLOAD_BYTES, POSTS_BUCKET, PROFILE_BUCKET},
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
}

// These routes are unauthenticated and record no owner for the object.
pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/upload/profile-pick", post(upload_profile_pick))
        .route("/upload/post", post(upload_post_image))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

#[instrument(skip(state, multipart))]
pub async fn upload_profile_pick(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    upload_to(&state, multipart, PROFILE_BUCKET).await
}

#[instrument(skip(state, multipart))]
pub async fn upload_post_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    upload_to(&state, multipart, POSTS_BUCKET).await
}

async fn upload_to(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
    bucket: &str,
) -> ApiResult<Json<UploadResponse>> {
    let mut form = read_form(multipart).await?;
    let image = form
        .take_image()
        .ok_or_else(|| ApiError::Validation("No image uploaded".into()))?;

    let url = images::upload_image(state.storage.as_ref(), image, bucket).await?;

    info!(bucket, %url, anonymous = true, "upload complete");
    Ok(Json(UploadResponse { url }))
}
