use std::collections::HashMap;

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{PathRejection, QueryRejection},
        DefaultBodyLimit, Form, FromRequest, Multipart, Path, Query, Request, State,
    },
    http::{header::CONTENT_TYPE, StatusCode},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{
    dto::{ListPostsQuery, PostPage, PostResponse},
    repo_types::{NewPost, PostUpdate},
};
use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult, MessageBody},
    images::{self, read_form, FormData, MAX_UPLOAD_BYTES, POSTS_BUCKET},
    pagination::{query_rejection, Page, SortOrder},
    state::AppState,
};

// `:id` is a post id for PATCH/DELETE and a user id for GET.
pub fn post_routes() -> Router<AppState> {
    Router::new()
        .route("/post", post(create_post))
        .route(
            "/post/:id",
            get(list_user_posts).patch(update_post).delete(delete_post),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// POST /post (multipart: image, title, locationLat?, locationLong?)
#[instrument(skip(state, claims, multipart), fields(user_id = claims.id))]
pub async fn create_post(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<PostResponse>)> {
    let mut form = read_form(multipart).await?;
    let title = form.text("title").map(str::to_string);
    let (Some(image), Some(title)) = (form.take_image(), title) else {
        return Err(ApiError::Validation(
            "Picture and title are required".into(),
        ));
    };
    let location_lat = form.float("locationLat")?;
    let location_long = form.float("locationLong")?;

    let picture = images::upload_image(state.storage.as_ref(), image, POSTS_BUCKET).await?;
    let post = state
        .posts
        .create(NewPost {
            user_id: claims.id,
            picture,
            title,
            location_lat,
            location_long,
        })
        .await?;

    info!(post_id = post.id, "post created");
    Ok((
        StatusCode::CREATED,
        Json(PostResponse {
            message: "Post created successfully",
            post,
        }),
    ))
}

/// PATCH /post/:postId (multipart, JSON or urlencoded; every field optional)
#[instrument(skip(state, claims, post_id, request), fields(user_id = claims.id))]
pub async fn update_post(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    post_id: Result<Path<i64>, PathRejection>,
    request: Request,
) -> ApiResult<Json<PostResponse>> {
    const NOT_OWNER: &str = "You can only edit your own posts";

    let post_id = owned_post_id(&state, claims.id, post_id, NOT_OWNER).await?;

    let mut form = read_update_body(&state, request).await?;
    let mut changes = PostUpdate {
        title: form.text("title").map(str::to_string),
        location_lat: form.float("locationLat")?,
        location_long: form.float("locationLong")?,
        ..PostUpdate::default()
    };
    if let Some(image) = form.take_image() {
        changes.picture =
            Some(images::upload_image(state.storage.as_ref(), image, POSTS_BUCKET).await?);
    }

    let post = state
        .posts
        .update(post_id, changes)
        .await?
        .ok_or_else(|| ApiError::Forbidden(NOT_OWNER.into()))?;

    info!(post_id, "post updated");
    Ok(Json(PostResponse {
        message: "Post updated successfully",
        post,
    }))
}

/// Buffers an update body by content type. Only an empty body means "no changes".
async fn read_update_body(state: &AppState, request: Request) -> ApiResult<FormData> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        return read_form(Multipart::from_request(request, state).await).await;
    }
    if content_type.starts_with("application/json") {
        let Json(body) = Json::<Value>::from_request(request, state).await?;
        return FormData::from_json(body);
    }
    if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(fields) = Form::<HashMap<String, String>>::from_request(request, state)
            .await
            .map_err(|e| ApiError::Validation(e.body_text()))?;
        return Ok(FormData::from_fields(fields));
    }

    let body = Bytes::from_request(request, state)
        .await
        .map_err(|e| ApiError::Validation(e.body_text()))?;
    if body.is_empty() {
        Ok(FormData::default())
    } else {
        warn!(%content_type, "unsupported update body");
        Err(ApiError::Validation("Unsupported content type".into()))
    }
}

/// DELETE /post/:postId
#[instrument(skip(state, claims, post_id), fields(user_id = claims.id))]
pub async fn delete_post(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    post_id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<MessageBody>> {
    let post_id =
        owned_post_id(&state, claims.id, post_id, "You can only delete your own posts").await?;

    state.posts.delete(post_id).await?;

    info!(post_id, "post deleted");
    Ok(Json(MessageBody::new("Post deleted successfully")))
}

/// GET /post/:userId?page&limit&order
#[instrument(skip(state, user_id, query))]
pub async fn list_user_posts(
    State(state): State<AppState>,
    user_id: Result<Path<i64>, PathRejection>,
    query: Result<Query<ListPostsQuery>, QueryRejection>,
) -> ApiResult<Json<PostPage>> {
    let Path(user_id) =
        user_id.map_err(|_| ApiError::Validation("userId must be an integer".into()))?;
    let Query(q) = query.map_err(query_rejection)?;
    let page = Page::new(q.page, q.limit)?;
    let order = SortOrder::parse(q.order.as_deref());

    let posts = state.posts.list_page(user_id, page, order).await?;

    Ok(Json(PostPage {
        page: page.page,
        limit: page.limit,
        order,
        posts,
    }))
}

/// Resolves the path id to a post owned by `user_id`. A malformed, unknown
/// or foreign id is a 403.
async fn owned_post_id(
    state: &AppState,
    user_id: i64,
    post_id: Result<Path<i64>, PathRejection>,
    denied: &str,
) -> ApiResult<i64> {
    let Ok(Path(post_id)) = post_id else {
        warn!(user_id, "malformed post id");
        return Err(ApiError::Forbidden(denied.into()));
    };
    if !state.posts.is_owner(post_id, user_id).await? {
        warn!(user_id, post_id, "post ownership denied");
        return Err(ApiError::Forbidden(denied.into()));
    }
    Ok(post_id)
}
