use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, rejection::QueryRejection,
        DefaultBodyLimit, FromRef, Multipart, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{
    dto::{
        LoginRequest, LoginResponse, MeResponse, ProfilePictureResponse, PublicUsersQuery,
        PublicUsersResponse, RegisterRequest, RegisterResponse, RegisteredUser,
    },
    repo::CreateUserError,
};
use crate::{
    auth::{
        password::{hash_password, verify_password},
        AuthUser, JwtKeys,
    },
    error::{ApiError, ApiResult, MessageBody},
    images::{self, read_form, MAX_UPLOAD_BYTES, PROFILE_BUCKET},
    pagination::{query_rejection, Page},
    state::AppState,
};

const BAD_CREDENTIALS: &str = "Invalid email or password";
const EMAIL_TAKEN: &str = "Email already exists";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/user/register", post(register))
        .route("/user/login", post(login))
        .route("/user/me", get(get_me))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/user/profile-picture",
            post(upload_profile_picture).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/user/toggle-visibility", post(toggle_visibility))
        .route("/user/public-users", get(public_users))
}

/// Treats missing and empty strings alike.
fn required(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.is_empty())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let Json(payload) = payload?;
    let (Some(username), Some(email), Some(password)) = (
        required(payload.username),
        required(payload.email),
        required(payload.password),
    ) else {
        return Err(ApiError::Validation(
            "Username, email, and password are required".into(),
        ));
    };

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(ApiError::Validation(EMAIL_TAKEN.into()));
    }

    let hash = hash_password(&password)?;

    let user = match state.users.create(&username, &email, &hash).await {
        Ok(u) => u,
        Err(CreateUserError::DuplicateEmail) => {
            warn!(%email, "email registered concurrently");
            return Err(ApiError::Validation(EMAIL_TAKEN.into()));
        }
        Err(CreateUserError::Other(e)) => return Err(e.into()),
    };

    info!(user_id = user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully",
            user: RegisteredUser {
                id: user.id,
                username: user.username,
                email: user.email,
            },
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let Json(payload) = payload?;
    let (Some(email), Some(password)) = (required(payload.email), required(payload.password))
    else {
        return Err(ApiError::Validation(
            "Email and password are required".into(),
        ));
    };

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(%email, "login unknown email");
        return Err(ApiError::Unauthorized(BAD_CREDENTIALS.into()));
    };

    if !verify_password(&password, &user.password)? {
        warn!(user_id = user.id, "login invalid password");
        return Err(ApiError::Unauthorized(BAD_CREDENTIALS.into()));
    }

    let token = JwtKeys::from_ref(&state).sign(&user)?;

    info!(user_id = user.id, "user logged in");
    Ok(Json(LoginResponse {
        message: "Login successful",
        token,
    }))
}

#[instrument(skip(claims), fields(user_id = claims.id))]
pub async fn get_me(AuthUser(claims): AuthUser) -> Json<MeResponse> {
    Json(MeResponse { user: claims })
}

#[instrument(skip(state, claims, multipart), fields(user_id = claims.id))]
pub async fn upload_profile_picture(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<ProfilePictureResponse>> {
    let mut form = read_form(multipart).await?;
    let image = form
        .take_image()
        .ok_or_else(|| ApiError::Validation("No image uploaded".into()))?;

    let url = images::upload_image(state.storage.as_ref(), image, PROFILE_BUCKET).await?;
    state.users.update_profile_picture(claims.id, &url).await?;

    info!(%url, "profile picture updated");
    Ok(Json(ProfilePictureResponse {
        message: "Profile picture updated successfully",
        profile_picture: url,
    }))
}

/// Body must be `{"isPublic": true|false}`; strings such as `"true"` are rejected.
#[instrument(skip(state, claims, payload), fields(user_id = claims.id))]
pub async fn toggle_visibility(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<MessageBody>> {
    let Json(body) = payload?;
    let is_public = body
        .get("isPublic")
        .and_then(Value::as_bool)
        .ok_or_else(|| ApiError::Validation("isPublic must be a boolean".into()))?;

    state.users.update_visibility(claims.id, is_public).await?;

    let visibility = if is_public { "public" } else { "private" };
    info!(visibility, "visibility updated");
    Ok(Json(MessageBody::new(format!(
        "User visibility updated to {}",
        visibility
    ))))
}

#[instrument(skip(state, claims, query), fields(user_id = claims.id))]
pub async fn public_users(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    query: Result<Query<PublicUsersQuery>, QueryRejection>,
) -> ApiResult<Json<PublicUsersResponse>> {
    let Query(q) = query.map_err(query_rejection)?;
    let page = Page::new(q.page, q.limit)?;
    let search = q.search.as_deref().filter(|s| !s.is_empty());

    let users = state.users.list_public(claims.id, search, page).await?;

    Ok(Json(PublicUsersResponse {
        page: page.page,
        limit: page.limit,
        users,
    }))
}
