use serde::{Deserialize, Serialize};

use super::repo_types::PublicUser;
use crate::auth::Claims;

/// Request body for user registration. Fields are optional so that a missing
/// one surfaces as our own 400 rather than a deserialization error.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    pub id: i64,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    pub user: RegisteredUser,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: Claims,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePictureResponse {
    pub message: &'static str,
    pub profile_picture: String,
}

#[derive(Debug, Deserialize)]
pub struct PublicUsersQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PublicUsersResponse {
    pub page: i64,
    pub limit: i64,
    pub users: Vec<PublicUser>,
}
