use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// Post record in the database. Absent coordinates are omitted from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub picture: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_long: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: i64,
    pub picture: String,
    pub title: String,
    pub location_lat: Option<f64>,
    pub location_long: Option<f64>,
}

/// Partial update; `None` leaves the column unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostUpdate {
    pub picture: Option<String>,
    pub title: Option<String>,
    pub location_lat: Option<f64>,
    pub location_long: Option<f64>,
}
