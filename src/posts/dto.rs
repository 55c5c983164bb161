use serde::{Deserialize, Serialize};

use super::repo_types::Post;
use crate::pagination::SortOrder;

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub message: &'static str,
    pub post: Post,
}

#[derive(Debug, Deserialize)]
pub struct ListPostsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub order: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PostPage {
    pub page: i64,
    pub limit: i64,
    pub order: SortOrder,
    pub posts: Vec<Post>,
}
