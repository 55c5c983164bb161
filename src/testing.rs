//! In-memory stores, a recording storage client and request helpers for
//! router-level tests.

use std::sync::{Arc, Mutex};

use axum::{
    async_trait,
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use bytes::Bytes;
use serde_json::Value;
use time::{macros::datetime, Duration, OffsetDateTime};
use tower::ServiceExt;

use crate::{
    app::build_app,
    auth::{password::hash_password, JwtKeys},
    config::{AppConfig, JwtConfig, StorageConfig},
    pagination::{Page, SortOrder},
    posts::{
        repo_types::{NewPost, Post, PostUpdate},
        PostStore,
    },
    state::AppState,
    storage::StorageClient,
    users::{
        repo::CreateUserError,
        repo_types::{PublicUser, User},
        UserStore,
    },
};

pub const TEST_SECRET: &str = "test-secret";

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".into(),
        jwt: JwtConfig {
            secret: TEST_SECRET.into(),
            ttl_minutes: 12 * 60,
        },
        storage: StorageConfig {
            endpoint: "https://storage.test".into(),
            region: "us-east-1".into(),
            access_key: "test".into(),
            secret_key: "test".into(),
        },
    }
}

fn skip_count(page: Page) -> usize {
    usize::try_from(page.offset()).unwrap_or(usize::MAX)
}

fn take_count(page: Page) -> usize {
    usize::try_from(page.limit).unwrap_or(usize::MAX)
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
}

impl MemoryUserStore {
    pub fn get(&self, id: i64) -> Option<User> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == id)
            .cloned()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, CreateUserError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == email) {
            return Err(CreateUserError::DuplicateEmail);
        }
        let user = User {
            id: users.len() as i64 + 1,
            username: username.into(),
            email: email.into(),
            profile_picture: None,
            is_public: true,
            password: password_hash.into(),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn update_profile_picture(&self, user_id: i64, url: &str) -> anyhow::Result<()> {
        if let Some(u) = self.users.lock().unwrap().iter_mut().find(|u| u.id == user_id) {
            u.profile_picture = Some(url.into());
        }
        Ok(())
    }

    async fn update_visibility(&self, user_id: i64, is_public: bool) -> anyhow::Result<()> {
        if let Some(u) = self.users.lock().unwrap().iter_mut().find(|u| u.id == user_id) {
            u.is_public = is_public;
        }
        Ok(())
    }

    async fn list_public(
        &self,
        exclude_user_id: i64,
        search: Option<&str>,
        page: Page,
    ) -> anyhow::Result<Vec<PublicUser>> {
        let needle = search.map(str::to_lowercase);
        let mut users: Vec<User> = self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.is_public && u.id != exclude_user_id)
            .filter(|u| {
                needle
                    .as_deref()
                    .map_or(true, |n| u.username.to_lowercase().contains(n))
            })
            .cloned()
            .collect();
        // Byte order, matching `COLLATE "C"` in `PgUserStore`.
        users.sort_by(|a, b| a.username.cmp(&b.username).then(a.id.cmp(&b.id)));
        Ok(users
            .into_iter()
            .skip(skip_count(page))
            .take(take_count(page))
            .map(PublicUser::from)
            .collect())
    }
}

/// Posts get `created_at = 2024-01-01 + id seconds`, so creation order is
/// strictly increasing.
#[derive(Default)]
pub struct MemoryPostStore {
    posts: Mutex<Vec<Post>>,
}

impl MemoryPostStore {
    pub fn get(&self, id: i64) -> Option<Post> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn create(&self, post: NewPost) -> anyhow::Result<Post> {
        let mut posts = self.posts.lock().unwrap();
        let id = posts.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        let row = Post {
            id,
            user_id: post.user_id,
            picture: post.picture,
            title: post.title,
            location_lat: post.location_lat,
            location_long: post.location_long,
            created_at: datetime!(2024-01-01 0:00 UTC) + Duration::seconds(id),
        };
        posts.push(row.clone());
        Ok(row)
    }

    async fn list_by_owner(&self, user_id: i64) -> anyhow::Result<Vec<Post>> {
        let mut rows: Vec<Post> = self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(rows)
    }

    async fn list_page(
        &self,
        user_id: i64,
        page: Page,
        order: SortOrder,
    ) -> anyhow::Result<Vec<Post>> {
        let mut rows = self.list_by_owner(user_id).await?;
        if order == SortOrder::Asc {
            rows.reverse();
        }
        Ok(rows
            .into_iter()
            .skip(skip_count(page))
            .take(take_count(page))
            .collect())
    }

    async fn update(&self, post_id: i64, changes: PostUpdate) -> anyhow::Result<Option<Post>> {
        let mut posts = self.posts.lock().unwrap();
        let Some(post) = posts.iter_mut().find(|p| p.id == post_id) else {
            return Ok(None);
        };
        if let Some(picture) = changes.picture {
            post.picture = picture;
        }
        if let Some(title) = changes.title {
            post.title = title;
        }
        if changes.location_lat.is_some() {
            post.location_lat = changes.location_lat;
        }
        if changes.location_long.is_some() {
            post.location_long = changes.location_long;
        }
        Ok(Some(post.clone()))
    }

    async fn delete(&self, post_id: i64) -> anyhow::Result<()> {
        self.posts.lock().unwrap().retain(|p| p.id != post_id);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PutRecord {
    pub bucket: String,
    pub key: String,
    pub body: Bytes,
    pub content_type: String,
}

#[derive(Default)]
pub struct RecordingStorage {
    puts: Mutex<Vec<PutRecord>>,
    fail: bool,
}

impl RecordingStorage {
    pub fn failing() -> Self {
        Self {
            puts: Mutex::default(),
            fail: true,
        }
    }

    pub fn puts(&self) -> Vec<PutRecord> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageClient for RecordingStorage {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("storage unavailable");
        }
        self.puts.lock().unwrap().push(PutRecord {
            bucket: bucket.into(),
            key: key.into(),
            body,
            content_type: content_type.into(),
        });
        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("https://storage.test/object/public/{}/{}", bucket, key)
    }
}

/// The full router wired to in-memory collaborators.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub users: Arc<MemoryUserStore>,
    pub posts: Arc<MemoryPostStore>,
    pub storage: Arc<RecordingStorage>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_storage(RecordingStorage::default())
    }

    pub fn with_storage(storage: RecordingStorage) -> Self {
        let users = Arc::new(MemoryUserStore::default());
        let posts = Arc::new(MemoryPostStore::default());
        let storage = Arc::new(storage);
        let state = AppState {
            config: Arc::new(test_config()),
            users: users.clone(),
            posts: posts.clone(),
            storage: storage.clone(),
        };
        Self {
            router: build_app(state.clone()),
            state,
            users,
            posts,
            storage,
        }
    }

    /// Sends a request and returns the status with the body parsed as JSON
    /// (or as a JSON string when it is not JSON).
    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    pub async fn seed_user(&self, username: &str, email: &str, password: &str) -> User {
        let hash = hash_password(password).unwrap();
        self.users.create(username, email, &hash).await.unwrap()
    }

    pub fn token_for(&self, user: &User) -> String {
        JwtKeys::from(&self.state.config.jwt).sign(user).unwrap()
    }

    pub async fn seed_post(&self, user_id: i64, title: &str) -> Post {
        self.posts
            .create(NewPost {
                user_id,
                picture: format!("https://storage.test/object/public/posts/{}.png", title),
                title: title.into(),
                location_lat: None,
                location_long: None,
            })
            .await
            .unwrap()
    }
}

fn with_auth(
    builder: axum::http::request::Builder,
    token: Option<&str>,
) -> axum::http::request::Builder {
    match token {
        Some(t) => builder.header(header::AUTHORIZATION, format!("Bearer {}", t)),
        None => builder,
    }
}

pub fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    with_auth(Request::builder().method(method).uri(uri), token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    with_auth(Request::builder().method(method).uri(uri), token)
        .body(Body::empty())
        .unwrap()
}

const BOUNDARY: &str = "snapfeed-test-boundary";

/// Builds `multipart/form-data` request bodies.
#[derive(Default)]
pub struct MultipartBody {
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn image(self) -> Self {
        self.file("image", "photo.png", "image/png", b"\x89PNG fake")
    }

    pub fn request(mut self, method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        with_auth(Request::builder().method(method).uri(uri), token)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}

pub fn now_unix() -> usize {
    OffsetDateTime::now_utc().unix_timestamp() as usize
}
