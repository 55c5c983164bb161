use anyhow::Context;
use time::OffsetDateTime;
use tracing::{debug, instrument};

use super::form::ImageFile;
use crate::storage::StorageClient;

pub const POSTS_BUCKET: &str = "posts";
pub const PROFILE_BUCKET: &str = "profile-picks";

/// Writes `file` into `bucket` under `<unix-millis>-<filename>` and returns
/// its public URL.
#[instrument(skip(storage, file), fields(file_name = %file.file_name, size = file.body.len()))]
pub async fn upload_image(
    storage: &dyn StorageClient,
    file: ImageFile,
    bucket: &str,
) -> anyhow::Result<String> {
    let key = object_key(OffsetDateTime::now_utc(), &file.file_name);
    storage
        .put_object(bucket, &key, file.body, &file.content_type)
        .await
        .with_context(|| format!("put_object {}/{}", bucket, key))?;
    let url = storage.public_url(bucket, &key);
    debug!(%url, "image uploaded");
    Ok(url)
}

fn object_key(at: OffsetDateTime, file_name: &str) -> String {
    let millis = at.unix_timestamp_nanos() / 1_000_000;
    format!("{}-{}", millis, file_name)
}
