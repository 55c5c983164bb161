use std::collections::HashMap;

use axum::extract::{multipart::MultipartRejection, Multipart};
use bytes::Bytes;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};

/// Name of the single file part accepted by every upload route.
pub const IMAGE_FIELD: &str = "image";

#[derive(Debug, Clone)]
pub struct ImageFile {
    pub file_name: String,
    pub content_type: String,
    pub body: Bytes,
}

/// A buffered `multipart/form-data` body: at most one image plus text fields.
#[derive(Debug, Default)]
pub struct FormData {
    image: Option<ImageFile>,
    fields: HashMap<String, String>,
}

impl FormData {
    /// Text fields only, e.g. from a urlencoded body.
    pub fn from_fields(fields: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            image: None,
            fields: fields.into_iter().collect(),
        }
    }

    /// Text fields from a JSON object. Numbers are kept in their textual form
    /// and `null` counts as absent.
    pub fn from_json(body: Value) -> ApiResult<Self> {
        let Value::Object(map) = body else {
            return Err(ApiError::Validation(
                "Request body must be a JSON object".into(),
            ));
        };
        let mut fields = HashMap::with_capacity(map.len());
        for (name, value) in map {
            let text = match value {
                Value::Null => continue,
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                _ => {
                    return Err(ApiError::Validation(format!(
                        "{} must be a string or number",
                        name
                    )))
                }
            };
            fields.insert(name, text);
        }
        Ok(Self::from_fields(fields))
    }

    pub fn take_image(&mut self) -> Option<ImageFile> {
        self.image.take()
    }

    /// A text field, treating an empty value the same as an absent one.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// A numeric field. Absent or empty is `None`; `"0"` is `Some(0.0)`.
    pub fn float(&self, name: &str) -> ApiResult<Option<f64>> {
        let Some(raw) = self.text(name) else {
            return Ok(None);
        };
        match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(ApiError::Validation(format!("{} must be a number", name))),
        }
    }
}

pub async fn read_form(multipart: Result<Multipart, MultipartRejection>) -> ApiResult<FormData> {
    let mut mp = multipart.map_err(|e| ApiError::Validation(e.body_text()))?;
    let mut form = FormData::default();

    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        match file_name {
            Some(file_name) => {
                if name != IMAGE_FIELD {
                    continue;
                }
                if form.image.is_some() {
                    return Err(ApiError::Validation(
                        "Only one image may be uploaded".into(),
                    ));
                }
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(e.body_text()))?;
                form.image = Some(ImageFile {
                    file_name,
                    content_type,
                    body,
                });
            }
            None => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::Validation(e.body_text()))?;
                form.fields.insert(name, value);
            }
        }
    }

    Ok(form)
}
