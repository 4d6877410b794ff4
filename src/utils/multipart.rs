use actix_multipart::Multipart;
use futures::TryStreamExt;
use std::collections::HashMap;

use super::AppError;

const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;
const MAX_FILE_BYTES: usize = 5 * 1024 * 1024;

/// Uploaded file kept in memory until it is forwarded to the image host.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Text fields of a multipart form plus the optional file sent as `file_field`.
#[derive(Debug, Default)]
pub struct FormData {
    pub fields: HashMap<String, String>,
    pub file: Option<UploadedFile>,
}

impl FormData {
    /// Trimmed value of a field; blank counts as missing.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn require(&self, name: &str) -> Result<&str, AppError> {
        self.text(name)
            .ok_or_else(|| AppError::Validation(format!("Missing field: {}", name)))
    }
}

pub async fn collect_form(mut payload: Multipart, file_field: &str) -> Result<FormData, AppError> {
    let mut form = FormData::default();

    while let Some(mut field) = payload.try_next().await? {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let limit = if name == file_field { MAX_FILE_BYTES } else { MAX_TEXT_FIELD_BYTES };
        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            if data.len() + chunk.len() > limit {
                return Err(AppError::Validation(format!("Field {} is too large", name)));
            }
            data.extend_from_slice(&chunk);
        }

        if name == file_field {
            if !data.is_empty() {
                form.file = Some(UploadedFile {
                    filename: filename.unwrap_or_else(|| "upload".to_string()),
                    bytes: data,
                });
            }
        } else if !name.is_empty() {
            let value = String::from_utf8(data)
                .map_err(|_| AppError::Validation(format!("Field {} is not valid UTF-8", name)))?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}
