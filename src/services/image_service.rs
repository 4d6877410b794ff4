use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::config::CloudinaryConfig;
use crate::utils::multipart::UploadedFile;
use crate::utils::AppError;

const CLOUDINARY_API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Stores an image and returns its public URL.
#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, file: UploadedFile) -> Result<String, AppError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

pub struct CloudinaryClient {
    config: CloudinaryConfig,
    http: reqwest::Client,
}

impl CloudinaryClient {
    pub fn new(config: CloudinaryConfig) -> Self {
        CloudinaryClient {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn upload_url(&self) -> String {
        format!("{}/{}/image/upload", CLOUDINARY_API_BASE, self.config.cloud_name)
    }
}

/// Signature over the signed parameters (only `timestamp` here) followed by the secret.
pub fn upload_signature(timestamp: i64, api_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("timestamp={}{}", timestamp, api_secret).as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
impl ImageHost for CloudinaryClient {
    async fn upload(&self, file: UploadedFile) -> Result<String, AppError> {
        log::info!("🖼️  Uploading image to Cloudinary: {} ({} bytes)", file.filename, file.bytes.len());

        let timestamp = chrono::Utc::now().timestamp();
        let signature = upload_signature(timestamp, &self.config.api_secret);

        let form = Form::new()
            .part("file", Part::bytes(file.bytes).file_name(file.filename))
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let response = self.http.post(self.upload_url()).multipart(form).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "Cloudinary upload failed ({}): {}",
                status, body
            )));
        }

        let uploaded: UploadResponse = response.json().await?;
        log::info!("✅ Image uploaded: {}", uploaded.secure_url);

        Ok(uploaded.secure_url)
    }
}
