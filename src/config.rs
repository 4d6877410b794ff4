use std::env;

use crate::utils::AppError;

const DEFAULT_PAYU_BASE_URL: &str = "https://test.payu.in/_payment";
const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";
const DEFAULT_ADMIN_PANEL_URL: &str = "http://localhost:5174";

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct PayuConfig {
    pub merchant_key: String,
    pub salt: String,
    pub base_url: String,
}

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub admin_email: String,
    pub admin_password: String,
    pub cloudinary: CloudinaryConfig,
    pub payu: PayuConfig,
    pub frontend_url: String,
    /// Public base URL of this service; when set the gateway posts back to us.
    pub backend_url: Option<String>,
    pub cors_origins: Vec<String>,
}

fn required(name: &str) -> Result<String, AppError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::Configuration(format!("{} must be set", name)))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let port = optional("PORT")
            .unwrap_or_else(|| "4000".to_string())
            .parse::<u16>()
            .map_err(|e| AppError::Configuration(format!("PORT is not a valid port: {}", e)))?;

        let frontend_url = optional("FRONTEND_URL")
            .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let cors_origins = match optional("CORS_ORIGINS") {
            Some(list) => list
                .split(',')
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            None => vec![frontend_url.clone(), DEFAULT_ADMIN_PANEL_URL.to_string()],
        };

        Ok(AppConfig {
            host: optional("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            admin_email: required("ADMIN_EMAIL")?,
            admin_password: required("ADMIN_PASSWORD")?,
            cloudinary: CloudinaryConfig {
                cloud_name: required("CLOUDINARY_NAME")?,
                api_key: required("CLOUDINARY_API_KEY")?,
                api_secret: required("CLOUDINARY_SECRET_KEY")?,
            },
            payu: PayuConfig {
                merchant_key: required("PAYU_MERCHANT_KEY")?,
                salt: required("PAYU_SALT")?,
                base_url: optional("PAYU_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_PAYU_BASE_URL.to_string()),
            },
            frontend_url,
            backend_url: optional("BACKEND_URL").map(|u| u.trim_end_matches('/').to_string()),
            cors_origins,
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        AppConfig {
            host: "127.0.0.1".into(),
            port: 4000,
            database_url: "mongodb://localhost:27017/prescripto_test".into(),
            jwt_secret: "test-secret".into(),
            admin_email: "admin@prescripto.test".into(),
            admin_password: "Admin#2024".into(),
            cloudinary: CloudinaryConfig {
                cloud_name: "demo".into(),
                api_key: "key".into(),
                api_secret: "secret".into(),
            },
            payu: PayuConfig {
                merchant_key: "gtKFFx".into(),
                salt: "eCwWELxi".into(),
                base_url: DEFAULT_PAYU_BASE_URL.into(),
            },
            frontend_url: "http://localhost:5173".into(),
            backend_url: None,
            cors_origins: vec!["http://localhost:5173".into()],
        }
    }
}
