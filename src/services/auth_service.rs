use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::AppError;

/// bcrypt work factor for stored passwords
const BCRYPT_COST: u32 = 10;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Doctor,
    Admin,
}

impl Role {
    fn token_lifetime(self) -> Duration {
        match self {
            Role::User => Duration::hours(3),
            Role::Doctor => Duration::hours(24),
            Role::Admin => Duration::hours(2),
        }
    }
}

// JWT Claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user id, doctor id or admin email
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iat: usize,
    pub exp: usize,
    pub jti: String,
}

impl Claims {
    /// Subject as an ObjectId (user and doctor tokens).
    pub fn subject_id(&self) -> Result<ObjectId, AppError> {
        ObjectId::parse_str(&self.sub)
            .map_err(|_| AppError::Unauthorized("Invalid token, please log in again.".into()))
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl LoginRequest {
    pub fn credentials(&self) -> Result<(&str, &str), AppError> {
        match (self.email.as_deref(), self.password.as_deref()) {
            (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => {
                Ok((email.trim(), password))
            }
            _ => Err(AppError::Validation("Missing email or password.".into())),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TokenResponse {
    pub success: bool,
    pub token: String,
}

pub fn issue_token(secret: &str, role: Role, subject: &str, email: Option<&str>) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: subject.to_string(),
        role,
        email: email.map(str::to_string),
        iat: now.timestamp() as usize,
        exp: (now + role.token_lifetime()).timestamp() as usize,
        jti: Uuid::new_v4().to_string(),
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, AppError> {
    let validation = Validation::new(Algorithm::HS256);

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => {
                AppError::Unauthorized("Your session has expired. Please log in again.".into())
            }
            _ => AppError::Unauthorized("Invalid token, please log in again.".into()),
        })
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    Ok(hash(password, BCRYPT_COST)?)
}

/// A malformed stored hash counts as a mismatch.
pub fn password_matches(password: &str, stored_hash: &str) -> bool {
    verify(password, stored_hash).unwrap_or_else(|e| {
        log::warn!("⚠️  Password verification error: {}", e);
        false
    })
}

pub fn validate_email(email: &str) -> Result<(), AppError> {
    if validator::validate_email(email) {
        Ok(())
    } else {
        Err(AppError::Validation("Please enter a valid email address.".into()))
    }
}

/// At least 8 characters with a lowercase, an uppercase, a digit and a symbol.
pub fn validate_password_strength(password: &str) -> Result<(), AppError> {
    let strong = password.chars().count() >= 8
        && password.chars().any(|c| c.is_lowercase())
        && password.chars().any(|c| c.is_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    if strong {
        Ok(())
    } else {
        Err(AppError::Validation(
            "Please enter a stronger password (min 8 chars, include numbers, symbols & mix of uppercase and lowercase characters).".into(),
        ))
    }
}

/// Admin credentials live in configuration, not in the database.
pub fn login_admin(secret: &str, admin_email: &str, admin_password: &str, request: &LoginRequest) -> Result<String, AppError> {
    let (email, password) = request.credentials()?;
    if email != admin_email || password != admin_password {
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }
    issue_token(secret, Role::Admin, email, Some(email))
}
