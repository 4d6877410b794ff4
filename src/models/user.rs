use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Postal address shared by patients and doctors.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, utoipa::ToSchema)]
pub struct Address {
    #[serde(default)]
    pub line1: String,
    #[serde(default)]
    pub line2: String,
}

impl Address {
    /// Parses the JSON-encoded address sent in multipart forms.
    pub fn from_json(raw: &str) -> Result<Self, String> {
        serde_json::from_str(raw).map_err(|_| "Address format is invalid JSON".to_string())
    }
}

/// Patient account - documento na collection "users"
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    /// bcrypt hash
    pub password: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub address: Address,
    #[serde(default = "not_selected")]
    pub gender: String,
    #[serde(default = "not_selected")]
    pub dob: String,
    #[serde(default = "default_phone")]
    pub phone: String,
    #[serde(default)]
    pub created_at: i64,
}

fn not_selected() -> String {
    "Not Selected".to_string()
}

fn default_phone() -> String {
    "0000000000".to_string()
}

impl User {
    pub fn new(name: String, email: String, password_hash: String) -> Self {
        User {
            id: None,
            name,
            email,
            password: password_hash,
            image: None,
            address: Address::default(),
            gender: not_selected(),
            dob: not_selected(),
            phone: default_phone(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Validated profile fields written by `update-profile`.
#[derive(Debug, Clone)]
pub struct UserProfileUpdate {
    pub name: String,
    pub phone: String,
    pub address: Address,
    pub dob: String,
    pub gender: String,
}

/// User as returned to clients (never carries the password hash).
#[derive(Debug, Serialize, Clone)]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
    pub address: Address,
    pub gender: String,
    pub dob: String,
    pub phone: String,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        UserProfile {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: user.name,
            email: user.email,
            image: user.image,
            address: user.address,
            gender: user.gender,
            dob: user.dob,
            phone: user.phone,
        }
    }
}
