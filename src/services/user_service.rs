use chrono::NaiveDate;
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;

use crate::database::ClinicStore;
use crate::models::{Address, User, UserProfile, UserProfileUpdate};
use crate::services::auth_service::{self, LoginRequest, Role};
use crate::services::image_service::ImageHost;
use crate::utils::multipart::FormData;
use crate::utils::AppError;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Creates a patient account and returns a user token.
pub async fn register(store: &dyn ClinicStore, jwt_secret: &str, request: &RegisterRequest) -> Result<String, AppError> {
    let (name, email, password) = match (
        request.name.as_deref().map(str::trim),
        request.email.as_deref().map(str::trim),
        request.password.as_deref(),
    ) {
        (Some(n), Some(e), Some(p)) if !n.is_empty() && !e.is_empty() && !p.is_empty() => (n, e, p),
        _ => return Err(AppError::Validation("Missing Details".into())),
    };

    auth_service::validate_email(email)?;
    auth_service::validate_password_strength(password)?;

    if store.find_user_by_email(email).await?.is_some() {
        return Err(AppError::Conflict("User with this email already exists.".into()));
    }

    let user = User::new(name.to_string(), email.to_string(), auth_service::hash_password(password)?);
    let id = store.insert_user(&user).await?;

    log::info!("✅ User registered: {} ({})", email, id);

    auth_service::issue_token(jwt_secret, Role::User, &id.to_hex(), None)
}

pub async fn login(store: &dyn ClinicStore, jwt_secret: &str, request: &LoginRequest) -> Result<String, AppError> {
    let (email, password) = request.credentials()?;

    let user = store
        .find_user_by_email(email)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".into()))?;

    if !auth_service::password_matches(password, &user.password) {
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let id = user
        .id
        .ok_or_else(|| AppError::Internal("Stored user has no id".into()))?;

    auth_service::issue_token(jwt_secret, Role::User, &id.to_hex(), None)
}

pub async fn get_profile(store: &dyn ClinicStore, user_id: &ObjectId) -> Result<UserProfile, AppError> {
    store
        .find_user(user_id)
        .await?
        .map(UserProfile::from)
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

/// Validates the multipart profile form into an update.
pub fn parse_profile_form(form: &FormData) -> Result<UserProfileUpdate, AppError> {
    let missing = || AppError::Validation("Data Missing".into());

    let name = form.text("name").ok_or_else(missing)?;
    let phone = form.text("phone").ok_or_else(missing)?;
    let raw_address = form.text("address").ok_or_else(missing)?;
    let dob = form.text("dob").ok_or_else(missing)?;
    let gender = form.text("gender").ok_or_else(missing)?;

    let address = Address::from_json(raw_address).map_err(AppError::Validation)?;

    NaiveDate::parse_from_str(dob, "%Y-%m-%d")
        .map_err(|_| AppError::Validation("Date of birth must be in YYYY-MM-DD format".into()))?;

    Ok(UserProfileUpdate {
        name: name.to_string(),
        phone: phone.to_string(),
        address,
        dob: dob.to_string(),
        gender: gender.to_string(),
    })
}

pub async fn update_profile(
    store: &dyn ClinicStore,
    images: &dyn ImageHost,
    user_id: &ObjectId,
    form: FormData,
) -> Result<(), AppError> {
    let update = parse_profile_form(&form)?;

    if !store.update_user_profile(user_id, &update).await? {
        return Err(AppError::NotFound("User not found".into()));
    }

    if let Some(file) = form.file {
        let url = images.upload(file).await?;
        store.set_user_image(user_id, &url).await?;
    }

    log::info!("✅ Profile updated for user {}", user_id);

    Ok(())
}
