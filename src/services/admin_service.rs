use mongodb::bson::oid::ObjectId;

use crate::database::ClinicStore;
use crate::models::{Address, Appointment, Doctor, DoctorProfile, SlotLedger};
use crate::services::auth_service;
use crate::services::image_service::ImageHost;
use crate::utils::multipart::FormData;
use crate::utils::AppError;

const DOCTOR_FIELDS: [&str; 9] = [
    "name", "email", "password", "speciality", "degree", "experience", "about", "fees", "address",
];

/// Validates the add-doctor form and builds the record (image URL filled in later).
pub fn parse_doctor_form(form: &FormData) -> Result<Doctor, AppError> {
    if DOCTOR_FIELDS.iter().any(|f| form.text(f).is_none()) {
        return Err(AppError::Validation("Missing Details".into()));
    }

    let email = form.require("email")?;
    let password = form.require("password")?;
    auth_service::validate_email(email)?;
    auth_service::validate_password_strength(password)?;

    let fees: f64 = form
        .require("fees")?
        .parse()
        .ok()
        .filter(|f: &f64| f.is_finite() && *f >= 0.0)
        .ok_or_else(|| AppError::Validation("Fees must be a non-negative number".into()))?;

    let address = Address::from_json(form.require("address")?).map_err(AppError::Validation)?;

    Ok(Doctor {
        id: None,
        name: form.require("name")?.to_string(),
        email: email.to_string(),
        password: auth_service::hash_password(password)?,
        image: String::new(),
        speciality: form.require("speciality")?.to_string(),
        degree: form.require("degree")?.to_string(),
        experience: form.require("experience")?.to_string(),
        about: form.require("about")?.to_string(),
        available: true,
        fees,
        address,
        date: chrono::Utc::now().timestamp_millis(),
        slots_booked: SlotLedger::new(),
    })
}

pub async fn add_doctor(store: &dyn ClinicStore, images: &dyn ImageHost, form: FormData) -> Result<ObjectId, AppError> {
    let mut doctor = parse_doctor_form(&form)?;

    let file = form
        .file
        .ok_or_else(|| AppError::Validation("Doctor image is required".into()))?;

    if store.find_doctor_by_email(&doctor.email).await?.is_some() {
        return Err(AppError::Conflict("Doctor already exists with this email".into()));
    }

    doctor.image = images.upload(file).await?;
    let id = store.insert_doctor(&doctor).await?;

    log::info!("✅ Doctor added: {} ({})", doctor.email, id);
    Ok(id)
}

/// Admin listing: email included, password never.
pub async fn all_doctors(store: &dyn ClinicStore) -> Result<Vec<DoctorProfile>, AppError> {
    Ok(store.list_doctors().await?.into_iter().map(DoctorProfile::from).collect())
}

pub async fn all_appointments(store: &dyn ClinicStore) -> Result<Vec<Appointment>, AppError> {
    store.all_appointments().await
}

pub async fn patients_count(store: &dyn ClinicStore) -> Result<u64, AppError> {
    store.count_users().await
}

/// Flips availability of the given doctor and returns the new value.
pub async fn change_availability(store: &dyn ClinicStore, doctor_id: &ObjectId) -> Result<bool, AppError> {
    let doctor = store
        .find_doctor(doctor_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Doctor not found".into()))?;

    let available = !doctor.available;
    store.set_doctor_available(doctor_id, available).await?;

    log::info!("🔁 Admin set doctor {} availability to {}", doctor_id, available);
    Ok(available)
}
