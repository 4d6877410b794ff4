use mongodb::bson::oid::ObjectId;

use crate::database::ClinicStore;
use crate::models::{Appointment, Doctor, DoctorProfile, DoctorProfileUpdate, PaymentStatus};
use crate::services::auth_service::{self, LoginRequest, Role};
use crate::utils::AppError;

async fn current_doctor(store: &dyn ClinicStore, doctor_id: &ObjectId) -> Result<Doctor, AppError> {
    store
        .find_doctor(doctor_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Not authorized".into()))
}

/// Public listing: no email, no password.
pub async fn list_doctors(store: &dyn ClinicStore) -> Result<Vec<DoctorProfile>, AppError> {
    Ok(store
        .list_doctors()
        .await?
        .into_iter()
        .map(DoctorProfile::public)
        .collect())
}

pub async fn login(store: &dyn ClinicStore, jwt_secret: &str, request: &LoginRequest) -> Result<String, AppError> {
    let (email, password) = request.credentials()?;

    let doctor = store
        .find_doctor_by_email(email)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".into()))?;

    if !auth_service::password_matches(password, &doctor.password) {
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let id = doctor
        .id
        .ok_or_else(|| AppError::Internal("Stored doctor has no id".into()))?;

    auth_service::issue_token(jwt_secret, Role::Doctor, &id.to_hex(), None)
}

pub async fn profile(store: &dyn ClinicStore, doctor_id: &ObjectId) -> Result<DoctorProfile, AppError> {
    current_doctor(store, doctor_id).await.map(DoctorProfile::from)
}

pub async fn update_profile(
    store: &dyn ClinicStore,
    doctor_id: &ObjectId,
    update: &DoctorProfileUpdate,
) -> Result<DoctorProfile, AppError> {
    if let Some(fees) = update.fees {
        if !fees.is_finite() || fees < 0.0 {
            return Err(AppError::Validation("Fees must be a non-negative number".into()));
        }
    }
    if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::Validation("Name cannot be empty".into()));
    }

    let doctor = if update.is_empty() {
        store.find_doctor(doctor_id).await?
    } else {
        store.update_doctor_profile(doctor_id, update).await?
    };

    doctor
        .map(DoctorProfile::from)
        .ok_or_else(|| AppError::Unauthorized("Not authorized".into()))
}

/// Flips the doctor's availability and returns the new value.
pub async fn toggle_availability(store: &dyn ClinicStore, doctor_id: &ObjectId) -> Result<bool, AppError> {
    let doctor = current_doctor(store, doctor_id).await?;
    let available = !doctor.available;

    if !store.set_doctor_available(doctor_id, available).await? {
        return Err(AppError::Unauthorized("Not authorized".into()));
    }

    log::info!("🔁 Doctor {} availability set to {}", doctor_id, available);
    Ok(available)
}

/// Ascending slot date, then slot time, then creation time.
pub async fn appointments(store: &dyn ClinicStore, doctor_id: &ObjectId) -> Result<Vec<Appointment>, AppError> {
    current_doctor(store, doctor_id).await?;

    let mut appointments = store.doctor_appointments(doctor_id).await?;
    appointments.sort_by(|a, b| {
        a.slot_date
            .cmp(&b.slot_date)
            .then(a.slot_time.cmp(&b.slot_time))
            .then(a.created_at.cmp(&b.created_at))
    });
    Ok(appointments)
}

pub async fn mark_completed(
    store: &dyn ClinicStore,
    doctor_id: &ObjectId,
    appointment_id: &ObjectId,
) -> Result<Appointment, AppError> {
    current_doctor(store, doctor_id).await?;

    let read = store
        .find_appointment(appointment_id)
        .await?
        .filter(|a| a.doc_id == *doctor_id)
        .ok_or_else(|| AppError::NotFound("Appointment not found".into()))?;
    let mut appointment = read.clone();

    if appointment.is_completed {
        return Err(AppError::Conflict("Appointment already completed".into()));
    }
    if appointment.cancelled {
        return Err(AppError::Conflict("Cancelled appointment cannot be completed".into()));
    }

    appointment.is_completed = true;
    if appointment.payment_status == PaymentStatus::Pending {
        appointment.payment_status = PaymentStatus::Paid;
    }
    appointment.updated_at = chrono::Utc::now().timestamp_millis();

    if !store.save_appointment(&appointment, &read).await? {
        return Err(AppError::Conflict("Appointment was updated meanwhile, please retry".into()));
    }
    log::info!("✅ Appointment {} completed by doctor {}", appointment_id, doctor_id);

    Ok(appointment)
}
