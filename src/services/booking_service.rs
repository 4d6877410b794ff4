//! Slot booking and cancellation.
//!
//! Occupancy lives in `slot_bookings`: one row per (doctor, date, time),
//! guarded by a unique index. Claiming the row is the booking's commit point;
//! the doctor's embedded `slots_booked` ledger and `available` flag are a
//! projection rebuilt from the rows after every change.

use chrono::NaiveDateTime;
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;

use crate::database::ClinicStore;
use crate::models::{
    has_future_slots, is_past_slot, Appointment, Doctor, PaymentStatus, SlotBooking, SlotDate,
    SlotLedger, SlotTime,
};
use crate::utils::AppError;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookAppointmentRequest {
    pub doc_id: Option<String>,
    /// `D_M_YYYY`, e.g. `12_6_2025`
    pub slot_date: Option<String>,
    /// `HH:MM AM|PM`
    pub slot_time: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentIdRequest {
    pub appointment_id: Option<String>,
}

impl AppointmentIdRequest {
    pub fn id(&self) -> Result<ObjectId, AppError> {
        parse_object_id(self.appointment_id.as_deref(), "appointment")
    }
}

pub fn parse_object_id(raw: Option<&str>, what: &str) -> Result<ObjectId, AppError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation(format!("Missing {} id", what)))?;
    ObjectId::parse_str(raw).map_err(|_| AppError::Validation(format!("Invalid {} id", what)))
}

impl BookAppointmentRequest {
    fn parse(&self) -> Result<(ObjectId, SlotDate, SlotTime), AppError> {
        let doctor_id = parse_object_id(self.doc_id.as_deref(), "doctor")?;

        let slot_date = self
            .slot_date
            .as_deref()
            .ok_or_else(|| AppError::Validation("Missing slot date".into()))?
            .parse::<SlotDate>()
            .map_err(AppError::Validation)?;

        let slot_time = self
            .slot_time
            .as_deref()
            .ok_or_else(|| AppError::Validation("Missing slot time".into()))?
            .parse::<SlotTime>()
            .map_err(AppError::Validation)?;

        Ok((doctor_id, slot_date, slot_time))
    }
}

/// Rebuilds the doctor's ledger from the booking rows and stores it with the
/// recomputed availability in one update.
pub async fn refresh_ledger(store: &dyn ClinicStore, doctor_id: &ObjectId, now: NaiveDateTime) -> Result<SlotLedger, AppError> {
    let rows = store.doctor_slots(doctor_id).await?;
    let ledger = SlotLedger::from_bookings(&rows);
    let available = has_future_slots(&ledger, now);

    store.save_ledger(doctor_id, &ledger, available).await?;
    Ok(ledger)
}

/// Claims rows for entries of the doctor's stored ledger that have none, so a
/// rebuild from the rows keeps them. Returns the number of rows created.
async fn adopt_ledger_rows(store: &dyn ClinicStore, doctor: &Doctor) -> Result<usize, AppError> {
    let Some(doctor_id) = doctor.id else { return Ok(0) };
    let existing = SlotLedger::from_bookings(&store.doctor_slots(&doctor_id).await?);
    let mut created = 0;

    for (date, times) in doctor.slots_booked.iter() {
        for time in times {
            if existing.contains(date, time) {
                continue;
            }
            if store.claim_slot(&SlotBooking::new(doctor_id, *date, *time)).await? {
                created += 1;
            }
        }
    }

    if created > 0 {
        log::warn!("⚠️  Adopted {} ledger entries without booking rows for doctor {}", created, doctor_id);
    }
    Ok(created)
}

async fn refresh_ledger_or_log(store: &dyn ClinicStore, doctor_id: &ObjectId, now: NaiveDateTime) {
    if let Err(e) = refresh_ledger(store, doctor_id, now).await {
        log::error!("❌ Failed to refresh slot ledger for doctor {}: {}", doctor_id, e);
    }
}

pub async fn book_appointment(
    store: &dyn ClinicStore,
    user_id: &ObjectId,
    request: &BookAppointmentRequest,
    now: NaiveDateTime,
) -> Result<Appointment, AppError> {
    let (doctor_id, slot_date, slot_time) = request.parse()?;

    if is_past_slot(&slot_date, &slot_time, now) {
        return Err(AppError::Validation("Cannot book a slot in the past".into()));
    }

    let doctor = store
        .find_doctor(&doctor_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Doctor not found".into()))?;

    if !doctor.available {
        return Err(AppError::Conflict("Doctor not available".into()));
    }
    if doctor.slots_booked.contains(&slot_date, &slot_time) {
        log::warn!("⚠️  Slot {} {} already in ledger of doctor {}", slot_date, slot_time, doctor_id);
        return Err(AppError::Conflict("Slot not available".into()));
    }

    let user = store
        .find_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let mut appointment = Appointment::book(&user, &doctor, slot_date, slot_time)
        .ok_or_else(|| AppError::Internal("Stored user or doctor has no id".into()))?;
    let appointment_id = ObjectId::new();
    appointment.id = Some(appointment_id);

    adopt_ledger_rows(store, &doctor).await?;

    let mut row = SlotBooking::new(doctor_id, slot_date, slot_time);
    row.appointment_id = Some(appointment_id);

    if !store.claim_slot(&row).await? {
        log::warn!("⚠️  Slot {} {} already booked for doctor {}", slot_date, slot_time, doctor_id);
        return Err(AppError::Conflict("Slot not available".into()));
    }

    if let Err(e) = store.insert_appointment(&appointment).await {
        // Compensate: give the slot back before reporting the failure.
        if let Err(release_err) = store.release_slot(&doctor_id, &slot_date, &slot_time).await {
            log::error!(
                "❌ Failed to release slot {} {} for doctor {}: {}",
                slot_date, slot_time, doctor_id, release_err
            );
        }
        return Err(e);
    }

    refresh_ledger_or_log(store, &doctor_id, now).await;

    log::info!("✅ Appointment {} booked: doctor {} at {} {}", appointment_id, doctor_id, slot_date, slot_time);
    Ok(appointment)
}

pub async fn cancel_appointment(
    store: &dyn ClinicStore,
    user_id: &ObjectId,
    appointment_id: &ObjectId,
    now: NaiveDateTime,
) -> Result<Appointment, AppError> {
    let read = store
        .find_appointment(appointment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Appointment not found".into()))?;

    if read.user_id != *user_id {
        return Err(AppError::Forbidden("Unauthorized action".into()));
    }
    if read.cancelled {
        return Err(AppError::Conflict("Appointment already cancelled".into()));
    }
    if read.is_completed {
        return Err(AppError::Conflict("Completed appointment cannot be cancelled".into()));
    }

    let mut appointment = read.clone();
    appointment.cancelled = true;
    // A paid appointment keeps its status; refunds are not handled.
    if appointment.payment_status.can_transition_to(PaymentStatus::CancelledByUser) {
        appointment.payment_status = PaymentStatus::CancelledByUser;
    }
    appointment.updated_at = chrono::Utc::now().timestamp_millis();

    if !store.save_appointment(&appointment, &read).await? {
        return Err(AppError::Conflict("Appointment was updated meanwhile, please retry".into()));
    }

    if let Some(doctor) = store.find_doctor(&appointment.doc_id).await? {
        adopt_ledger_rows(store, &doctor).await?;
    }
    store
        .release_slot(&appointment.doc_id, &appointment.slot_date, &appointment.slot_time)
        .await?;

    refresh_ledger_or_log(store, &appointment.doc_id, now).await;

    log::info!("✅ Appointment {} cancelled by user {}", appointment_id, user_id);
    Ok(appointment)
}

/// Newest booking first.
pub async fn my_appointments(store: &dyn ClinicStore, user_id: &ObjectId) -> Result<Vec<Appointment>, AppError> {
    store.user_appointments(user_id).await
}

/// Creates booking rows for ledger entries that have none, so data written
/// before the rows existed is guarded by the unique index. Returns the number
/// of rows created.
pub async fn reconcile_ledgers(store: &dyn ClinicStore) -> Result<usize, AppError> {
    let mut created = 0;
    for doctor in store.list_doctors().await? {
        created += adopt_ledger_rows(store, &doctor).await?;
    }

    if created > 0 {
        log::info!("🔧 Reconciled {} slot booking rows from doctor ledgers", created);
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::models::User;
    use crate::services::doctor_service::tests::sample_doctor;
    use chrono::NaiveDate;
    use std::sync::atomic::Ordering;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn request(doctor_id: &ObjectId, date: &str, time: &str) -> BookAppointmentRequest {
        BookAppointmentRequest {
            doc_id: Some(doctor_id.to_hex()),
            slot_date: Some(date.into()),
            slot_time: Some(time.into()),
        }
    }

    async fn setup(ledger_json: &str) -> (MemoryStore, ObjectId, ObjectId) {
        let (store, doctor_id, user_id) = setup_without_rows(ledger_json).await;
        reconcile_ledgers(&store).await.unwrap();
        (store, doctor_id, user_id)
    }

    /// Ledger stored on the doctor, but no slot rows behind it.
    async fn setup_without_rows(ledger_json: &str) -> (MemoryStore, ObjectId, ObjectId) {
        let store = MemoryStore::new();
        let mut doctor = sample_doctor("doc@example.com", "hash");
        doctor.slots_booked = serde_json::from_str(ledger_json).unwrap();
        let doctor_id = store.insert_doctor(&doctor).await.unwrap();
        let user_id = store
            .insert_user(&User::new("Jane Doe".into(), "jane@example.com".into(), "hash".into()))
            .await
            .unwrap();
        (store, doctor_id, user_id)
    }

    fn ledger_json(store: &MemoryStore, doctor_id: &ObjectId) -> serde_json::Value {
        serde_json::to_value(&store.doctor(doctor_id).slots_booked).unwrap()
    }

    #[tokio::test]
    async fn test_booking_appends_to_existing_day() {
        let (store, doctor_id, user_id) = setup(r#"{"12_6_2025":["10:00 AM"]}"#).await;

        let appointment = book_appointment(&store, &user_id, &request(&doctor_id, "12_6_2025", "11:00 AM"), now())
            .await
            .unwrap();

        assert_eq!(
            ledger_json(&store, &doctor_id),
            serde_json::json!({"12_6_2025": ["10:00 AM", "11:00 AM"]})
        );
        assert!(store.doctor(&doctor_id).available);
        assert_eq!(appointment.amount, 50.0);
        assert_eq!(appointment.payment_status, PaymentStatus::Pending);
        assert_eq!(appointment.user_data.email, "jane@example.com");

        let stored = store.appointment(&appointment.id.unwrap());
        assert_eq!(stored.doc_id, doctor_id);
    }

    #[tokio::test]
    async fn test_booked_slot_is_rejected_and_ledger_unchanged() {
        let (store, doctor_id, user_id) = setup(r#"{"12_6_2025":["10:00 AM"]}"#).await;
        let before = ledger_json(&store, &doctor_id);

        let err = book_appointment(&store, &user_id, &request(&doctor_id, "12_6_2025", "10:00 AM"), now())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(ledger_json(&store, &doctor_id), before);
        assert!(store.appointments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ledger_without_rows_still_guards_and_survives_booking() {
        let (store, doctor_id, user_id) = setup_without_rows(r#"{"12_6_2025":["10:00 AM"]}"#).await;
        assert!(store.slots.lock().unwrap().is_empty());

        let err = book_appointment(&store, &user_id, &request(&doctor_id, "12_6_2025", "10:00 AM"), now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(ledger_json(&store, &doctor_id), serde_json::json!({"12_6_2025": ["10:00 AM"]}));

        book_appointment(&store, &user_id, &request(&doctor_id, "12_6_2025", "11:00 AM"), now())
            .await
            .unwrap();
        assert_eq!(
            ledger_json(&store, &doctor_id),
            serde_json::json!({"12_6_2025": ["10:00 AM", "11:00 AM"]})
        );
        assert_eq!(store.doctor_slots(&doctor_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_keeps_ledger_entries_without_rows() {
        let (store, doctor_id, user_id) = setup("{}").await;
        let appointment = book_appointment(&store, &user_id, &request(&doctor_id, "12_6_2025", "11:00 AM"), now())
            .await
            .unwrap();

        // ledger entry written behind the rows' back
        let ledger: SlotLedger = serde_json::from_str(r#"{"12_6_2025":["10:00 AM","11:00 AM"]}"#).unwrap();
        store.save_ledger(&doctor_id, &ledger, true).await.unwrap();

        cancel_appointment(&store, &user_id, &appointment.id.unwrap(), now()).await.unwrap();

        assert_eq!(ledger_json(&store, &doctor_id), serde_json::json!({"12_6_2025": ["10:00 AM"]}));
    }

    #[tokio::test]
    async fn test_stale_cancel_cannot_overwrite_paid() {
        let (store, doctor_id, user_id) = setup("{}").await;
        let appointment = book_appointment(&store, &user_id, &request(&doctor_id, "12_6_2025", "10:00 AM"), now())
            .await
            .unwrap();
        let appointment_id = appointment.id.unwrap();
        let stale = store.appointment(&appointment_id);

        let mut paid = stale.clone();
        paid.payment_status = PaymentStatus::Paid;
        assert!(store.save_appointment(&paid, &stale).await.unwrap());

        let mut cancelled = stale.clone();
        cancelled.cancelled = true;
        cancelled.payment_status = PaymentStatus::CancelledByUser;
        assert!(!store.save_appointment(&cancelled, &stale).await.unwrap());

        let stored = store.appointment(&appointment_id);
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        assert!(!stored.cancelled);
    }

    #[tokio::test]
    async fn test_same_slot_in_other_spelling_collides() {
        let (store, doctor_id, user_id) = setup("{}").await;
        book_appointment(&store, &user_id, &request(&doctor_id, "12_6_2025", "9:30 am"), now())
            .await
            .unwrap();

        let err = book_appointment(&store, &user_id, &request(&doctor_id, "12_6_2025", "09:30 AM"), now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_concurrent_bookings_of_one_slot() {
        let (store, doctor_id, user_id) = setup("{}").await;
        let req = request(&doctor_id, "12_6_2025", "10:00 AM");

        let (a, b) = tokio::join!(
            book_appointment(&store, &user_id, &req, now()),
            book_appointment(&store, &user_id, &req, now())
        );

        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(store.appointments.lock().unwrap().len(), 1);
        assert_eq!(store.slots.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_insert_releases_slot() {
        let (store, doctor_id, user_id) = setup("{}").await;
        store.fail_next_appointment_insert.store(true, Ordering::SeqCst);

        let err = book_appointment(&store, &user_id, &request(&doctor_id, "12_6_2025", "10:00 AM"), now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
        assert!(store.slots.lock().unwrap().is_empty());
        assert!(store.doctor(&doctor_id).slots_booked.is_empty());

        book_appointment(&store, &user_id, &request(&doctor_id, "12_6_2025", "10:00 AM"), now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_booking_rejections() {
        let (store, doctor_id, user_id) = setup("{}").await;

        let past = request(&doctor_id, "1_6_2025", "09:00 AM");
        assert!(matches!(book_appointment(&store, &user_id, &past, now()).await, Err(AppError::Validation(_))));

        let bad_time = request(&doctor_id, "12_6_2025", "25:00 PM");
        assert!(matches!(book_appointment(&store, &user_id, &bad_time, now()).await, Err(AppError::Validation(_))));

        let bad_date = request(&doctor_id, "2025-06-12", "10:00 AM");
        assert!(matches!(book_appointment(&store, &user_id, &bad_date, now()).await, Err(AppError::Validation(_))));

        let unknown = request(&ObjectId::new(), "12_6_2025", "10:00 AM");
        assert!(matches!(book_appointment(&store, &user_id, &unknown, now()).await, Err(AppError::NotFound(_))));

        store.set_doctor_available(&doctor_id, false).await.unwrap();
        let unavailable = request(&doctor_id, "12_6_2025", "10:00 AM");
        assert!(matches!(book_appointment(&store, &user_id, &unavailable, now()).await, Err(AppError::Conflict(_))));

        assert!(store.slots.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelling_last_slot_removes_day() {
        let (store, doctor_id, user_id) = setup("{}").await;
        let appointment = book_appointment(&store, &user_id, &request(&doctor_id, "12_6_2025", "10:00 AM"), now())
            .await
            .unwrap();
        let appointment_id = appointment.id.unwrap();

        let cancelled = cancel_appointment(&store, &user_id, &appointment_id, now()).await.unwrap();

        assert!(cancelled.cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::CancelledByUser);
        assert_eq!(ledger_json(&store, &doctor_id), serde_json::json!({}));
        assert!(!store.doctor(&doctor_id).available);
        assert!(store.slots.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_keeps_other_slots_of_the_day() {
        let (store, doctor_id, user_id) = setup(r#"{"12_6_2025":["10:00 AM"]}"#).await;
        let appointment = book_appointment(&store, &user_id, &request(&doctor_id, "12_6_2025", "11:00 AM"), now())
            .await
            .unwrap();

        cancel_appointment(&store, &user_id, &appointment.id.unwrap(), now()).await.unwrap();

        assert_eq!(ledger_json(&store, &doctor_id), serde_json::json!({"12_6_2025": ["10:00 AM"]}));
        assert!(store.doctor(&doctor_id).available);
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let (store, doctor_id, user_id) = setup("{}").await;
        let appointment = book_appointment(&store, &user_id, &request(&doctor_id, "12_6_2025", "10:00 AM"), now())
            .await
            .unwrap();
        let appointment_id = appointment.id.unwrap();

        let stranger = ObjectId::new();
        assert!(matches!(
            cancel_appointment(&store, &stranger, &appointment_id, now()).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(!store.appointment(&appointment_id).cancelled);

        cancel_appointment(&store, &user_id, &appointment_id, now()).await.unwrap();
        assert!(matches!(
            cancel_appointment(&store, &user_id, &appointment_id, now()).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            cancel_appointment(&store, &user_id, &ObjectId::new(), now()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_keeps_paid_status() {
        let (store, doctor_id, user_id) = setup("{}").await;
        let appointment = book_appointment(&store, &user_id, &request(&doctor_id, "12_6_2025", "10:00 AM"), now())
            .await
            .unwrap();
        let appointment_id = appointment.id.unwrap();

        let mut paid = store.appointment(&appointment_id);
        paid.payment_status = PaymentStatus::Paid;
        store.put_appointment(&paid);

        let cancelled = cancel_appointment(&store, &user_id, &appointment_id, now()).await.unwrap();
        assert!(cancelled.cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_completed_appointment_cannot_be_cancelled() {
        let (store, doctor_id, user_id) = setup("{}").await;
        let appointment = book_appointment(&store, &user_id, &request(&doctor_id, "12_6_2025", "10:00 AM"), now())
            .await
            .unwrap();
        let appointment_id = appointment.id.unwrap();

        let mut completed = store.appointment(&appointment_id);
        completed.is_completed = true;
        store.put_appointment(&completed);

        assert!(matches!(
            cancel_appointment(&store, &user_id, &appointment_id, now()).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(store.slots.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let (store, doctor_id, _) = setup(r#"{"12_6_2025":["10:00 AM","11:00 AM"],"13_6_2025":["09:00 AM"]}"#).await;

        assert_eq!(store.doctor_slots(&doctor_id).await.unwrap().len(), 3);
        assert_eq!(reconcile_ledgers(&store).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_my_appointments_newest_first() {
        let (store, doctor_id, user_id) = setup("{}").await;
        let first = book_appointment(&store, &user_id, &request(&doctor_id, "12_6_2025", "10:00 AM"), now())
            .await
            .unwrap();
        let mut second = book_appointment(&store, &user_id, &request(&doctor_id, "12_6_2025", "11:00 AM"), now())
            .await
            .unwrap();
        second.date = first.date + 1_000;
        store.put_appointment(&second);

        let listed = my_appointments(&store, &user_id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
    }

    #[test]
    fn test_parse_object_id() {
        assert!(parse_object_id(None, "doctor").is_err());
        assert!(parse_object_id(Some("  "), "doctor").is_err());
        assert_eq!(parse_object_id(Some("xyz"), "doctor").unwrap_err().message(), "Invalid doctor id");
        let id = ObjectId::new();
        assert_eq!(parse_object_id(Some(&id.to_hex()), "doctor").unwrap(), id);
    }
}
