use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, to_bson, Document};
use mongodb::options::ReturnDocument;

use super::{is_duplicate_key, MongoDB, APPOINTMENTS, DOCTORS, SLOT_BOOKINGS, USERS};
use crate::models::{
    Appointment, Doctor, DoctorProfileUpdate, SlotBooking, SlotDate, SlotLedger, SlotTime, User,
    UserProfileUpdate,
};
use crate::utils::AppError;

/// Persistence used by the services. Implemented by `MongoDB`; tests use an
/// in-memory implementation.
#[async_trait]
pub trait ClinicStore: Send + Sync {
    async fn ping(&self) -> Result<(), AppError>;

    // ==================== USERS ====================
    async fn find_user(&self, id: &ObjectId) -> Result<Option<User>, AppError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    /// Fails with `Conflict` when the email is taken.
    async fn insert_user(&self, user: &User) -> Result<ObjectId, AppError>;
    /// Returns false when no such user exists.
    async fn update_user_profile(&self, id: &ObjectId, update: &UserProfileUpdate) -> Result<bool, AppError>;
    async fn set_user_image(&self, id: &ObjectId, url: &str) -> Result<(), AppError>;
    async fn count_users(&self) -> Result<u64, AppError>;

    // ==================== DOCTORS ====================
    async fn find_doctor(&self, id: &ObjectId) -> Result<Option<Doctor>, AppError>;
    async fn find_doctor_by_email(&self, email: &str) -> Result<Option<Doctor>, AppError>;
    /// Fails with `Conflict` when the email is taken.
    async fn insert_doctor(&self, doctor: &Doctor) -> Result<ObjectId, AppError>;
    async fn list_doctors(&self) -> Result<Vec<Doctor>, AppError>;
    async fn update_doctor_profile(&self, id: &ObjectId, update: &DoctorProfileUpdate) -> Result<Option<Doctor>, AppError>;
    /// Returns false when no such doctor exists.
    async fn set_doctor_available(&self, id: &ObjectId, available: bool) -> Result<bool, AppError>;
    /// Writes ledger and availability in a single update.
    async fn save_ledger(&self, id: &ObjectId, ledger: &SlotLedger, available: bool) -> Result<(), AppError>;

    // ==================== SLOT ROWS ====================
    /// Returns false when the slot is already taken.
    async fn claim_slot(&self, booking: &SlotBooking) -> Result<bool, AppError>;
    async fn release_slot(&self, doctor_id: &ObjectId, date: &SlotDate, time: &SlotTime) -> Result<(), AppError>;
    async fn doctor_slots(&self, doctor_id: &ObjectId) -> Result<Vec<SlotBooking>, AppError>;

    // ==================== APPOINTMENTS ====================
    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), AppError>;
    async fn find_appointment(&self, id: &ObjectId) -> Result<Option<Appointment>, AppError>;
    async fn find_appointment_by_txn(&self, txn_id: &str) -> Result<Option<Appointment>, AppError>;
    async fn user_appointments(&self, user_id: &ObjectId) -> Result<Vec<Appointment>, AppError>;
    async fn doctor_appointments(&self, doctor_id: &ObjectId) -> Result<Vec<Appointment>, AppError>;
    async fn all_appointments(&self) -> Result<Vec<Appointment>, AppError>;
    /// Replaces the stored appointment with `appointment`, but only while its
    /// payment status and terminal flags still equal those of `read`.
    /// Returns false when another write changed them first.
    async fn save_appointment(&self, appointment: &Appointment, read: &Appointment) -> Result<bool, AppError>;
}

fn required_id(id: Option<ObjectId>, what: &str) -> Result<ObjectId, AppError> {
    id.ok_or_else(|| AppError::Internal(format!("{} has no id", what)))
}

#[async_trait]
impl ClinicStore for MongoDB {
    async fn ping(&self) -> Result<(), AppError> {
        self.health_check().await
    }

    async fn find_user(&self, id: &ObjectId) -> Result<Option<User>, AppError> {
        Ok(self.collection::<User>(USERS).find_one(doc! { "_id": id }).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.collection::<User>(USERS).find_one(doc! { "email": email }).await?)
    }

    async fn insert_user(&self, user: &User) -> Result<ObjectId, AppError> {
        match self.collection::<User>(USERS).insert_one(user).await {
            Ok(result) => result
                .inserted_id
                .as_object_id()
                .ok_or_else(|| AppError::Database("Inserted user has no ObjectId".into())),
            Err(e) if is_duplicate_key(&e) => {
                Err(AppError::Conflict("User with this email already exists.".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_user_profile(&self, id: &ObjectId, update: &UserProfileUpdate) -> Result<bool, AppError> {
        let result = self
            .collection::<User>(USERS)
            .update_one(
                doc! { "_id": id },
                doc! { "$set": {
                    "name": &update.name,
                    "phone": &update.phone,
                    "address": to_bson(&update.address)?,
                    "dob": &update.dob,
                    "gender": &update.gender,
                }},
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn set_user_image(&self, id: &ObjectId, url: &str) -> Result<(), AppError> {
        self.collection::<User>(USERS)
            .update_one(doc! { "_id": id }, doc! { "$set": { "image": url } })
            .await?;
        Ok(())
    }

    async fn count_users(&self) -> Result<u64, AppError> {
        Ok(self.collection::<User>(USERS).count_documents(doc! {}).await?)
    }

    async fn find_doctor(&self, id: &ObjectId) -> Result<Option<Doctor>, AppError> {
        Ok(self.collection::<Doctor>(DOCTORS).find_one(doc! { "_id": id }).await?)
    }

    async fn find_doctor_by_email(&self, email: &str) -> Result<Option<Doctor>, AppError> {
        Ok(self.collection::<Doctor>(DOCTORS).find_one(doc! { "email": email }).await?)
    }

    async fn insert_doctor(&self, doctor: &Doctor) -> Result<ObjectId, AppError> {
        match self.collection::<Doctor>(DOCTORS).insert_one(doctor).await {
            Ok(result) => result
                .inserted_id
                .as_object_id()
                .ok_or_else(|| AppError::Database("Inserted doctor has no ObjectId".into())),
            Err(e) if is_duplicate_key(&e) => {
                Err(AppError::Conflict("Doctor already exists with this email".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_doctors(&self) -> Result<Vec<Doctor>, AppError> {
        let cursor = self.collection::<Doctor>(DOCTORS).find(doc! {}).await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }

    async fn update_doctor_profile(&self, id: &ObjectId, update: &DoctorProfileUpdate) -> Result<Option<Doctor>, AppError> {
        let mut set = Document::new();
        if let Some(name) = &update.name { set.insert("name", name); }
        if let Some(fees) = update.fees { set.insert("fees", fees); }
        if let Some(address) = &update.address { set.insert("address", to_bson(address)?); }
        if let Some(about) = &update.about { set.insert("about", about); }
        if let Some(experience) = &update.experience { set.insert("experience", experience); }

        if set.is_empty() {
            return self.find_doctor(id).await;
        }

        Ok(self
            .collection::<Doctor>(DOCTORS)
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn set_doctor_available(&self, id: &ObjectId, available: bool) -> Result<bool, AppError> {
        let result = self
            .collection::<Doctor>(DOCTORS)
            .update_one(doc! { "_id": id }, doc! { "$set": { "available": available } })
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn save_ledger(&self, id: &ObjectId, ledger: &SlotLedger, available: bool) -> Result<(), AppError> {
        self.collection::<Doctor>(DOCTORS)
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "slots_booked": to_bson(ledger)?, "available": available } },
            )
            .await?;
        Ok(())
    }

    async fn claim_slot(&self, booking: &SlotBooking) -> Result<bool, AppError> {
        match self.collection::<SlotBooking>(SLOT_BOOKINGS).insert_one(booking).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn release_slot(&self, doctor_id: &ObjectId, date: &SlotDate, time: &SlotTime) -> Result<(), AppError> {
        self.collection::<SlotBooking>(SLOT_BOOKINGS)
            .delete_one(doc! {
                "doctor_id": doctor_id,
                "slot_date": date.to_string(),
                "slot_time": time.to_string(),
            })
            .await?;
        Ok(())
    }

    async fn doctor_slots(&self, doctor_id: &ObjectId) -> Result<Vec<SlotBooking>, AppError> {
        let cursor = self
            .collection::<SlotBooking>(SLOT_BOOKINGS)
            .find(doc! { "doctor_id": doctor_id })
            .await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), AppError> {
        self.collection::<Appointment>(APPOINTMENTS)
            .insert_one(appointment)
            .await?;
        Ok(())
    }

    async fn find_appointment(&self, id: &ObjectId) -> Result<Option<Appointment>, AppError> {
        Ok(self
            .collection::<Appointment>(APPOINTMENTS)
            .find_one(doc! { "_id": id })
            .await?)
    }

    async fn find_appointment_by_txn(&self, txn_id: &str) -> Result<Option<Appointment>, AppError> {
        Ok(self
            .collection::<Appointment>(APPOINTMENTS)
            .find_one(doc! { "payuTxnId": txn_id })
            .await?)
    }

    async fn user_appointments(&self, user_id: &ObjectId) -> Result<Vec<Appointment>, AppError> {
        let cursor = self
            .collection::<Appointment>(APPOINTMENTS)
            .find(doc! { "userId": user_id })
            .sort(doc! { "date": -1 })
            .await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }

    async fn doctor_appointments(&self, doctor_id: &ObjectId) -> Result<Vec<Appointment>, AppError> {
        let cursor = self
            .collection::<Appointment>(APPOINTMENTS)
            .find(doc! { "docId": doctor_id })
            .await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }

    async fn all_appointments(&self) -> Result<Vec<Appointment>, AppError> {
        let cursor = self
            .collection::<Appointment>(APPOINTMENTS)
            .find(doc! {})
            .sort(doc! { "date": -1 })
            .await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }

    async fn save_appointment(&self, appointment: &Appointment, read: &Appointment) -> Result<bool, AppError> {
        let id = required_id(appointment.id, "Appointment")?;
        let filter = doc! {
            "_id": id,
            "paymentStatus": read.payment_status.as_str(),
            "cancelled": read.cancelled,
            "isCompleted": read.is_completed,
        };
        let result = self
            .collection::<Appointment>(APPOINTMENTS)
            .replace_one(filter, appointment)
            .await?;
        Ok(result.matched_count == 1)
    }
}
