use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::doctor::Doctor;
use super::slot::{SlotDate, SlotTime};
use super::user::{Address, User};

/// Payment lifecycle of an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    CancelledByUser,
    /// No code path produces it yet.
    Refunded,
}

impl PaymentStatus {
    /// Forward-only transitions. `Failed` may be retried; nothing leaves
    /// `Paid`, `CancelledByUser` or `Refunded`.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending | Failed, Paid | Failed | CancelledByUser)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::CancelledByUser => "cancelled_by_user",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Patient data frozen at booking time.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PatientSnapshot {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub image: Option<String>,
    pub address: Address,
    pub gender: String,
    pub dob: String,
}

impl From<&User> for PatientSnapshot {
    fn from(user: &User) -> Self {
        PatientSnapshot {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            image: user.image.clone(),
            address: user.address.clone(),
            gender: user.gender.clone(),
            dob: user.dob.clone(),
        }
    }
}

/// Doctor data frozen at booking time (no credentials, no ledger).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DoctorSnapshot {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub image: String,
    pub speciality: String,
    pub degree: String,
    pub experience: String,
    pub about: String,
    pub fees: f64,
    pub address: Address,
}

impl From<&Doctor> for DoctorSnapshot {
    fn from(doctor: &Doctor) -> Self {
        DoctorSnapshot {
            id: doctor.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: doctor.name.clone(),
            email: doctor.email.clone(),
            image: doctor.image.clone(),
            speciality: doctor.speciality.clone(),
            degree: doctor.degree.clone(),
            experience: doctor.experience.clone(),
            about: doctor.about.clone(),
            fees: doctor.fees,
            address: doctor.address.clone(),
        }
    }
}

/// Documento na collection "appointments"
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub doc_id: ObjectId,
    pub slot_date: SlotDate,
    pub slot_time: SlotTime,
    pub user_data: PatientSnapshot,
    pub doc_data: DoctorSnapshot,
    pub amount: f64,
    /// Booking timestamp (epoch millis)
    pub date: i64,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payu_txn_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payu_payment_id: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Appointment {
    pub fn book(
        user: &User,
        doctor: &Doctor,
        slot_date: SlotDate,
        slot_time: SlotTime,
    ) -> Option<Self> {
        let now = chrono::Utc::now().timestamp_millis();
        Some(Appointment {
            id: None,
            user_id: user.id?,
            doc_id: doctor.id?,
            slot_date,
            slot_time,
            user_data: PatientSnapshot::from(user),
            doc_data: DoctorSnapshot::from(doctor),
            amount: doctor.fees,
            date: now,
            cancelled: false,
            payment_status: PaymentStatus::Pending,
            payu_txn_id: None,
            payu_payment_id: None,
            is_completed: false,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Appointment as returned to clients.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub doc_id: String,
    pub slot_date: SlotDate,
    pub slot_time: SlotTime,
    pub user_data: PatientSnapshot,
    pub doc_data: DoctorSnapshot,
    pub amount: f64,
    pub date: i64,
    pub cancelled: bool,
    pub payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payu_payment_id: Option<String>,
    pub is_completed: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Appointment> for AppointmentResponse {
    fn from(a: Appointment) -> Self {
        AppointmentResponse {
            id: a.id.map(|id| id.to_hex()).unwrap_or_default(),
            user_id: a.user_id.to_hex(),
            doc_id: a.doc_id.to_hex(),
            slot_date: a.slot_date,
            slot_time: a.slot_time,
            user_data: a.user_data,
            doc_data: a.doc_data,
            amount: a.amount,
            date: a.date,
            cancelled: a.cancelled,
            payment_status: a.payment_status,
            payu_payment_id: a.payu_payment_id,
            is_completed: a.is_completed,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}
