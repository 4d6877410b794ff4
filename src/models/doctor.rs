use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::slot::SlotLedger;
use super::user::Address;

/// Doctor account - documento na collection "doctors"
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Doctor {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    /// bcrypt hash
    pub password: String,
    pub image: String,
    pub speciality: String,
    pub degree: String,
    pub experience: String,
    pub about: String,
    /// Derived from the ledger after every booking or cancellation; doctors
    /// and the admin can also toggle it directly.
    #[serde(default = "default_available")]
    pub available: bool,
    pub fees: f64,
    #[serde(default)]
    pub address: Address,
    /// Creation timestamp (epoch millis)
    pub date: i64,
    #[serde(default)]
    pub slots_booked: SlotLedger,
}

fn default_available() -> bool {
    true
}

/// Partial update sent by the doctor panel. Absent fields stay untouched.
#[derive(Debug, Deserialize, Default, Clone, utoipa::ToSchema)]
pub struct DoctorProfileUpdate {
    pub name: Option<String>,
    pub fees: Option<f64>,
    pub address: Option<Address>,
    pub about: Option<String>,
    pub experience: Option<String>,
}

impl DoctorProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.fees.is_none()
            && self.address.is_none()
            && self.about.is_none()
            && self.experience.is_none()
    }

    pub fn apply(&self, doctor: &mut Doctor) {
        if let Some(name) = &self.name { doctor.name = name.clone(); }
        if let Some(fees) = self.fees { doctor.fees = fees; }
        if let Some(address) = &self.address { doctor.address = address.clone(); }
        if let Some(about) = &self.about { doctor.about = about.clone(); }
        if let Some(experience) = &self.experience { doctor.experience = experience.clone(); }
    }
}

/// Doctor as returned to clients. `email` is omitted from the public listing.
#[derive(Debug, Serialize, Clone)]
pub struct DoctorProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub image: String,
    pub speciality: String,
    pub degree: String,
    pub experience: String,
    pub about: String,
    pub available: bool,
    pub fees: f64,
    pub address: Address,
    pub date: i64,
    pub slots_booked: SlotLedger,
}

impl DoctorProfile {
    pub fn public(doctor: Doctor) -> Self {
        let mut profile = DoctorProfile::from(doctor);
        profile.email = None;
        profile
    }
}

impl From<Doctor> for DoctorProfile {
    fn from(doctor: Doctor) -> Self {
        DoctorProfile {
            id: doctor.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: doctor.name,
            email: Some(doctor.email),
            image: doctor.image,
            speciality: doctor.speciality,
            degree: doctor.degree,
            experience: doctor.experience,
            about: doctor.about,
            available: doctor.available,
            fees: doctor.fees,
            address: doctor.address,
            date: doctor.date,
            slots_booked: doctor.slots_booked,
        }
    }
}
