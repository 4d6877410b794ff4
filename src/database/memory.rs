//! In-memory `ClinicStore` for service tests.

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::ClinicStore;
use crate::models::{
    Appointment, Doctor, DoctorProfileUpdate, SlotBooking, SlotDate, SlotLedger, SlotTime, User,
    UserProfileUpdate,
};
use crate::utils::AppError;

#[derive(Default)]
pub struct MemoryStore {
    pub users: Mutex<Vec<User>>,
    pub doctors: Mutex<Vec<Doctor>>,
    pub slots: Mutex<Vec<SlotBooking>>,
    pub appointments: Mutex<Vec<Appointment>>,
    /// Makes the next `insert_appointment` fail once.
    pub fail_next_appointment_insert: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn doctor(&self, id: &ObjectId) -> Doctor {
        self.doctors
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id.as_ref() == Some(id))
            .cloned()
            .expect("doctor exists")
    }

    pub fn appointment(&self, id: &ObjectId) -> Appointment {
        self.appointments
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id.as_ref() == Some(id))
            .cloned()
            .expect("appointment exists")
    }

    /// Overwrites a stored appointment unconditionally (fixture setup).
    pub fn put_appointment(&self, appointment: &Appointment) {
        let mut appointments = self.appointments.lock().unwrap();
        if let Some(stored) = appointments.iter_mut().find(|a| a.id == appointment.id) {
            *stored = appointment.clone();
        }
    }
}

#[async_trait]
impl ClinicStore for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn find_user(&self, id: &ObjectId) -> Result<Option<User>, AppError> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.id.as_ref() == Some(id)).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<ObjectId, AppError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == user.email) {
            return Err(AppError::Conflict("User with this email already exists.".into()));
        }
        let id = user.id.unwrap_or_else(ObjectId::new);
        let mut stored = user.clone();
        stored.id = Some(id);
        users.push(stored);
        Ok(id)
    }

    async fn update_user_profile(&self, id: &ObjectId, update: &UserProfileUpdate) -> Result<bool, AppError> {
        let mut users = self.users.lock().unwrap();
        match users.iter_mut().find(|u| u.id.as_ref() == Some(id)) {
            Some(user) => {
                user.name = update.name.clone();
                user.phone = update.phone.clone();
                user.address = update.address.clone();
                user.dob = update.dob.clone();
                user.gender = update.gender.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_user_image(&self, id: &ObjectId, url: &str) -> Result<(), AppError> {
        if let Some(user) = self.users.lock().unwrap().iter_mut().find(|u| u.id.as_ref() == Some(id)) {
            user.image = Some(url.to_string());
        }
        Ok(())
    }

    async fn count_users(&self) -> Result<u64, AppError> {
        Ok(self.users.lock().unwrap().len() as u64)
    }

    async fn find_doctor(&self, id: &ObjectId) -> Result<Option<Doctor>, AppError> {
        Ok(self.doctors.lock().unwrap().iter().find(|d| d.id.as_ref() == Some(id)).cloned())
    }

    async fn find_doctor_by_email(&self, email: &str) -> Result<Option<Doctor>, AppError> {
        Ok(self.doctors.lock().unwrap().iter().find(|d| d.email == email).cloned())
    }

    async fn insert_doctor(&self, doctor: &Doctor) -> Result<ObjectId, AppError> {
        let mut doctors = self.doctors.lock().unwrap();
        if doctors.iter().any(|d| d.email == doctor.email) {
            return Err(AppError::Conflict("Doctor already exists with this email".into()));
        }
        let id = doctor.id.unwrap_or_else(ObjectId::new);
        let mut stored = doctor.clone();
        stored.id = Some(id);
        doctors.push(stored);
        Ok(id)
    }

    async fn list_doctors(&self) -> Result<Vec<Doctor>, AppError> {
        Ok(self.doctors.lock().unwrap().clone())
    }

    async fn update_doctor_profile(&self, id: &ObjectId, update: &DoctorProfileUpdate) -> Result<Option<Doctor>, AppError> {
        let mut doctors = self.doctors.lock().unwrap();
        Ok(doctors.iter_mut().find(|d| d.id.as_ref() == Some(id)).map(|doctor| {
            update.apply(doctor);
            doctor.clone()
        }))
    }

    async fn set_doctor_available(&self, id: &ObjectId, available: bool) -> Result<bool, AppError> {
        let mut doctors = self.doctors.lock().unwrap();
        match doctors.iter_mut().find(|d| d.id.as_ref() == Some(id)) {
            Some(doctor) => {
                doctor.available = available;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn save_ledger(&self, id: &ObjectId, ledger: &SlotLedger, available: bool) -> Result<(), AppError> {
        if let Some(doctor) = self.doctors.lock().unwrap().iter_mut().find(|d| d.id.as_ref() == Some(id)) {
            doctor.slots_booked = ledger.clone();
            doctor.available = available;
        }
        Ok(())
    }

    async fn claim_slot(&self, booking: &SlotBooking) -> Result<bool, AppError> {
        let mut slots = self.slots.lock().unwrap();
        let taken = slots.iter().any(|s| {
            s.doctor_id == booking.doctor_id
                && s.slot_date == booking.slot_date
                && s.slot_time == booking.slot_time
        });
        if taken {
            return Ok(false);
        }
        slots.push(booking.clone());
        Ok(true)
    }

    async fn release_slot(&self, doctor_id: &ObjectId, date: &SlotDate, time: &SlotTime) -> Result<(), AppError> {
        self.slots.lock().unwrap().retain(|s| {
            !(s.doctor_id == *doctor_id && s.slot_date == *date && s.slot_time == *time)
        });
        Ok(())
    }

    async fn doctor_slots(&self, doctor_id: &ObjectId) -> Result<Vec<SlotBooking>, AppError> {
        Ok(self
            .slots
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.doctor_id == *doctor_id)
            .cloned()
            .collect())
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), AppError> {
        if self.fail_next_appointment_insert.swap(false, Ordering::SeqCst) {
            return Err(AppError::Database("simulated write failure".into()));
        }
        self.appointments.lock().unwrap().push(appointment.clone());
        Ok(())
    }

    async fn find_appointment(&self, id: &ObjectId) -> Result<Option<Appointment>, AppError> {
        Ok(self.appointments.lock().unwrap().iter().find(|a| a.id.as_ref() == Some(id)).cloned())
    }

    async fn find_appointment_by_txn(&self, txn_id: &str) -> Result<Option<Appointment>, AppError> {
        Ok(self
            .appointments
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.payu_txn_id.as_deref() == Some(txn_id))
            .cloned())
    }

    async fn user_appointments(&self, user_id: &ObjectId) -> Result<Vec<Appointment>, AppError> {
        let mut found: Vec<Appointment> = self
            .appointments
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.user_id == *user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(found)
    }

    async fn doctor_appointments(&self, doctor_id: &ObjectId) -> Result<Vec<Appointment>, AppError> {
        Ok(self
            .appointments
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.doc_id == *doctor_id)
            .cloned()
            .collect())
    }

    async fn all_appointments(&self) -> Result<Vec<Appointment>, AppError> {
        Ok(self.appointments.lock().unwrap().clone())
    }

    async fn save_appointment(&self, appointment: &Appointment, read: &Appointment) -> Result<bool, AppError> {
        let mut appointments = self.appointments.lock().unwrap();
        match appointments.iter_mut().find(|a| a.id == appointment.id) {
            Some(stored)
                if stored.payment_status == read.payment_status
                    && stored.cancelled == read.cancelled
                    && stored.is_completed == read.is_completed =>
            {
                *stored = appointment.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
