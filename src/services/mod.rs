pub mod admin_service;
pub mod auth_service;
pub mod booking_service;
pub mod doctor_service;
pub mod image_service;
pub mod payment_service;
pub mod user_service;
