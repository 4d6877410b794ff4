pub mod appointment;
pub mod doctor;
pub mod slot;
pub mod user;

pub use appointment::*;
pub use doctor::*;
pub use slot::*;
pub use user::*;
