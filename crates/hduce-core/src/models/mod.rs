//! Data models for the HDUCE portal API.
//!
//! - `user`: the signed-in user's profile and role
//! - `portal`: doctors, appointments and notifications

pub mod portal;
pub mod user;

pub use portal::{
    Appointment, AppointmentStatus, Doctor, Notification, NotificationKind, Specialty,
    SpecialtyRef,
};
pub use user::{Role, UserProfile};
