//! Portal resources, fetched with the stored credential.

use tracing::debug;

use super::{endpoints, ApiError, HttpGateway};
use crate::models::{Appointment, Doctor, Notification, UserProfile};

impl HttpGateway {
    /// Profile of the signed-in user.
    pub async fn current_user(&self) -> Result<UserProfile, ApiError> {
        self.get(endpoints::USERS_ME).await
    }

    pub async fn doctors(&self) -> Result<Vec<Doctor>, ApiError> {
        let doctors: Vec<Doctor> = self.get(endpoints::DOCTORS).await?;
        debug!(count = doctors.len(), "Fetched doctors");
        Ok(doctors)
    }

    pub async fn appointments(&self) -> Result<Vec<Appointment>, ApiError> {
        let appointments: Vec<Appointment> = self.get(endpoints::APPOINTMENTS).await?;
        debug!(count = appointments.len(), "Fetched appointments");
        Ok(appointments)
    }

    pub async fn notifications(&self) -> Result<Vec<Notification>, ApiError> {
        let notifications: Vec<Notification> = self.get(endpoints::NOTIFICATIONS).await?;
        debug!(count = notifications.len(), "Fetched notifications");
        Ok(notifications)
    }
}
