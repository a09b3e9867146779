//! Portal API paths, relative to the configured base URL.

pub const AUTH_LOGIN: &str = "/auth/login";
pub const AUTH_VERIFY: &str = "/auth/verify";
pub const AUTH_HEALTH: &str = "/auth/health";

pub const USERS_ME: &str = "/api/v1/users/me";

pub const DOCTORS: &str = "/api/doctors/";
pub const APPOINTMENTS: &str = "/api/appointments/";
pub const NOTIFICATIONS: &str = "/api/notifications/";
