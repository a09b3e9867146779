//! HTTP access to the HDUCE portal API.
//!
//! Every request goes through `HttpGateway`, which attaches the stored
//! bearer token, refuses to send a token that has already expired, and
//! treats any 401 response as the end of the session: the token store is
//! cleared and the `Navigator` is sent to the login page.

pub mod endpoints;
pub mod error;
pub mod gateway;
pub mod portal;

pub use error::ApiError;
pub use gateway::{Credential, HttpGateway, LogNavigator, Navigator, LOGIN_PATH};
