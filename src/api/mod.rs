pub mod auth;
pub mod premium;
