//! Domain models for Warden.

pub mod audit;
pub mod grant;
pub mod permission;
pub mod role;
pub mod user;
