//! Warden Core — domain models, closed capability vocabulary, error
//! taxonomy and repository traits shared by every Warden crate.

pub mod error;
pub mod models;
pub mod repository;

pub use error::{WardenError, WardenResult};
