//! Domain models.

pub mod filters;
pub mod movie;
pub mod user;
