//! REST-Handler fuer /v1/sessions

pub mod devices;
pub mod sessions;
