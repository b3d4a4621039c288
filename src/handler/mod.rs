pub mod auth;
pub mod communes;
pub mod photos;
pub mod projects;
pub mod signalements;
