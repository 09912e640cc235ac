pub mod admin;
pub mod app;
pub mod auth;
pub mod crm;
pub mod dashboard;
pub mod metrics;
pub mod organizations;
