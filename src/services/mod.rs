pub mod analytics;
pub mod auth;
pub mod excel;
pub mod store;
