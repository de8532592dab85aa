pub mod aggregation;
pub mod auth;
pub mod orders;
pub mod projects;
pub mod tokens;
