pub mod access_token;
pub mod aggregation;
pub mod auth_service;
pub mod exception_cost;
pub mod order_service;
pub mod order_window;
pub mod project_service;
