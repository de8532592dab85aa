pub mod audit;
pub mod config;
pub mod db;
pub mod dto;
pub mod entity;
pub mod error;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod permissions;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
