use axum::Router;

use crate::state::AppState;

pub mod auth;
pub mod doc;
pub mod health;
pub mod orders;
pub mod params;
pub mod production;
pub mod projects;
pub mod tokens;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/projects", projects::router())
        .nest("/orders", orders::router())
        .nest("/production", production::router())
        .nest("/tokens", tokens::router())
}
