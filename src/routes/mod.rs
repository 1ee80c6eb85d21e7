pub mod discussions;
pub mod users;

use axum::Router;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Full HTTP surface with request tracing.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(users::router())
        .merge(discussions::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Optional `?revision=` guard for load-modify-store writes.
#[derive(Debug, Default, Deserialize)]
pub struct RevisionQuery {
    pub revision: Option<i64>,
}

fn require_non_empty(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{field} cannot be empty")));
    }
    Ok(())
}
