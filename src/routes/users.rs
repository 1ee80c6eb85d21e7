use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::models::{User, UserFields};
use crate::error::AppResult;
use crate::routes::{require_non_empty, RevisionQuery};
use crate::state::AppState;
use crate::store::Record;

#[derive(Deserialize)]
pub struct SearchQuery {
    pub name: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/search", get(search_users))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/{id}/following", get(list_followed_users))
        .route(
            "/users/{id}/following/{target_id}",
            post(follow).delete(unfollow),
        )
        .route("/users/{id}/followers", get(list_followers))
}

fn validate(fields: &UserFields) -> AppResult<()> {
    require_non_empty("name", &fields.name)?;
    require_non_empty("mobile", &fields.mobile)?;
    require_non_empty("email", &fields.email)
}

async fn create_user(
    State(state): State<AppState>,
    Json(fields): Json<UserFields>,
) -> AppResult<(StatusCode, Json<Value>)> {
    validate(&fields)?;
    let user_id = state.users.create_user(fields)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User created successfully", "user_id": user_id })),
    ))
}

async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<Record<User>>>> {
    Ok(Json(state.users.list_users()?))
}

async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<Record<User>>>> {
    Ok(Json(state.users.search_users(&query.name)?))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Record<User>>> {
    Ok(Json(state.users.get_user(&id)?))
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(guard): Query<RevisionQuery>,
    Json(fields): Json<UserFields>,
) -> AppResult<Json<Value>> {
    validate(&fields)?;
    state.users.update_user(&id, fields, guard.revision)?;
    Ok(Json(json!({ "message": "User updated successfully" })))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.users.delete_user(&id)?;
    Ok(Json(json!({ "message": "User deleted successfully" })))
}

async fn follow(
    State(state): State<AppState>,
    Path((id, target_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let status = state.users.follow(&id, &target_id)?;
    Ok(Json(json!({ "status": status })))
}

async fn unfollow(
    State(state): State<AppState>,
    Path((id, target_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let status = state.users.unfollow(&id, &target_id)?;
    Ok(Json(json!({ "status": status })))
}

async fn list_followed_users(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Record<User>>>> {
    Ok(Json(state.users.list_followed_users(&id)?))
}

async fn list_followers(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Record<User>>>> {
    Ok(Json(state.users.list_followers(&id)?))
}
