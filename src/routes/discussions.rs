use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::models::{Comment, CommentPatch, Discussion, DiscussionFields, NewComment};
use crate::discussions::CommentRef;
use crate::error::AppResult;
use crate::routes::{require_non_empty, RevisionQuery};
use crate::state::AppState;
use crate::store::Record;

#[derive(Deserialize)]
pub struct TextQuery {
    pub text: String,
}

/// Comma-separated tags, without the leading `#`.
#[derive(Deserialize)]
pub struct TagsQuery {
    pub tags: String,
}

impl TagsQuery {
    fn split(&self) -> Vec<&str> {
        self.tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/discussions", get(list_discussions).post(create_discussion))
        .route("/discussions/search", get(find_by_text))
        .route("/discussions/tags", get(find_by_tags))
        .route(
            "/discussions/{id}",
            get(get_discussion)
                .put(update_discussion)
                .delete(delete_discussion),
        )
        .route("/discussions/{id}/views", post(record_view))
        .route("/discussions/{id}/likes", post(like_discussion))
        .route("/discussions/{id}/comments", post(add_comment))
        .route(
            "/discussions/{id}/comments/{comment}",
            put(update_comment).delete(delete_comment),
        )
        .route(
            "/discussions/{id}/comments/{comment}/likes",
            post(like_comment),
        )
        .route(
            "/discussions/{id}/comments/{comment}/replies",
            post(add_reply),
        )
}

fn validate_comment(comment: &NewComment) -> AppResult<()> {
    require_non_empty("text", &comment.text)?;
    require_non_empty("author", &comment.author)
}

async fn create_discussion(
    State(state): State<AppState>,
    Json(fields): Json<DiscussionFields>,
) -> AppResult<(StatusCode, Json<Value>)> {
    require_non_empty("text", &fields.text)?;
    let discussion_id = state.discussions.create_discussion(fields)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Discussion created successfully",
            "discussion_id": discussion_id,
        })),
    ))
}

async fn list_discussions(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Record<Discussion>>>> {
    Ok(Json(state.discussions.list_discussions()?))
}

async fn find_by_text(
    State(state): State<AppState>,
    Query(query): Query<TextQuery>,
) -> AppResult<Json<Vec<Record<Discussion>>>> {
    Ok(Json(state.discussions.find_by_text(&query.text)?))
}

async fn find_by_tags(
    State(state): State<AppState>,
    Query(query): Query<TagsQuery>,
) -> AppResult<Json<Vec<Record<Discussion>>>> {
    Ok(Json(state.discussions.find_by_tags(query.split().as_slice())?))
}

async fn get_discussion(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Record<Discussion>>> {
    Ok(Json(state.discussions.get_discussion(&id)?))
}

async fn update_discussion(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(guard): Query<RevisionQuery>,
    Json(fields): Json<DiscussionFields>,
) -> AppResult<Json<Value>> {
    require_non_empty("text", &fields.text)?;
    state
        .discussions
        .update_discussion(&id, fields, guard.revision)?;
    Ok(Json(json!({ "message": "Discussion updated successfully" })))
}

async fn delete_discussion(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.discussions.delete_discussion(&id)?;
    Ok(Json(json!({ "message": "Discussion deleted successfully" })))
}

async fn record_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.discussions.record_view(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn like_discussion(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.discussions.like_discussion(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(comment): Json<NewComment>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    validate_comment(&comment)?;
    let stored = state.discussions.add_comment(&id, comment)?;
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn update_comment(
    State(state): State<AppState>,
    Path((id, comment)): Path<(String, String)>,
    Query(guard): Query<RevisionQuery>,
    Json(patch): Json<CommentPatch>,
) -> AppResult<Json<Comment>> {
    let updated = state.discussions.update_comment(
        &id,
        &CommentRef::parse(&comment),
        patch,
        guard.revision,
    )?;
    Ok(Json(updated))
}

async fn like_comment(
    State(state): State<AppState>,
    Path((id, comment)): Path<(String, String)>,
    Query(guard): Query<RevisionQuery>,
) -> AppResult<Json<Comment>> {
    let liked =
        state
            .discussions
            .like_comment(&id, &CommentRef::parse(&comment), guard.revision)?;
    Ok(Json(liked))
}

async fn delete_comment(
    State(state): State<AppState>,
    Path((id, comment)): Path<(String, String)>,
    Query(guard): Query<RevisionQuery>,
) -> AppResult<Json<Comment>> {
    let removed =
        state
            .discussions
            .delete_comment(&id, &CommentRef::parse(&comment), guard.revision)?;
    Ok(Json(removed))
}

async fn add_reply(
    State(state): State<AppState>,
    Path((id, comment)): Path<(String, String)>,
    Query(guard): Query<RevisionQuery>,
    Json(reply): Json<NewComment>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    validate_comment(&reply)?;
    let stored = state.discussions.add_reply(
        &id,
        &CommentRef::parse(&comment),
        reply,
        guard.revision,
    )?;
    Ok((StatusCode::CREATED, Json(stored)))
}
