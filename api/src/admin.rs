use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use myvote_shared::{ModeratePoll, Paginated, PollSummary, UserProfile};
use serde::Deserialize;
use tracing::info;

use crate::{
    auth,
    db,
    error::{AppError, AppResult},
    listing,
    polls::{self, PollAccess},
    users, AppState,
};

const ADMIN_PER_PAGE: i64 = 20;

/// Escapes `LIKE` wildcards so `q` matches literally (paired with `ESCAPE '\\'`).
fn like_pattern(q: &str) -> String {
    let mut escaped = String::with_capacity(q.len());
    for c in q.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Deserialize)]
pub struct AdminListParams {
    q: Option<String>,
    page: Option<i64>,
}

/// GET /api/admin/polls?q=...&page=1 — every poll, private ones included
pub async fn list_polls(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AdminListParams>,
) -> AppResult<Json<Paginated<PollSummary>>> {
    auth::require_admin(&headers, &state)?;
    let (page, per_page, offset) = listing::page_bounds(params.page, Some(ADMIN_PER_PAGE));
    let q = like_pattern(params.q.as_deref().unwrap_or_default());

    let result = db::interact(&state.db, move |conn| {
        let now = db::now(conn)?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM polls p WHERE (?1 = '' OR p.title LIKE '%' || ?1 || '%' ESCAPE '\\')",
            [&q],
            |row| row.get(0),
        )?;
        let items = polls::query_summaries(
            conn,
            "WHERE (?1 = '' OR p.title LIKE '%' || ?1 || '%' ESCAPE '\\')
             ORDER BY p.created_at DESC, p.id DESC LIMIT ?2 OFFSET ?3",
            rusqlite::params![q, per_page, offset],
            &now,
        )?;
        Ok(Paginated {
            items,
            total,
            page,
            per_page,
        })
    })
    .await?;

    Ok(Json(result))
}

/// PATCH /api/admin/polls/:id — hide a poll from listings or publish it again
pub async fn moderate_poll(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<ModeratePoll>,
) -> AppResult<Json<PollSummary>> {
    let admin = auth::require_admin(&headers, &state)?;

    let summary = db::interact(&state.db, move |conn| {
        PollAccess::load(conn, id)?;
        conn.execute(
            "UPDATE polls SET is_public = ?2 WHERE id = ?1",
            rusqlite::params![id, payload.is_public],
        )?;
        info!(poll_id = id, is_public = payload.is_public, by = %admin.email, "poll moderated");

        let now = db::now(conn)?;
        polls::query_summaries(conn, "WHERE p.id = ?1", [id], &now)?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found("Poll"))
    })
    .await?;

    Ok(Json(summary))
}

/// GET /api/admin/users?page=1
pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AdminListParams>,
) -> AppResult<Json<Paginated<UserProfile>>> {
    auth::require_admin(&headers, &state)?;
    let (page, per_page, offset) = listing::page_bounds(params.page, Some(ADMIN_PER_PAGE));
    let q = like_pattern(params.q.as_deref().unwrap_or_default());

    let result = db::interact(&state.db, move |conn| {
        let filter = "WHERE (?1 = ''
                          OR email LIKE '%' || ?1 || '%' ESCAPE '\\'
                          OR nickname LIKE '%' || ?1 || '%' ESCAPE '\\')";
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM users {filter}"),
            [&q],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "{} {filter} ORDER BY created_at DESC, uid LIMIT ?2 OFFSET ?3",
            users::PROFILE_SELECT
        ))?;
        let items = stmt
            .query_map(rusqlite::params![q, per_page, offset], users::profile_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Paginated {
            items,
            total,
            page,
            per_page,
        })
    })
    .await?;

    Ok(Json(result))
}

/// DELETE /api/admin/users/:uid — takes the user's polls, votes and comments with them
pub async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(uid): Path<String>,
) -> AppResult<StatusCode> {
    let admin = auth::require_admin(&headers, &state)?;
    if admin.uid == uid {
        return Err(AppError::validation("Admins cannot delete their own account"));
    }

    db::interact(&state.db, move |conn| {
        if conn.execute("DELETE FROM users WHERE uid = ?1", [&uid])? == 0 {
            return Err(AppError::not_found("User"));
        }
        info!(uid = %uid, by = %admin.email, "user deleted");
        Ok(StatusCode::NO_CONTENT)
    })
    .await
}
