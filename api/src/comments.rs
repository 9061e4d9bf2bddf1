use std::collections::{HashMap, HashSet};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use myvote_shared::{Comment, CommentThread, CreateComment, EditComment};
use rusqlite::{Connection, OptionalExtension};

use crate::{
    auth,
    db,
    error::{AppError, AppResult},
    polls::{self, AccessParams, PollAccess},
    AppState,
};

const MAX_BODY: usize = 1000;

const COMMENT_SELECT: &str = "
    SELECT c.id, c.poll_id, c.parent_id, u.uid,
           COALESCE(NULLIF(u.nickname, ''), NULLIF(u.name, ''), 'Anonymous'),
           c.body, c.created_at, c.updated_at
    FROM comments c
    JOIN users u ON c.user_id = u.uid";

fn comment_from_row(row: &rusqlite::Row) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        poll_id: row.get(1)?,
        parent_id: row.get(2)?,
        author_uid: row.get(3)?,
        author_name: row.get(4)?,
        body: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn load_comment(conn: &Connection, id: i64) -> AppResult<Comment> {
    conn.query_row(&format!("{COMMENT_SELECT} WHERE c.id = ?1"), [id], comment_from_row)
        .optional()?
        .ok_or_else(|| AppError::not_found("Comment"))
}

/// Groups replies under their top-level comment, keeping the input order
/// (oldest first) for both. A reply whose parent is not a top-level comment
/// in `comments` becomes a top-level entry itself.
pub fn thread(comments: Vec<Comment>) -> Vec<CommentThread> {
    let roots: HashSet<i64> = comments
        .iter()
        .filter(|c| c.parent_id.is_none())
        .map(|c| c.id)
        .collect();

    let mut threads = Vec::new();
    let mut replies: HashMap<i64, Vec<Comment>> = HashMap::new();

    for comment in comments {
        match comment.parent_id {
            Some(parent) if roots.contains(&parent) => {
                replies.entry(parent).or_default().push(comment);
            }
            _ => threads.push(CommentThread {
                comment,
                replies: Vec::new(),
            }),
        }
    }

    for t in &mut threads {
        if let Some(r) = replies.remove(&t.comment.id) {
            t.replies = r;
        }
    }
    threads
}

/// GET /api/polls/:id/comments
pub async fn list_comments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(poll_id): Path<i64>,
    Query(access): Query<AccessParams>,
) -> AppResult<Json<Vec<CommentThread>>> {
    let user = auth::optional_user(&headers, &state);

    let comments = db::interact(&state.db, move |conn| {
        PollAccess::load(conn, poll_id)?.ensure_readable(user.as_ref(), access.password.as_deref())?;

        let mut stmt = conn.prepare(&format!(
            "{COMMENT_SELECT} WHERE c.poll_id = ?1 ORDER BY c.created_at ASC, c.id ASC"
        ))?;
        let rows = stmt
            .query_map([poll_id], comment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .await?;

    Ok(Json(thread(comments)))
}

/// POST /api/polls/:id/comments
pub async fn create_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(poll_id): Path<i64>,
    Query(access): Query<AccessParams>,
    Json(payload): Json<CreateComment>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let user = auth::require_user(&headers, &state)?;
    let body = polls::clean_text("Comment", &payload.body, MAX_BODY)?;
    let parent_id = payload.parent_id;

    let comment = db::interact(&state.db, move |conn| {
        PollAccess::load(conn, poll_id)?.ensure_readable(Some(&user), access.password.as_deref())?;

        if let Some(parent) = parent_id {
            let parent_row: Option<(i64, Option<i64>)> = conn
                .query_row(
                    "SELECT poll_id, parent_id FROM comments WHERE id = ?1",
                    [parent],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match parent_row {
                None => return Err(AppError::not_found("Parent comment")),
                Some((p, _)) if p != poll_id => {
                    return Err(AppError::validation("Parent comment belongs to another poll"))
                }
                Some((_, Some(_))) => {
                    return Err(AppError::validation("Replies cannot be nested"))
                }
                Some(_) => {}
            }
        }

        user.touch(conn)?;
        conn.execute(
            "INSERT INTO comments (poll_id, parent_id, user_id, body) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![poll_id, parent_id, user.uid, body],
        )?;
        load_comment(conn, conn.last_insert_rowid())
    })
    .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

fn comment_owner(conn: &Connection, id: i64) -> AppResult<String> {
    conn.query_row("SELECT user_id FROM comments WHERE id = ?1", [id], |row| {
        row.get(0)
    })
    .optional()?
    .ok_or_else(|| AppError::not_found("Comment"))
}

/// PATCH /api/comments/:id — author only
pub async fn edit_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<EditComment>,
) -> AppResult<Json<Comment>> {
    let user = auth::require_user(&headers, &state)?;
    let body = polls::clean_text("Comment", &payload.body, MAX_BODY)?;

    let comment = db::interact(&state.db, move |conn| {
        if comment_owner(conn, id)? != user.uid {
            return Err(AppError::Forbidden("Only the author can edit this comment".into()));
        }
        conn.execute(
            "UPDATE comments SET body = ?2, updated_at = datetime('now') WHERE id = ?1",
            rusqlite::params![id, body],
        )?;
        load_comment(conn, id)
    })
    .await?;

    Ok(Json(comment))
}

/// DELETE /api/comments/:id — author or admin; replies go with it
pub async fn delete_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let user = auth::require_user(&headers, &state)?;

    db::interact(&state.db, move |conn| {
        if !user.can_manage(&comment_owner(conn, id)?) {
            return Err(AppError::Forbidden("Not allowed to delete this comment".into()));
        }
        conn.execute("DELETE FROM comments WHERE id = ?1", [id])?;
        Ok(StatusCode::NO_CONTENT)
    })
    .await
}
