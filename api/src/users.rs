use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use myvote_shared::{Gender, Paginated, PollSummary, Session, UpdateProfile, UserProfile};
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;

use crate::{
    auth,
    db,
    error::{is_constraint_violation, AppError, AppResult},
    listing,
    polls,
    AppState,
};

const MAX_NAME: usize = 50;
const MAX_NICKNAME: usize = 20;
const MIN_BIRTH_YEAR: i32 = 1900;

#[derive(Deserialize)]
pub struct PageParams {
    page: Option<i64>,
    per_page: Option<i64>,
}

pub(crate) const PROFILE_SELECT: &str = "
    SELECT uid, email, name, nickname, birth_year, gender, created_at, last_login_at
    FROM users";

pub(crate) fn profile_from_row(row: &rusqlite::Row) -> rusqlite::Result<UserProfile> {
    let gender: Option<String> = row.get(5)?;
    Ok(UserProfile {
        uid: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        nickname: row.get(3)?,
        birth_year: row.get(4)?,
        gender: gender.as_deref().and_then(Gender::parse),
        created_at: row.get(6)?,
        last_login_at: row.get(7)?,
    })
}

fn load_profile(conn: &Connection, uid: &str) -> AppResult<UserProfile> {
    conn.query_row(&format!("{PROFILE_SELECT} WHERE uid = ?1"), [uid], profile_from_row)
        .optional()?
        .ok_or_else(|| AppError::not_found("Profile"))
}

pub fn validate_profile(req: &UpdateProfile, current_year: i32) -> AppResult<UpdateProfile> {
    let name = polls::sanitize("Name", &req.name, MAX_NAME)?;
    let nickname = polls::sanitize("Nickname", &req.nickname, MAX_NICKNAME)?;

    if let Some(year) = req.birth_year {
        if !(MIN_BIRTH_YEAR..=current_year).contains(&year) {
            return Err(AppError::validation(format!(
                "Birth year must be between {MIN_BIRTH_YEAR} and {current_year}"
            )));
        }
    }

    Ok(UpdateProfile {
        name,
        nickname,
        birth_year: req.birth_year,
        gender: req.gender,
    })
}

/// GET /api/auth/me
pub async fn session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Session>> {
    let user = auth::require_user(&headers, &state)?;
    let is_admin = user.is_admin;

    let profile = db::interact(&state.db, move |conn| {
        user.touch(conn)?;
        load_profile(conn, &user.uid)
    })
    .await?;

    Ok(Json(Session {
        user: profile,
        is_admin,
    }))
}

/// GET /api/users/me
pub async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<UserProfile>> {
    let user = auth::require_user(&headers, &state)?;

    let profile = db::interact(&state.db, move |conn| load_profile(conn, &user.uid)).await?;
    Ok(Json(profile))
}

/// PUT /api/users/me
pub async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UpdateProfile>,
) -> AppResult<Json<UserProfile>> {
    let user = auth::require_user(&headers, &state)?;

    let profile = db::interact(&state.db, move |conn| {
        let update = validate_profile(&payload, db::current_year(conn)?)?;
        user.touch(conn)?;

        conn.execute(
            "UPDATE users SET name = ?2, nickname = ?3, birth_year = ?4, gender = ?5
             WHERE uid = ?1",
            rusqlite::params![
                user.uid,
                update.name,
                update.nickname,
                update.birth_year,
                update.gender.map(|g| g.as_str()),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                AppError::Conflict("Nickname is already taken".into())
            } else {
                AppError::from(e)
            }
        })?;

        load_profile(conn, &user.uid)
    })
    .await?;

    Ok(Json(profile))
}

/// GET /api/users/me/polls — everything the caller created, private ones included
pub async fn my_polls(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Paginated<PollSummary>>> {
    let user = auth::require_user(&headers, &state)?;
    let (page, per_page, offset) = listing::page_bounds(params.page, params.per_page);

    let result = db::interact(&state.db, move |conn| {
        let now = db::now(conn)?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM polls WHERE created_by = ?1",
            [&user.uid],
            |row| row.get(0),
        )?;
        let items = polls::query_summaries(
            conn,
            "WHERE p.created_by = ?1 ORDER BY p.created_at DESC, p.id DESC LIMIT ?2 OFFSET ?3",
            rusqlite::params![user.uid, per_page, offset],
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

/// GET /api/users/me/votes — polls the caller took part in, latest vote first
pub async fn my_votes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Paginated<PollSummary>>> {
    let user = auth::require_user(&headers, &state)?;
    let (page, per_page, offset) = listing::page_bounds(params.page, params.per_page);

    let result = db::interact(&state.db, move |conn| {
        let now = db::now(conn)?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM votes WHERE user_id = ?1",
            [&user.uid],
            |row| row.get(0),
        )?;
        let items = polls::query_summaries(
            conn,
            "JOIN votes mv ON mv.poll_id = p.id AND mv.user_id = ?1
             ORDER BY mv.created_at DESC, mv.id DESC LIMIT ?2 OFFSET ?3",
            rusqlite::params![user.uid, per_page, offset],
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

#[cfg(test)]
mod tests {
    use super::*;

    fn req(nickname: &str, birth_year: Option<i32>) -> UpdateProfile {
        UpdateProfile {
            name: " Alice ".into(),
            nickname: nickname.into(),
            birth_year,
            gender: Some(Gender::Female),
        }
    }

    #[test]
    fn trims_and_keeps_valid_profile() {
        let p = validate_profile(&req(" ally ", Some(1990)), 2026).unwrap();
        assert_eq!(p.name, "Alice");
        assert_eq!(p.nickname, "ally");
        assert_eq!(p.gender, Some(Gender::Female));
    }

    #[test]
    fn birth_year_must_be_plausible() {
        assert!(validate_profile(&req("a", Some(1899)), 2026).is_err());
        assert!(validate_profile(&req("a", Some(2027)), 2026).is_err());
        assert!(validate_profile(&req("a", Some(2026)), 2026).is_ok());
        assert!(validate_profile(&req("a", None), 2026).is_ok());
    }

    #[test]
    fn long_nickname_is_rejected() {
        assert!(validate_profile(&req(&"x".repeat(21), None), 2026).is_err());
    }

    #[test]
    fn nickname_limit_applies_after_escaping() {
        // Each `<` is stored as `&lt;`.
        assert!(validate_profile(&req(&"<".repeat(MAX_NICKNAME), None), 2026).is_err());
        assert!(validate_profile(&req(&"<".repeat(MAX_NICKNAME / 4), None), 2026).is_ok());
    }
}
