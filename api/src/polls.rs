use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use myvote_shared::*;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Deserialize;
use tracing::info;

use crate::{
    auth::{self, AuthUser},
    db,
    error::{AppError, AppResult},
    listing::{self, ListParams},
    AppState,
};

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 10;
const MAX_TITLE: usize = 100;
const MAX_DESCRIPTION: usize = 1000;
const MAX_OPTION_TEXT: usize = 100;
const MAX_PASSWORD: usize = 50;

// ── Query params ──

#[derive(Deserialize, Default)]
pub struct AccessParams {
    pub password: Option<String>,
}

// ── Row mapping shared by every poll listing ──

pub(crate) const SUMMARY_SELECT: &str = "
    SELECT p.id, p.title, p.description, c.slug, c.name,
           COALESCE((SELECT o.image_url FROM poll_options o
                     WHERE o.poll_id = p.id AND o.image_url IS NOT NULL
                     ORDER BY o.position LIMIT 1), c.image_path),
           p.is_public, p.password IS NOT NULL, p.deadline, p.max_participants,
           (SELECT COUNT(*) FROM votes v WHERE v.poll_id = p.id),
           p.created_by, p.created_at
    FROM polls p
    JOIN categories c ON p.category_id = c.id";

pub(crate) fn summary_from_row(row: &Row, now: &str) -> rusqlite::Result<PollSummary> {
    let deadline: String = row.get(8)?;
    Ok(PollSummary {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category_slug: row.get(3)?,
        category_name: row.get(4)?,
        image: row.get(5)?,
        is_public: row.get(6)?,
        has_password: row.get(7)?,
        status: listing::status_at(&deadline, now),
        deadline,
        max_participants: row.get(9)?,
        vote_count: row.get(10)?,
        created_by: row.get(11)?,
        created_at: row.get(12)?,
    })
}

/// Runs `SUMMARY_SELECT` followed by `tail` (WHERE/ORDER/LIMIT).
pub(crate) fn query_summaries<P: rusqlite::Params>(
    conn: &Connection,
    tail: &str,
    params: P,
    now: &str,
) -> AppResult<Vec<PollSummary>> {
    let sql = format!("{SUMMARY_SELECT} {tail}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, |row| summary_from_row(row, now))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Access control ──

/// The columns every poll permission check needs.
#[derive(Debug, Clone)]
pub struct PollAccess {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub is_public: bool,
    pub password: Option<String>,
    pub deadline: String,
    pub max_participants: Option<i64>,
    pub created_by: String,
}

impl PollAccess {
    pub fn load(conn: &Connection, id: i64) -> AppResult<Self> {
        conn.query_row(
            "SELECT id, title, description, is_public, password, deadline,
                    max_participants, created_by
             FROM polls WHERE id = ?1",
            [id],
            |row| {
                Ok(PollAccess {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    is_public: row.get(3)?,
                    password: row.get(4)?,
                    deadline: row.get(5)?,
                    max_participants: row.get(6)?,
                    created_by: row.get(7)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| AppError::not_found("Poll"))
    }

    pub fn is_ended(&self, now: &str) -> bool {
        listing::status_at(&self.deadline, now) == PollStatus::Ended
    }

    /// Public polls and link-only private polls are open to anyone. A private
    /// poll with a password needs it, unless the caller owns it or is admin.
    pub fn ensure_readable(&self, user: Option<&AuthUser>, supplied: Option<&str>) -> AppResult<()> {
        let Some(expected) = self.password.as_deref().filter(|_| !self.is_public) else {
            return Ok(());
        };

        if user.is_some_and(|u| u.can_manage(&self.created_by)) {
            return Ok(());
        }

        match supplied {
            Some(given) if given == expected => Ok(()),
            Some(_) => Err(AppError::Forbidden("Incorrect poll password".into())),
            None => Err(AppError::Forbidden("This poll requires a password".into())),
        }
    }
}

// ── Loading ──

pub fn load_poll(conn: &Connection, id: i64, viewer: Option<&str>, now: &str) -> AppResult<Poll> {
    let summary = query_summaries(conn, "WHERE p.id = ?1", [id], now)?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::not_found("Poll"))?;

    let mut stmt = conn.prepare(
        "SELECT o.id, o.text, o.image_url,
                (SELECT COUNT(*) FROM votes v WHERE v.option_id = o.id)
         FROM poll_options o
         WHERE o.poll_id = ?1
         ORDER BY o.position",
    )?;
    let options = stmt
        .query_map([id], |row| {
            Ok(PollOption {
                id: row.get(0)?,
                text: row.get(1)?,
                image_url: row.get(2)?,
                vote_count: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let user_vote = match viewer {
        Some(uid) => user_vote(conn, id, uid)?,
        None => None,
    };

    Ok(Poll {
        summary,
        options,
        user_vote,
    })
}

pub fn user_vote(conn: &Connection, poll_id: i64, uid: &str) -> AppResult<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT option_id FROM votes WHERE poll_id = ?1 AND user_id = ?2",
            rusqlite::params![poll_id, uid],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn participant_count(conn: &Connection, poll_id: i64) -> AppResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM votes WHERE poll_id = ?1",
        [poll_id],
        |row| row.get(0),
    )?)
}

// ── Validation ──

/// Sanitises `raw` and bounds the stored result, so escaped markup counts
/// toward `max` the same way everywhere.
pub(crate) fn sanitize(field: &str, raw: &str, max: usize) -> AppResult<String> {
    let cleaned = ammonia::clean(raw.trim());
    if cleaned.chars().count() > max {
        return Err(AppError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(cleaned)
}

pub(crate) fn clean_text(field: &str, raw: &str, max: usize) -> AppResult<String> {
    let cleaned = sanitize(field, raw, max)?;
    if cleaned.trim().is_empty() {
        return Err(AppError::validation(format!("{field} must not be empty")));
    }
    Ok(cleaned)
}

fn clean_description(raw: &str) -> AppResult<String> {
    sanitize("Description", raw, MAX_DESCRIPTION)
}

fn clean_image_url(url: Option<&str>) -> AppResult<Option<String>> {
    match url.map(str::trim).filter(|u| !u.is_empty()) {
        None => Ok(None),
        Some(u) if u.starts_with("https://") || u.starts_with("http://") => Ok(Some(u.to_string())),
        Some(_) => Err(AppError::validation("Option image must be an http(s) URL")),
    }
}

/// Empty means "no password".
fn clean_password(password: Option<&str>) -> AppResult<Option<String>> {
    match password.filter(|p| !p.is_empty()) {
        None => Ok(None),
        Some(p) if p.chars().count() > MAX_PASSWORD => Err(AppError::validation(format!(
            "Password must be at most {MAX_PASSWORD} characters"
        ))),
        Some(p) => Ok(Some(p.to_string())),
    }
}

fn check_max_participants(max: Option<i64>) -> AppResult<()> {
    match max {
        Some(n) if n < 1 => Err(AppError::validation(
            "Participant limit must be at least 1",
        )),
        _ => Ok(()),
    }
}

/// Sanitised form of a `CreatePoll` request, minus the deadline which needs the DB clock.
#[derive(Debug)]
pub struct NewPoll {
    pub title: String,
    pub description: String,
    pub category_slug: String,
    pub options: Vec<(String, Option<String>)>,
    pub is_public: bool,
    pub password: Option<String>,
    pub max_participants: Option<i64>,
}

pub fn validate_new_poll(req: &CreatePoll) -> AppResult<NewPoll> {
    let title = clean_text("Title", &req.title, MAX_TITLE)?;
    let description = clean_description(&req.description)?;

    if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&req.options.len()) {
        return Err(AppError::validation(format!(
            "A poll needs between {MIN_OPTIONS} and {MAX_OPTIONS} options"
        )));
    }
    let options = req
        .options
        .iter()
        .map(|o| -> AppResult<(String, Option<String>)> {
            Ok((
                clean_text("Option", &o.text, MAX_OPTION_TEXT)?,
                clean_image_url(o.image_url.as_deref())?,
            ))
        })
        .collect::<AppResult<Vec<_>>>()?;

    check_max_participants(req.max_participants)?;

    // Public polls are listed for everyone, a password would be meaningless.
    let password = if req.is_public {
        None
    } else {
        clean_password(req.password.as_deref())?
    };

    Ok(NewPoll {
        title,
        description,
        category_slug: req.category_slug.trim().to_string(),
        options,
        is_public: req.is_public,
        password,
        max_participants: req.max_participants,
    })
}

fn future_deadline(conn: &Connection, raw: &str, now: &str) -> AppResult<String> {
    let deadline = db::normalize_timestamp(conn, raw)?;
    if deadline.as_str() <= now {
        return Err(AppError::validation("Deadline must be in the future"));
    }
    Ok(deadline)
}

// ── Handlers ──

/// GET /api/polls
pub async fn list_polls(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Paginated<PollSummary>>> {
    let page = db::interact(&state.db, move |conn| {
        let now = db::now(conn)?;
        let polls = query_summaries(
            conn,
            "WHERE p.is_public = 1 ORDER BY p.created_at DESC, p.id DESC",
            [],
            &now,
        )?;
        Ok(listing::apply(polls, &params))
    })
    .await?;

    Ok(Json(page))
}

/// POST /api/polls
pub async fn create_poll(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePoll>,
) -> AppResult<(StatusCode, Json<Poll>)> {
    let user = auth::require_user(&headers, &state)?;
    let new = validate_new_poll(&payload)?;
    let raw_deadline = payload.deadline;

    let poll = db::interact(&state.db, move |conn| {
        user.touch(conn)?;
        let now = db::now(conn)?;
        let deadline = future_deadline(conn, &raw_deadline, &now)?;

        let category_id: i64 = conn
            .query_row(
                "SELECT id FROM categories WHERE slug = ?1",
                [&new.category_slug],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| AppError::not_found("Category"))?;

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO polls (title, description, category_id, is_public, password,
                                deadline, max_participants, created_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                new.title,
                new.description,
                category_id,
                new.is_public,
                new.password,
                deadline,
                new.max_participants,
                user.uid,
            ],
        )?;
        let id = tx.last_insert_rowid();

        for (position, (text, image_url)) in new.options.iter().enumerate() {
            tx.execute(
                "INSERT INTO poll_options (poll_id, position, text, image_url)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, position as i64, text, image_url],
            )?;
        }
        tx.commit()?;

        info!(poll_id = id, creator = %user.uid, "poll created");
        load_poll(conn, id, Some(user.uid.as_str()), &now)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(poll)))
}

/// GET /api/polls/:id?password=...
pub async fn get_poll(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Query(access): Query<AccessParams>,
) -> AppResult<Json<Poll>> {
    let user = auth::optional_user(&headers, &state);

    let poll = db::interact(&state.db, move |conn| {
        PollAccess::load(conn, id)?.ensure_readable(user.as_ref(), access.password.as_deref())?;
        let now = db::now(conn)?;
        load_poll(conn, id, user.as_ref().map(|u| u.uid.as_str()), &now)
    })
    .await?;

    Ok(Json(poll))
}

/// PATCH /api/polls/:id — creator only; options are fixed once created.
pub async fn update_poll(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<UpdatePoll>,
) -> AppResult<Json<Poll>> {
    let user = auth::require_user(&headers, &state)?;

    let title = payload
        .title
        .as_deref()
        .map(|t| clean_text("Title", t, MAX_TITLE))
        .transpose()?;
    let description = payload
        .description
        .as_deref()
        .map(clean_description)
        .transpose()?;
    check_max_participants(payload.max_participants.flatten())?;

    let poll = db::interact(&state.db, move |conn| {
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let current = PollAccess::load(&tx, id)?;
        if current.created_by != user.uid {
            return Err(AppError::Forbidden("Only the creator can edit this poll".into()));
        }

        let now = db::now(&tx)?;
        let deadline = match payload.deadline.as_deref() {
            Some(raw) => future_deadline(&tx, raw, &now)?,
            None => current.deadline.clone(),
        };

        let is_public = payload.is_public.unwrap_or(current.is_public);
        let password = match payload.password.as_deref() {
            Some(p) => clean_password(Some(p))?,
            None => current.password.clone(),
        };
        let password = if is_public { None } else { password };

        // `Some(None)` lifts the limit.
        let max_participants = payload.max_participants.unwrap_or(current.max_participants);
        if let Some(Some(max)) = payload.max_participants {
            if max < participant_count(&tx, id)? {
                return Err(AppError::Conflict(
                    "Participant limit is below the current number of voters".into(),
                ));
            }
        }

        tx.execute(
            "UPDATE polls
             SET title = ?2, description = ?3, deadline = ?4, is_public = ?5,
                 password = ?6, max_participants = ?7
             WHERE id = ?1",
            rusqlite::params![
                id,
                title.unwrap_or(current.title),
                description.unwrap_or(current.description),
                deadline,
                is_public,
                password,
                max_participants,
            ],
        )?;
        tx.commit()?;

        load_poll(conn, id, Some(user.uid.as_str()), &now)
    })
    .await?;

    Ok(Json(poll))
}

/// DELETE /api/polls/:id — creator or admin
pub async fn delete_poll(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let user = auth::require_user(&headers, &state)?;

    db::interact(&state.db, move |conn| {
        let poll = PollAccess::load(conn, id)?;
        if !user.can_manage(&poll.created_by) {
            return Err(AppError::Forbidden("Not allowed to delete this poll".into()));
        }
        conn.execute("DELETE FROM polls WHERE id = ?1", [id])?;
        info!(poll_id = id, by = %user.uid, "poll deleted");
        Ok(StatusCode::NO_CONTENT)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(options: &[&str]) -> CreatePoll {
        CreatePoll {
            title: "  Lunch?  ".into(),
            description: String::new(),
            category_slug: "food".into(),
            options: options
                .iter()
                .map(|t| NewOption {
                    text: t.to_string(),
                    image_url: None,
                })
                .collect(),
            is_public: true,
            password: Some("ignored".into()),
            deadline: "2030-01-01".into(),
            max_participants: None,
        }
    }

    fn access(is_public: bool, password: Option<&str>) -> PollAccess {
        PollAccess {
            id: 1,
            title: "t".into(),
            description: String::new(),
            is_public,
            password: password.map(str::to_string),
            deadline: "2030-01-01 00:00:00".into(),
            max_participants: None,
            created_by: "owner".into(),
        }
    }

    fn user(uid: &str, is_admin: bool) -> AuthUser {
        AuthUser {
            uid: uid.into(),
            email: format!("{uid}@myvote.dev"),
            is_admin,
        }
    }

    #[test]
    fn two_options_are_accepted_and_trimmed() {
        let poll = validate_new_poll(&request(&["Pizza", " Sushi "])).unwrap();
        assert_eq!(poll.title, "Lunch?");
        assert_eq!(poll.options.len(), 2);
        assert_eq!(poll.options[1].0, "Sushi");
        assert!(poll.password.is_none(), "public polls drop the password");
    }

    #[test]
    fn option_count_is_bounded() {
        assert!(validate_new_poll(&request(&["only one"])).is_err());
        let many: Vec<String> = (0..=MAX_OPTIONS).map(|i| format!("o{i}")).collect();
        let many: Vec<&str> = many.iter().map(String::as_str).collect();
        assert!(validate_new_poll(&request(&many)).is_err());
    }

    #[test]
    fn blank_option_and_bad_image_are_rejected() {
        assert!(validate_new_poll(&request(&["a", "   "])).is_err());

        let mut req = request(&["a", "b"]);
        req.options[0].image_url = Some("javascript:alert(1)".into());
        assert!(validate_new_poll(&req).is_err());
    }

    #[test]
    fn markup_is_sanitised() {
        let mut req = request(&["a", "b"]);
        req.title = "<script>alert(1)</script>Hi".into();
        assert_eq!(validate_new_poll(&req).unwrap().title, "Hi");
    }

    #[test]
    fn length_is_measured_on_the_stored_text() {
        let escaped = "&".repeat(MAX_TITLE / 5 + 1);
        assert!(clean_text("Title", &escaped, MAX_TITLE).is_err());
        assert_eq!(clean_text("Title", "Fish & Chips", MAX_TITLE).unwrap(), "Fish &amp; Chips");
    }

    #[test]
    fn private_poll_keeps_password() {
        let mut req = request(&["a", "b"]);
        req.is_public = false;
        req.password = Some("1234".into());
        assert_eq!(validate_new_poll(&req).unwrap().password.as_deref(), Some("1234"));

        req.password = Some(String::new());
        assert!(validate_new_poll(&req).unwrap().password.is_none());
    }

    #[test]
    fn protected_poll_needs_password_unless_owner() {
        let poll = access(false, Some("pw"));
        assert!(poll.ensure_readable(None, Some("pw")).is_ok());
        assert!(poll.ensure_readable(None, Some("nope")).is_err());
        assert!(poll.ensure_readable(Some(&user("someone", false)), None).is_err());
        assert!(poll.ensure_readable(Some(&user("owner", false)), None).is_ok());
        assert!(poll.ensure_readable(Some(&user("root", true)), None).is_ok());
    }

    #[test]
    fn link_only_and_public_polls_are_open() {
        assert!(access(false, None).ensure_readable(None, None).is_ok());
        assert!(access(true, Some("stale")).ensure_readable(None, None).is_ok());
    }
}
