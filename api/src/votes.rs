use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use myvote_shared::{CastVote, OptionResult, PollResults};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::info;

use crate::{
    auth,
    db,
    error::{is_constraint_violation, AppError, AppResult},
    listing,
    polls::{self, AccessParams, PollAccess},
    AppState,
};

/// Per-option share of the vote rounded to one decimal, plus the ids of the
/// leading option(s). Nothing leads while no votes are cast.
pub fn tally(counts: Vec<(i64, String, i64)>) -> (i64, Vec<OptionResult>, Vec<i64>) {
    let total: i64 = counts.iter().map(|(_, _, n)| n).sum();
    let top = counts.iter().map(|(_, _, n)| *n).max().unwrap_or(0);

    let leading = if total == 0 {
        Vec::new()
    } else {
        counts
            .iter()
            .filter(|(_, _, n)| *n == top)
            .map(|(id, _, _)| *id)
            .collect()
    };

    let options = counts
        .into_iter()
        .map(|(option_id, text, votes)| OptionResult {
            option_id,
            text,
            votes,
            percentage: if total == 0 {
                0.0
            } else {
                (votes as f64 * 1000.0 / total as f64).round() / 10.0
            },
        })
        .collect();

    (total, options, leading)
}

fn load_results(conn: &Connection, poll: &PollAccess, viewer: Option<&str>) -> AppResult<PollResults> {
    let mut stmt = conn.prepare(
        "SELECT o.id, o.text,
                (SELECT COUNT(*) FROM votes v WHERE v.option_id = o.id)
         FROM poll_options o
         WHERE o.poll_id = ?1
         ORDER BY o.position",
    )?;
    let counts = stmt
        .query_map([poll.id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let (total_votes, options, leading) = tally(counts);
    let user_vote = match viewer {
        Some(uid) => polls::user_vote(conn, poll.id, uid)?,
        None => None,
    };
    let now = db::now(conn)?;

    Ok(PollResults {
        poll_id: poll.id,
        total_votes,
        options,
        leading,
        user_vote,
        status: listing::status_at(&poll.deadline, &now),
    })
}

/// POST /api/polls/:id/votes — one vote per user, serialised by an immediate transaction
pub async fn cast_vote(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(poll_id): Path<i64>,
    Json(payload): Json<CastVote>,
) -> AppResult<Json<PollResults>> {
    let user = auth::require_user(&headers, &state)?;

    let results = db::interact(&state.db, move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        user.touch(&tx)?;

        let poll = PollAccess::load(&tx, poll_id)?;
        let now = db::now(&tx)?;
        if poll.is_ended(&now) {
            return Err(AppError::PollEnded);
        }
        poll.ensure_readable(Some(&user), payload.password.as_deref())?;

        let belongs = tx
            .query_row(
                "SELECT 1 FROM poll_options WHERE id = ?1 AND poll_id = ?2",
                [payload.option_id, poll_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !belongs {
            return Err(AppError::validation("Invalid option for this poll"));
        }

        if let Some(max) = poll.max_participants {
            if polls::participant_count(&tx, poll_id)? >= max {
                return Err(AppError::Conflict("This poll has reached its participant limit".into()));
            }
        }

        if polls::user_vote(&tx, poll_id, &user.uid)?.is_some() {
            return Err(AppError::Conflict("You have already voted on this poll".into()));
        }

        tx.execute(
            "INSERT INTO votes (poll_id, option_id, user_id) VALUES (?1, ?2, ?3)",
            rusqlite::params![poll_id, payload.option_id, user.uid],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                AppError::Conflict("You have already voted on this poll".into())
            } else {
                AppError::from(e)
            }
        })?;
        tx.commit()?;

        info!(poll_id, option_id = payload.option_id, voter = %user.uid, "vote cast");
        load_results(conn, &poll, Some(user.uid.as_str()))
    })
    .await?;

    Ok(Json(results))
}

/// DELETE /api/polls/:id/votes — take back a vote while the poll is open
pub async fn retract_vote(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(poll_id): Path<i64>,
) -> AppResult<Json<PollResults>> {
    let user = auth::require_user(&headers, &state)?;

    let results = db::interact(&state.db, move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let poll = PollAccess::load(&tx, poll_id)?;
        if poll.is_ended(&db::now(&tx)?) {
            return Err(AppError::PollEnded);
        }

        let removed = tx.execute(
            "DELETE FROM votes WHERE poll_id = ?1 AND user_id = ?2",
            rusqlite::params![poll_id, user.uid],
        )?;
        if removed == 0 {
            return Err(AppError::NotFound("You have not voted on this poll".into()));
        }
        tx.commit()?;

        load_results(conn, &poll, Some(user.uid.as_str()))
    })
    .await?;

    Ok(Json(results))
}

/// GET /api/polls/:id/results?password=...
pub async fn get_results(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(poll_id): Path<i64>,
    Query(access): Query<AccessParams>,
) -> AppResult<Json<PollResults>> {
    let user = auth::optional_user(&headers, &state);

    let results = db::interact(&state.db, move |conn| {
        let poll = PollAccess::load(conn, poll_id)?;
        poll.ensure_readable(user.as_ref(), access.password.as_deref())?;
        load_results(conn, &poll, user.as_ref().map(|u| u.uid.as_str()))
    })
    .await?;

    Ok(Json(results))
}
