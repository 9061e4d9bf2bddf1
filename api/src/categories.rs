use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use myvote_shared::{Category, SaveCategory};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::{
    auth,
    db,
    error::{is_constraint_violation, AppError, AppResult},
    polls, AppState,
};

const MAX_NAME: usize = 30;

fn load_category(conn: &Connection, id: i64) -> AppResult<Category> {
    conn.query_row(
        "SELECT id, name, slug, display_order, image_path FROM categories WHERE id = ?1",
        [id],
        |row| {
            Ok(Category {
                id: row.get(0)?,
                name: row.get(1)?,
                slug: row.get(2)?,
                display_order: row.get(3)?,
                image_path: row.get(4)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Category"))
}

pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn validate(req: SaveCategory) -> AppResult<SaveCategory> {
    let name = polls::clean_text("Category name", &req.name, MAX_NAME)?;
    let slug = req.slug.trim().to_string();

    if !is_valid_slug(&slug) {
        return Err(AppError::validation(
            "Slug may only contain lowercase letters, digits and inner dashes",
        ));
    }

    Ok(SaveCategory {
        name,
        slug,
        display_order: req.display_order,
        image_path: req.image_path.trim().to_string(),
    })
}

fn slug_conflict(e: rusqlite::Error) -> AppError {
    if is_constraint_violation(&e) {
        AppError::Conflict("A category with this slug already exists".into())
    } else {
        AppError::from(e)
    }
}

/// GET /api/categories
pub async fn list_categories(State(state): State<AppState>) -> AppResult<Json<Vec<Category>>> {
    let cats = db::interact(&state.db, |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, name, slug, display_order, image_path
             FROM categories ORDER BY display_order, id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    slug: row.get(2)?,
                    display_order: row.get(3)?,
                    image_path: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    })
    .await?;

    Ok(Json(cats))
}

/// POST /api/admin/categories
pub async fn create_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SaveCategory>,
) -> AppResult<(StatusCode, Json<Category>)> {
    auth::require_admin(&headers, &state)?;
    let cat = validate(payload)?;

    let created = db::interact(&state.db, move |conn| {
        conn.execute(
            "INSERT INTO categories (name, slug, display_order, image_path) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![cat.name, cat.slug, cat.display_order, cat.image_path],
        )
        .map_err(slug_conflict)?;
        info!(slug = %cat.slug, "category created");
        load_category(conn, conn.last_insert_rowid())
    })
    .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /api/admin/categories/:id
pub async fn update_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<SaveCategory>,
) -> AppResult<Json<Category>> {
    auth::require_admin(&headers, &state)?;
    let cat = validate(payload)?;

    let updated = db::interact(&state.db, move |conn| {
        let affected = conn
            .execute(
                "UPDATE categories SET name = ?2, slug = ?3, display_order = ?4, image_path = ?5
                 WHERE id = ?1",
                rusqlite::params![id, cat.name, cat.slug, cat.display_order, cat.image_path],
            )
            .map_err(slug_conflict)?;
        if affected == 0 {
            return Err(AppError::not_found("Category"));
        }
        load_category(conn, id)
    })
    .await?;

    Ok(Json(updated))
}

/// DELETE /api/admin/categories/:id — refused while polls still use it
pub async fn delete_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    auth::require_admin(&headers, &state)?;

    db::interact(&state.db, move |conn| {
        let in_use: i64 = conn.query_row(
            "SELECT COUNT(*) FROM polls WHERE category_id = ?1",
            [id],
            |row| row.get(0),
        )?;
        if in_use > 0 {
            return Err(AppError::Conflict(format!(
                "Category is used by {in_use} poll(s)"
            )));
        }

        if conn.execute("DELETE FROM categories WHERE id = ?1", [id])? == 0 {
            return Err(AppError::not_found("Category"));
        }
        info!(category_id = id, "category deleted");
        Ok(StatusCode::NO_CONTENT)
    })
    .await
}
