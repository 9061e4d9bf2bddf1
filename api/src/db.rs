use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension};

use crate::error::{AppError, AppResult};
use crate::DbPool;

fn manager(manager: SqliteConnectionManager) -> SqliteConnectionManager {
    manager.with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"))
}

pub fn connect(database_url: &str) -> AppResult<DbPool> {
    let pool = r2d2::Pool::new(manager(SqliteConnectionManager::file(database_url)))?;
    Ok(pool)
}

/// Every in-memory SQLite connection is its own database, so the pool holds exactly one.
pub fn connect_in_memory() -> AppResult<DbPool> {
    let pool = r2d2::Pool::builder()
        .max_size(1)
        .build(manager(SqliteConnectionManager::memory()))?;
    Ok(pool)
}

/// Run `f` with a pooled connection on the blocking thread pool.
pub async fn interact<F, T>(pool: &DbPool, f: F) -> AppResult<T>
where
    F: FnOnce(&mut Connection) -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        f(&mut conn)
    })
    .await?
}

/// Database clock, in the same `YYYY-MM-DD HH:MM:SS` form every stored timestamp uses.
pub fn now(conn: &Connection) -> AppResult<String> {
    Ok(conn.query_row("SELECT datetime('now')", [], |row| row.get(0))?)
}

pub fn current_year(conn: &Connection) -> AppResult<i32> {
    Ok(conn.query_row("SELECT CAST(strftime('%Y', 'now') AS INTEGER)", [], |row| {
        row.get(0)
    })?)
}

/// Accepts anything SQLite's `datetime()` understands, e.g. `2030-01-02T03:04:05Z`.
pub fn normalize_timestamp(conn: &Connection, input: &str) -> AppResult<String> {
    let parsed: Option<String> = conn
        .query_row("SELECT datetime(?1)", [input.trim()], |row| {
            row.get::<_, Option<String>>(0)
        })
        .optional()?
        .flatten();

    parsed.ok_or_else(|| AppError::validation(format!("Invalid timestamp: {input}")))
}

pub fn run_migrations(pool: &DbPool) -> AppResult<()> {
    let conn = pool.get()?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            uid           TEXT PRIMARY KEY,
            email         TEXT NOT NULL,
            name          TEXT NOT NULL DEFAULT '',
            nickname      TEXT NOT NULL DEFAULT '',
            birth_year    INTEGER,
            gender        TEXT,
            created_at    TEXT NOT NULL DEFAULT (datetime('now')),
            last_login_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_users_nickname
            ON users(nickname) WHERE nickname <> '';

        CREATE TABLE IF NOT EXISTS categories (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            name          TEXT NOT NULL,
            slug          TEXT UNIQUE NOT NULL,
            display_order INTEGER NOT NULL DEFAULT 0,
            image_path    TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS polls (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            title            TEXT NOT NULL,
            description      TEXT NOT NULL DEFAULT '',
            category_id      INTEGER NOT NULL REFERENCES categories(id),
            is_public        INTEGER NOT NULL DEFAULT 1,
            password         TEXT,
            deadline         TEXT NOT NULL,
            max_participants INTEGER,
            created_by       TEXT NOT NULL REFERENCES users(uid) ON DELETE CASCADE,
            created_at       TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_polls_category ON polls(category_id);
        CREATE INDEX IF NOT EXISTS idx_polls_creator ON polls(created_by);

        CREATE TABLE IF NOT EXISTS poll_options (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            poll_id   INTEGER NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
            position  INTEGER NOT NULL,
            text      TEXT NOT NULL,
            image_url TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_options_poll ON poll_options(poll_id);

        CREATE TABLE IF NOT EXISTS votes (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            poll_id    INTEGER NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
            option_id  INTEGER NOT NULL REFERENCES poll_options(id) ON DELETE CASCADE,
            user_id    TEXT NOT NULL REFERENCES users(uid) ON DELETE CASCADE,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(poll_id, user_id)
        );
        CREATE INDEX IF NOT EXISTS idx_votes_option ON votes(option_id);
        CREATE INDEX IF NOT EXISTS idx_votes_user ON votes(user_id);

        CREATE TABLE IF NOT EXISTS comments (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            poll_id    INTEGER NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
            parent_id  INTEGER REFERENCES comments(id) ON DELETE CASCADE,
            user_id    TEXT NOT NULL REFERENCES users(uid) ON DELETE CASCADE,
            body       TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_comments_poll ON comments(poll_id);

        -- Seed default categories if empty
        INSERT OR IGNORE INTO categories (id, name, slug, display_order, image_path) VALUES
            (1, 'General',       'general',       1, '/images/categories/general.png'),
            (2, 'Food',          'food',          2, '/images/categories/food.png'),
            (3, 'Travel',        'travel',        3, '/images/categories/travel.png'),
            (4, 'Entertainment', 'entertainment', 4, '/images/categories/entertainment.png'),
            (5, 'Sports',        'sports',        5, '/images/categories/sports.png'),
            (6, 'Lifestyle',     'lifestyle',     6, '/images/categories/lifestyle.png');
        ",
    )?;

    Ok(())
}
