pub mod admin;
pub mod auth;
pub mod categories;
pub mod comments;
pub mod config;
pub mod db;
pub mod error;
pub mod listing;
pub mod polls;
pub mod users;
pub mod votes;

use axum::{
    http::HeaderValue,
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tracing::warn;

use config::Config;

pub type DbPool = r2d2::Pool<r2d2_sqlite::SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        Self { db, config }
    }
}

fn cors(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(AllowMethods::any())
        .allow_headers(AllowHeaders::any());

    match origin.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            warn!("Invalid CORS_ORIGIN {origin:?}, cross-origin requests disabled");
            layer
        }
    }
}

pub fn app(state: AppState) -> Router {
    let cors = cors(&state.config.cors_origin);

    Router::new()
        .route("/api/health", get(|| async { "ok" }))
        // Session & profile
        .route("/api/auth/me", get(users::session))
        .route(
            "/api/users/me",
            get(users::get_profile).put(users::update_profile),
        )
        .route("/api/users/me/polls", get(users::my_polls))
        .route("/api/users/me/votes", get(users::my_votes))
        // Categories
        .route("/api/categories", get(categories::list_categories))
        // Polls
        .route(
            "/api/polls",
            get(polls::list_polls).post(polls::create_poll),
        )
        .route(
            "/api/polls/{id}",
            get(polls::get_poll)
                .patch(polls::update_poll)
                .delete(polls::delete_poll),
        )
        .route(
            "/api/polls/{id}/votes",
            post(votes::cast_vote).delete(votes::retract_vote),
        )
        .route("/api/polls/{id}/results", get(votes::get_results))
        // Comments
        .route(
            "/api/polls/{id}/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route(
            "/api/comments/{id}",
            patch(comments::edit_comment).delete(comments::delete_comment),
        )
        // Admin
        .route("/api/admin/categories", post(categories::create_category))
        .route(
            "/api/admin/categories/{id}",
            put(categories::update_category).delete(categories::delete_category),
        )
        .route("/api/admin/polls", get(admin::list_polls))
        .route("/api/admin/polls/{id}", patch(admin::moderate_poll))
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/{uid}", delete(admin::delete_user))
        .layer(cors)
        .with_state(state)
}
