#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use myvote_api::{app, auth::Claims, config::Config, db, AppState, DbPool};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const SECRET: &str = "test-secret";
pub const ADMIN_EMAIL: &str = "admin@myvote.dev";

pub struct TestApp {
    pub router: Router,
    pub pool: DbPool,
}

pub fn setup() -> TestApp {
    let pool = db::connect_in_memory().unwrap();
    db::run_migrations(&pool).unwrap();

    let config = Config {
        database_url: ":memory:".into(),
        bind_addr: "127.0.0.1:0".into(),
        jwt_secret: SECRET.into(),
        admin_email: ADMIN_EMAIL.into(),
        cors_origin: "http://localhost:3000".into(),
    };

    TestApp {
        router: app(AppState::new(pool.clone(), config)),
        pool,
    }
}

pub fn token(uid: &str) -> String {
    Claims::new(uid, format!("{uid}@example.com")).sign(SECRET).unwrap()
}

pub fn admin_token() -> String {
    Claims::new("admin", ADMIN_EMAIL).sign(SECRET).unwrap()
}

impl TestApp {
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header("Authorization", format!("Bearer {t}"));
        }
        let req = match body {
            Some(b) => req
                .header("Content-Type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    /// Creates a poll and returns its JSON.
    pub async fn create_poll(&self, token: &str, body: Value) -> Value {
        let (status, poll) = self.post("/api/polls", token, body).await;
        assert_eq!(status, StatusCode::CREATED, "{poll}");
        poll
    }

    /// Moves a poll's deadline into the past.
    pub fn end_poll(&self, id: i64) {
        self.pool
            .get()
            .unwrap()
            .execute(
                "UPDATE polls SET deadline = '2000-01-01 00:00:00' WHERE id = ?1",
                [id],
            )
            .unwrap();
    }
}

pub fn poll_body(title: &str, options: &[&str]) -> Value {
    json!({
        "title": title,
        "category_slug": "food",
        "options": options.iter().map(|t| json!({ "text": t })).collect::<Vec<_>>(),
        "deadline": "2099-12-31T23:59:00Z",
    })
}

pub fn option_ids(poll: &Value) -> Vec<i64> {
    poll["options"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_i64().unwrap())
        .collect()
}
