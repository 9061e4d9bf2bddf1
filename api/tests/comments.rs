mod common;

use axum::http::{Method, StatusCode};
use common::*;
use serde_json::json;

#[tokio::test]
async fn comments_thread_one_level_deep() {
    let app = setup();
    let alice = token("alice");
    let bob = token("bob");

    let poll = app.create_poll(&alice, poll_body("Lunch?", &["a", "b"])).await;
    let uri = format!("/api/polls/{}/comments", poll["id"]);

    let (status, root) = app.post(&uri, &bob, json!({ "body": "Pizza, obviously" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(root["author_uid"], "bob");
    assert!(root["parent_id"].is_null());

    let (status, reply) = app
        .post(&uri, &alice, json!({ "body": "Agreed", "parent_id": root["id"] }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reply["parent_id"], root["id"]);

    let (status, _) = app
        .post(&uri, &bob, json!({ "body": "Too deep", "parent_id": reply["id"] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(&uri, &bob, json!({ "body": "Ghost", "parent_id": 4242 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, threads) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let threads = threads.as_array().unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0]["body"], "Pizza, obviously");
    assert_eq!(threads[0]["replies"][0]["body"], "Agreed");
}

#[tokio::test]
async fn comment_body_is_sanitised_and_required() {
    let app = setup();
    let alice = token("alice");
    let poll = app.create_poll(&alice, poll_body("Lunch?", &["a", "b"])).await;
    let uri = format!("/api/polls/{}/comments", poll["id"]);

    let (status, _) = app.post(&uri, &alice, json!({ "body": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, comment) = app
        .post(&uri, &alice, json!({ "body": "<script>x()</script>hello" }))
        .await;
    assert_eq!(comment["body"], "hello");
}

#[tokio::test]
async fn author_name_follows_nickname() {
    let app = setup();
    let alice = token("alice");
    let poll = app.create_poll(&alice, poll_body("Lunch?", &["a", "b"])).await;
    let uri = format!("/api/polls/{}/comments", poll["id"]);

    let (_, before) = app.post(&uri, &alice, json!({ "body": "hi" })).await;
    assert_eq!(before["author_name"], "Anonymous");

    app.send(
        Method::PUT,
        "/api/users/me",
        Some(&alice),
        Some(json!({ "name": "Alice", "nickname": "ally" })),
    )
    .await;

    let (_, after) = app.post(&uri, &alice, json!({ "body": "again" })).await;
    assert_eq!(after["author_name"], "ally");
}

#[tokio::test]
async fn only_author_edits_and_deleting_removes_replies() {
    let app = setup();
    let alice = token("alice");
    let bob = token("bob");
    let poll = app.create_poll(&alice, poll_body("Lunch?", &["a", "b"])).await;
    let uri = format!("/api/polls/{}/comments", poll["id"]);

    let (_, root) = app.post(&uri, &bob, json!({ "body": "first" })).await;
    app.post(&uri, &alice, json!({ "body": "reply", "parent_id": root["id"] }))
        .await;
    let comment_uri = format!("/api/comments/{}", root["id"]);

    let (status, _) = app
        .send(Method::PATCH, &comment_uri, Some(&alice), Some(json!({ "body": "mine now" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, edited) = app
        .send(Method::PATCH, &comment_uri, Some(&bob), Some(json!({ "body": "edited" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["body"], "edited");
    assert!(edited["updated_at"].is_string());

    let (status, _) = app.send(Method::DELETE, &comment_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send(Method::DELETE, &comment_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, threads) = app.get(&uri, None).await;
    assert!(threads.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn admin_can_delete_any_comment() {
    let app = setup();
    let alice = token("alice");
    let poll = app.create_poll(&alice, poll_body("Lunch?", &["a", "b"])).await;
    let uri = format!("/api/polls/{}/comments", poll["id"]);

    let (_, c) = app.post(&uri, &alice, json!({ "body": "spam" })).await;
    let (status, _) = app
        .send(
            Method::DELETE,
            &format!("/api/comments/{}", c["id"]),
            Some(&admin_token()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn protected_poll_comments_need_the_password() {
    let app = setup();
    let alice = token("alice");
    let bob = token("bob");

    let mut body = poll_body("Team dinner", &["a", "b"]);
    body["is_public"] = json!(false);
    body["password"] = json!("hunter2");
    let poll = app.create_poll(&alice, body).await;
    let uri = format!("/api/polls/{}/comments", poll["id"]);

    let (status, _) = app.post(&uri, &alice, json!({ "body": "Owner note" })).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, threads) = app.get(&format!("{uri}?password=hunter2"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(threads.as_array().unwrap().len(), 1);

    let (status, _) = app.post(&uri, &bob, json!({ "body": "Let me in" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post(&format!("{uri}?password=wrong"), &bob, json!({ "body": "Let me in" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, comment) = app
        .post(&format!("{uri}?password=hunter2"), &bob, json!({ "body": "Count me in" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(comment["author_uid"], "bob");
}
