//! Tests for user registration and listing

mod common;

use common::create_test_app;
use futures::future::join_all;
use serde_json::{json, Value};

/// Test: concurrent registrations of one email produce exactly one user
#[tokio::test]
async fn test_concurrent_duplicate_registrations() {
    let app = create_test_app();
    let attempts = 8;

    let responses = join_all((0..attempts).map(|i| {
        let request = app
            .server
            .post("/api/users")
            .json(&json!({ "email": "race@uni.edu", "name": format!("Racer {}", i) }));
        async move { request.await }
    }))
    .await;

    let created = responses.iter().filter(|r| r.status_code() == 201).count();
    let conflicts = responses.iter().filter(|r| r.status_code() == 409).count();
    assert_eq!(created, 1);
    assert_eq!(conflicts, attempts - 1);
    assert_eq!(app.store.count_users_with_email("race@uni.edu"), 1);
}

/// Test: registering twice with the same email yields 201 then 409
#[tokio::test]
async fn test_duplicate_registration_is_rejected() {
    let app = create_test_app();

    let response = app
        .server
        .post("/api/users")
        .json(&json!({ "email": "a@x.edu", "name": "A" }))
        .await;
    assert_eq!(response.status_code(), 201);
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "User created successfully");
    assert!(body["data"]["id"].is_string());
    assert_eq!(body["data"]["email"], "a@x.edu");
    assert_eq!(body["data"]["name"], "A");

    let response = app
        .server
        .post("/api/users")
        .json(&json!({ "email": "a@x.edu", "name": "A" }))
        .await;
    assert_eq!(response.status_code(), 409);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "User with this email already exists");

    assert_eq!(app.store.count_users_with_email("a@x.edu"), 1);
}

/// Test: emails are compared after normalization
#[tokio::test]
async fn test_email_case_does_not_bypass_uniqueness() {
    let app = create_test_app();

    let response = app
        .server
        .post("/api/users")
        .json(&json!({ "email": "  Ada@Uni.EDU ", "name": "Ada" }))
        .await;
    assert_eq!(response.status_code(), 201);
    let body: Value = response.json();
    assert_eq!(body["data"]["email"], "ada@uni.edu");

    let response = app
        .server
        .post("/api/users")
        .json(&json!({ "email": "ada@uni.edu", "name": "Ada Again" }))
        .await;
    assert_eq!(response.status_code(), 409);
    assert_eq!(app.store.count_users_with_email("ada@uni.edu"), 1);
}

/// Test: optional fields are echoed back
#[tokio::test]
async fn test_registration_echoes_optional_fields() {
    let app = create_test_app();

    let response = app
        .server
        .post("/api/users")
        .json(&json!({
            "email": "grace@uni.edu",
            "name": "Grace",
            "studentId": "S-1001",
            "department": "Computer Science"
        }))
        .await;

    assert_eq!(response.status_code(), 201);
    let body: Value = response.json();
    assert_eq!(body["data"]["studentId"], "S-1001");
    assert_eq!(body["data"]["department"], "Computer Science");
}

/// Test: missing email or name is a validation failure and stores nothing
#[tokio::test]
async fn test_missing_required_fields() {
    let app = create_test_app();

    for payload in [
        json!({ "name": "No Email" }),
        json!({ "email": "noname@uni.edu" }),
        json!({ "email": "blank@uni.edu", "name": "   " }),
        json!({}),
    ] {
        let response = app.server.post("/api/users").json(&payload).await;
        assert_eq!(response.status_code(), 400, "payload {}", payload);
        let body: Value = response.json();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Email and name are required");
    }

    let response = app.server.get("/api/users").await;
    let body: Value = response.json();
    assert_eq!(body["count"], 0);
}

/// Test: a body that is not JSON is a validation failure
#[tokio::test]
async fn test_malformed_body() {
    let app = create_test_app();

    let response = app.server.post("/api/users").text("email=a@x.edu").await;

    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
}

/// Test: listing returns every user when fewer than ten exist, without a version field
#[tokio::test]
async fn test_list_users() {
    let app = create_test_app();
    for i in 0..3 {
        let response = app
            .server
            .post("/api/users")
            .json(&json!({ "email": format!("user{}@uni.edu", i), "name": format!("User {}", i) }))
            .await;
        assert_eq!(response.status_code(), 201);
    }

    let response = app.server.get("/api/users").await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 3);
    let users = body["data"].as_array().unwrap();
    assert_eq!(users.len(), 3);
    for user in users {
        assert!(user.get("__v").is_none());
        assert!(user["_id"].is_string());
        assert!(user["lastActive"].is_string());
        assert!(user["createdAt"].is_string());
    }
    assert_eq!(users[0]["email"], "user0@uni.edu");
}

/// Test: listing is capped at ten users
#[tokio::test]
async fn test_list_users_is_capped() {
    let app = create_test_app();
    for i in 0..12 {
        app.server
            .post("/api/users")
            .json(&json!({ "email": format!("u{}@uni.edu", i), "name": "U" }))
            .await;
    }

    let response = app.server.get("/api/users").await;

    let body: Value = response.json();
    assert_eq!(body["count"], 10);
    assert_eq!(body["data"].as_array().unwrap().len(), 10);
}

/// Test: storage failures become a generic 500
#[tokio::test]
async fn test_storage_failure_is_generic() {
    let app = create_test_app();
    app.store.set_unavailable(true);

    let response = app.server.get("/api/users").await;
    assert_eq!(response.status_code(), 500);
    let body: Value = response.json();
    assert_eq!(body, json!({ "success": false, "message": "Failed to fetch users" }));

    let response = app
        .server
        .post("/api/users")
        .json(&json!({ "email": "a@x.edu", "name": "A" }))
        .await;
    assert_eq!(response.status_code(), 500);
    let body: Value = response.json();
    assert_eq!(body, json!({ "success": false, "message": "Failed to create user" }));
}
