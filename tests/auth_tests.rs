//! Tests for signup, signin, signout, session and refresh endpoints.

mod common;

use axum::http::StatusCode;
use common::{
    PASSWORD, count_rows, create_test_app, create_test_app_with, get, post, post_raw, sign_up,
};
use filevault::auth::IpExtractor;
use filevault::jwt::TokenCheck;
use serde_json::json;

#[tokio::test]
async fn test_signup_sets_session_cookie() {
    let test = create_test_app().await;

    let response = post(
        &test.app,
        "/api/auth/signup",
        None,
        json!({
            "email": "  Alice@Example.com",
            "password": "wonderland",
            "firstName": "Alice",
            "lastName": "Liddell",
        }),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["message"], "User created successfully");
    assert_eq!(response.json["user"]["email"], "alice@example.com");
    assert_eq!(response.json["user"]["firstName"], "Alice");
    assert!(response.json["user"].get("passwordHash").is_none());

    let cookie = response.auth_cookie().unwrap();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains("Max-Age=604800"));
    assert!(!cookie.contains("Secure"));

    let claims = test.jwt.verify(&response.token().unwrap()).claims().unwrap();
    assert_eq!(claims.user_id, response.json["user"]["id"].as_str().unwrap());
    assert_eq!(claims.email, "alice@example.com");
    assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
}

#[tokio::test]
async fn test_secure_cookie_in_production() {
    let test = create_test_app_with(|config| config.secure_cookies = true).await;
    let response = post(
        &test.app,
        "/api/auth/signup",
        None,
        json!({"email": "a@b.co", "password": PASSWORD, "firstName": "A", "lastName": "B"}),
    )
    .await;
    assert!(response.auth_cookie().unwrap().contains("Secure"));
}

#[tokio::test]
async fn test_signup_duplicate_email_rejected_without_insert() {
    let test = create_test_app().await;
    sign_up(&test.app, "bob@example.com").await;
    assert_eq!(count_rows(&test.db, "users").await, 1);

    let response = post(
        &test.app,
        "/api/auth/signup",
        None,
        json!({
            "email": "BOB@example.com",
            "password": PASSWORD,
            "firstName": "Other",
            "lastName": "Bob",
        }),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json["error"], "User with this email already exists");
    assert!(response.auth_cookie().is_none());
    assert_eq!(count_rows(&test.db, "users").await, 1);
}

#[tokio::test]
async fn test_signup_validation_details() {
    let test = create_test_app().await;

    let response = post(
        &test.app,
        "/api/auth/signup",
        None,
        json!({"email": "nope", "password": "short"}),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json["error"], "Validation failed");
    let fields: Vec<&str> = response.json["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["email", "password", "firstName", "lastName"]);
    assert_eq!(count_rows(&test.db, "users").await, 0);
}

#[tokio::test]
async fn test_signin_success_updates_last_signed_in() {
    let test = create_test_app().await;
    let (user_id, _) = sign_up(&test.app, "carol@example.com").await;
    sqlx::query("UPDATE users SET last_signed_in_at = NULL")
        .execute(test.db.pool())
        .await
        .unwrap();

    let response = post(
        &test.app,
        "/api/auth/signin",
        None,
        json!({"email": "Carol@Example.com", "password": PASSWORD}),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["message"], "Signed in successfully");
    assert_eq!(response.json["user"]["id"], user_id.as_str());
    assert!(response.token().is_some());

    let user = test.db.users().get_by_id(&user_id).await.unwrap().unwrap();
    assert!(user.last_signed_in_at.is_some());
}

#[tokio::test]
async fn test_signin_failures_are_indistinguishable() {
    let test = create_test_app().await;
    sign_up(&test.app, "dave@example.com").await;

    let wrong_password = post(
        &test.app,
        "/api/auth/signin",
        None,
        json!({"email": "dave@example.com", "password": "not-the-password"}),
    )
    .await;
    let unknown_email = post(
        &test.app,
        "/api/auth/signin",
        None,
        json!({"email": "nobody@example.com", "password": PASSWORD}),
    )
    .await;

    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.json, unknown_email.json);
    assert_eq!(wrong_password.json["error"], "Invalid email or password");
    assert!(wrong_password.auth_cookie().is_none());
    assert!(unknown_email.auth_cookie().is_none());
}

#[tokio::test]
async fn test_signin_requires_password() {
    let test = create_test_app().await;
    let response = post(
        &test.app,
        "/api/auth/signin",
        None,
        json!({"email": "dave@example.com"}),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json["details"][0]["field"], "password");
}

#[tokio::test]
async fn test_session_is_stable_for_same_token() {
    let test = create_test_app().await;
    let (user_id, token) = sign_up(&test.app, "erin@example.com").await;
    let expected_expiry = {
        let claims = test.jwt.verify(&token).claims().unwrap();
        chrono::DateTime::from_timestamp(claims.exp as i64, 0)
            .unwrap()
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    };

    for _ in 0..3 {
        let response = get(&test.app, "/api/auth/session", Some(&token)).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json["isAuthenticated"], true);
        assert_eq!(response.json["user"]["id"], user_id.as_str());
        assert_eq!(response.json["sessionExpiry"], expected_expiry.as_str());
        assert!(response.json["lastActivity"].is_string());
    }
}

#[tokio::test]
async fn test_session_for_deleted_user_is_unauthenticated() {
    let test = create_test_app().await;
    let (_, token) = sign_up(&test.app, "frank@example.com").await;
    sqlx::query("DELETE FROM users")
        .execute(test.db.pool())
        .await
        .unwrap();

    let response = get(&test.app, "/api/auth/session", Some(&token)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["isAuthenticated"], false);
    assert!(response.json["user"].is_null());
}

#[tokio::test]
async fn test_refresh_issues_new_valid_token() {
    let test = create_test_app().await;
    let (user_id, token) = sign_up(&test.app, "grace@example.com").await;

    let response = post(&test.app, "/api/auth/refresh", Some(&token), json!({})).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["user"]["id"], user_id.as_str());
    assert!(response.json["sessionExpiry"].is_string());

    let fresh = response.token().unwrap();
    match test.jwt.verify(&fresh) {
        TokenCheck::Valid(claims) => assert_eq!(claims.user_id, user_id),
        other => panic!("expected valid token, got {:?}", other),
    }
}

#[tokio::test]
async fn test_refresh_for_deleted_user_clears_cookie() {
    let test = create_test_app().await;
    let (_, token) = sign_up(&test.app, "heidi@example.com").await;
    sqlx::query("DELETE FROM users")
        .execute(test.db.pool())
        .await
        .unwrap();

    let response = post(&test.app, "/api/auth/refresh", Some(&token), json!({})).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(response.clears_auth_cookie());
}

#[tokio::test]
async fn test_signout_clears_cookie_without_session() {
    let test = create_test_app().await;

    let response = post(&test.app, "/api/auth/signout", None, json!({})).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["message"], "Signed out successfully");
    assert!(response.clears_auth_cookie());
}

#[tokio::test]
async fn test_auth_endpoints_rate_limited() {
    let test = create_test_app_with(|config| config.auth_rate_limit = 2).await;
    let attempt = json!({"email": "ivan@example.com", "password": "whatever-it-is"});

    for _ in 0..2 {
        let response = post(&test.app, "/api/auth/signin", None, attempt.clone()).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    let limited = post(&test.app, "/api/auth/signin", None, attempt.clone()).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.json["error"].is_string());

    // Signup shares the same per-client budget
    let signup = post(
        &test.app,
        "/api/auth/signup",
        None,
        json!({"email": "ivan@example.com", "password": PASSWORD, "firstName": "I", "lastName": "V"}),
    )
    .await;
    assert_eq!(signup.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_rotating_forwarded_for_shares_budget() {
    let test = create_test_app_with(|config| config.auth_rate_limit = 2).await;
    let body = json!({"email": "judy@example.com", "password": "whatever-it-is"}).to_string();

    let mut statuses = Vec::new();
    for i in 0..5 {
        let ip = format!("10.0.0.{}", i);
        let response = post_raw(
            &test.app,
            "/api/auth/signin",
            &[("content-type", "application/json"), ("x-forwarded-for", ip.as_str())],
            body.clone(),
        )
        .await;
        statuses.push(response.status);
    }

    assert_eq!(
        statuses,
        vec![
            StatusCode::UNAUTHORIZED,
            StatusCode::UNAUTHORIZED,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS,
        ]
    );
}

async fn signin_from(app: &axum::Router, ip: &str) -> common::TestResponse {
    let body = json!({"email": "kate@example.com", "password": "whatever-it-is"}).to_string();
    post_raw(
        app,
        "/api/auth/signin",
        &[("content-type", "application/json"), ("x-forwarded-for", ip)],
        body,
    )
    .await
}

#[tokio::test]
async fn test_trusted_header_keys_per_client() {
    let test = create_test_app_with(|config| {
        config.auth_rate_limit = 2;
        config.ip_extractor = Some(IpExtractor::new("x-forwarded-for").unwrap());
    })
    .await;
    assert_eq!(signin_from(&test.app, "203.0.113.1").await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(signin_from(&test.app, "203.0.113.1").await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(signin_from(&test.app, "203.0.113.1").await.status, StatusCode::TOO_MANY_REQUESTS);

    // A different client behind the proxy has its own budget
    assert_eq!(signin_from(&test.app, "203.0.113.2").await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unreadable_bodies_are_json_400() {
    let test = create_test_app().await;

    let malformed = post_raw(
        &test.app,
        "/api/auth/signin",
        &[("content-type", "application/json")],
        "{not json",
    )
    .await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);
    assert_eq!(malformed.json["error"], "Malformed JSON body");

    let no_content_type = post_raw(&test.app, "/api/auth/signup", &[], "").await;
    assert_eq!(no_content_type.status, StatusCode::BAD_REQUEST);
    assert!(no_content_type.json["error"].is_string());
    assert_eq!(count_rows(&test.db, "users").await, 0);
}

#[tokio::test]
async fn test_health_is_public() {
    let test = create_test_app().await;
    let response = get(&test.app, "/api/health", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["status"], "ok");
}
