//! End-to-end flows through the full router: sign-up, login, bearer access,
//! token rejection and authority guards.

use axum::{
    body::{to_bytes, Body},
    extract::connect_info::MockConnectInfo,
    http::{header, Method, Request, StatusCode},
    Router,
};
use clap::Parser;
use people_service::{
    app,
    auth::{error::AUTHENTICATION_REQUIRED, models::Principal, AuthState},
    config::Config,
    middleware::{RateLimitConfig, RateLimitLayer},
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    state: AuthState,
    router: Router,
    _dir: TempDir,
}

fn setup() -> TestApp {
    setup_with_limiter(None)
}

fn setup_with_limiter(limiter: Option<RateLimitLayer>) -> TestApp {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("people.db");
    let config = Config::try_parse_from([
        "people-service",
        "--db-path",
        db_path.to_str().unwrap(),
        "--jwt-secret",
        "integration-test-secret",
        "--bcrypt-cost",
        "4",
    ])
    .unwrap();

    let state = app::build_state(&config).unwrap();
    app::bootstrap_admin(&state, "root@example.com", "root", "R00tPassword").unwrap();

    let router = app::router(state.clone(), limiter)
        .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));

    TestApp {
        state,
        router,
        _dir: dir,
    }
}

async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn sign_up(app: &TestApp, email: &str, username: &str, password: &str) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        "/api/users",
        None,
        Some(json!({ "email": email, "username": username, "password": password })),
    )
    .await
}

async fn login(app: &TestApp, email: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/authenticate",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_login_and_access_with_bearer_token() {
    let app = setup();

    let (status, body) = sign_up(&app, "alice@example.com", "alice", "P@ssw0rd").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "basic");
    assert!(body.get("password_hash").is_none());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/authenticate",
        None,
        Some(json!({ "email": "alice@example.com", "password": "P@ssw0rd" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 8 * 3600);
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["authorities"], json!(["READ"]));
    let token = body["token"].as_str().unwrap();

    let (status, body) = send(&app, Method::GET, "/api/users", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    let usernames: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert!(usernames.contains(&"alice"));
    assert!(usernames.contains(&"root"));

    let (status, body) = send(&app, Method::GET, "/api/users/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
}

#[tokio::test]
async fn test_email_lookup_ignores_case() {
    let app = setup();
    sign_up(&app, "alice@example.com", "alice", "P@ssw0rd").await;

    let token = login(&app, "ALICE@Example.com", "P@ssw0rd").await;
    assert!(!token.is_empty());
}

#[tokio::test]
async fn test_altered_token_gets_generic_rejection() {
    let app = setup();
    sign_up(&app, "alice@example.com", "alice", "P@ssw0rd").await;
    let token = login(&app, "alice@example.com", "P@ssw0rd").await;

    let mut altered = token.clone();
    let last = altered.pop().unwrap();
    altered.push(if last == 'A' { 'B' } else { 'A' });

    let (status, tampered_body) =
        send(&app, Method::GET, "/api/users", Some(&altered), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(tampered_body["message"], AUTHENTICATION_REQUIRED);

    // Indistinguishable from a request without any token
    let (status, anon_body) = send(&app, Method::GET, "/api/users", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(tampered_body, anon_body);

    // Tampered tokens are refused even on the open routes
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/users",
        Some(&altered),
        Some(json!({ "email": "eve@example.com", "username": "eve", "password": "P@ssw0rd" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_and_malformed_tokens_are_anonymous() {
    let app = setup();
    let principal = Principal {
        id: uuid::Uuid::new_v4(),
        username: "ghost".to_string(),
        authorities: ["READ".to_string()].into_iter().collect(),
    };
    let long_ago = chrono::Utc::now().timestamp() - 9 * 3600;
    let expired = app.state.token_codec.issue_at(&principal, long_ago).unwrap().token;

    for token in [expired.as_str(), "garbage", "a.b.c"] {
        let (status, body) = send(&app, Method::GET, "/api/users", Some(token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], AUTHENTICATION_REQUIRED);
    }

    // An open route still works with a stale token
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/users",
        Some(&expired),
        Some(json!({ "email": "bob@example.com", "username": "bob", "password": "P@ssw0rd" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_duplicate_email_ignores_case() {
    let app = setup();

    let (status, _) = sign_up(&app, "Bob@x.com", "bob", "P@ssw0rd").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = sign_up(&app, "bob@x.com", "bobby", "P@ssw0rd").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "The email or username is already registered");

    // The original account is untouched
    login(&app, "Bob@x.com", "P@ssw0rd").await;
}

#[tokio::test]
async fn test_sign_up_validation() {
    let app = setup();

    let cases = [
        ("not-an-email", "carol", "P@ssw0rd"),
        ("carol@example.com", "", "P@ssw0rd"),
        ("carol@example.com", "a-very-long-username-over-24", "P@ssw0rd"),
        ("carol@example.com", "carol", "password"),
    ];
    for (email, username, password) in cases {
        let (status, body) = sign_up(&app, email, username, password).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{email} {username} {password}");
        assert!(body["message"].is_string());
    }

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/users",
        None,
        Some(json!({ "email": "carol@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bad_credentials_are_indistinguishable() {
    let app = setup();
    sign_up(&app, "alice@example.com", "alice", "P@ssw0rd").await;

    let attempts = [
        ("alice@example.com", "Wr0ngPassword"),
        ("nobody@example.com", "P@ssw0rd"),
        ("alice@example.com", ""),
    ];
    let mut responses = Vec::new();
    for (email, password) in attempts {
        responses.push(
            send(
                &app,
                Method::POST,
                "/api/authenticate",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await,
        );
    }

    for (status, body) in &responses {
        assert_eq!(*status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, &responses[0].1);
    }
}

#[tokio::test]
async fn test_role_without_authorities_cannot_log_in() {
    let app = setup();
    sign_up(&app, "dave@example.com", "dave", "P@ssw0rd").await;

    let empty = app.state.role_store.create_role("suspended", &[]).unwrap();
    let dave = app
        .state
        .user_store
        .find_by_email("dave@example.com")
        .unwrap()
        .unwrap();
    app.state.user_store.assign_role(&dave.id, &empty.id).unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/authenticate",
        None,
        Some(json!({ "email": "dave@example.com", "password": "P@ssw0rd" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("'role'"));
}

#[tokio::test]
async fn test_authority_guards() {
    let app = setup();
    let (_, alice) = sign_up(&app, "alice@example.com", "alice", "P@ssw0rd").await;
    let (_, bob) = sign_up(&app, "bob@example.com", "bob", "P@ssw0rd").await;
    let alice_id = alice["id"].as_str().unwrap();
    let bob_id = bob["id"].as_str().unwrap();

    let alice_token = login(&app, "alice@example.com", "P@ssw0rd").await;
    let root_token = login(&app, "root@example.com", "R00tPassword").await;

    // basic: READ only
    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/api/users/{bob_id}"),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/users/{bob_id}"),
        Some(&alice_token),
        Some(json!({ "username": "hijacked" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Updating yourself needs no WRITE authority
    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/users/{alice_id}"),
        Some(&alice_token),
        Some(json!({ "username": "alice2" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice2");

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/users/{bob_id}/role"),
        Some(&alice_token),
        Some(json!({ "role": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // admin: everything
    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/users/{bob_id}/role"),
        Some(&root_token),
        Some(json!({ "role": "editor" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "editor");

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/users/{bob_id}/role"),
        Some(&root_token),
        Some(json!({ "role": "wizard" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("wizard"));

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/api/users/{bob_id}"),
        Some(&root_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/users/{bob_id}"),
        Some(&root_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/users/not-a-uuid",
        Some(&root_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_cannot_delete_self() {
    let app = setup();
    let root_token = login(&app, "root@example.com", "R00tPassword").await;
    let (_, me) = send(&app, Method::GET, "/api/users/me", Some(&root_token), None).await;
    let root_id = me["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        Method::DELETE,
        &format!("/api/users/{root_id}"),
        Some(&root_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cannot delete your own account");
}

#[tokio::test]
async fn test_roles_listing() {
    let app = setup();
    let root_token = login(&app, "root@example.com", "R00tPassword").await;

    let (status, body) = send(&app, Method::GET, "/api/roles", Some(&root_token), None).await;
    assert_eq!(status, StatusCode::OK);

    let admin = body
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == "admin")
        .unwrap();
    assert_eq!(admin["authorities"], json!(["ADMIN", "DELETE", "READ", "WRITE"]));
}

#[tokio::test]
async fn test_unknown_routes() {
    let app = setup();

    let (status, body) = send(&app, Method::GET, "/api/nowhere", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], AUTHENTICATION_REQUIRED);

    let root_token = login(&app, "root@example.com", "R00tPassword").await;
    let (status, _) = send(&app, Method::GET, "/api/nowhere", Some(&root_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_login_rate_limit() {
    let limiter = RateLimitLayer::new(RateLimitConfig {
        max_requests: 2,
        window: Duration::from_secs(60),
        burst: 0,
    });
    let app = setup_with_limiter(Some(limiter));

    for _ in 0..2 {
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/authenticate",
            None,
            Some(json!({ "email": "root@example.com", "password": "wrong" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/authenticate",
        None,
        Some(json!({ "email": "root@example.com", "password": "R00tPassword" })),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["message"], "Too many requests");

    // Other routes are not limited
    let (status, _) = sign_up(&app, "erin@example.com", "erin", "P@ssw0rd").await;
    assert_eq!(status, StatusCode::CREATED);
}
