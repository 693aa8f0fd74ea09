//! Tests for the dual-token authentication surface.
//!
//! Tests cover:
//! - Access token verification (stateless)
//! - Token refresh flow and revocation visibility
//! - Multiple devices/sessions per user
//! - Logout, logout-everywhere, and idempotent revocation
//! - Generic error responses that leak no failure reason

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::*;
use nestlock::db::UserRole;
use tower::ServiceExt;

// =============================================================================
// Access Token Tests
// =============================================================================

#[tokio::test]
async fn test_valid_access_token_authenticates() {
    let ctx = setup().await;
    let alice = create_user(&ctx.db, "alice@example.com", UserRole::Guest).await;
    let pair = login(&ctx.service, &alice).await;

    let response = ctx
        .app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/tokens/verify")
                .header("cookie", auth_cookies(&pair.access, &pair.refresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_bearer_access_token_authenticates() {
    let ctx = setup().await;
    let alice = create_user(&ctx.db, "alice@example.com", UserRole::Guest).await;
    let pair = login(&ctx.service, &alice).await;

    let response = ctx
        .app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/tokens/verify")
                .header("authorization", format!("Bearer {}", pair.access))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_no_tokens_returns_unauthorized() {
    let ctx = setup().await;

    let response = ctx
        .app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/tokens/verify")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_access_token_rejected() {
    let ctx = setup().await;

    let response = ctx
        .app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/tokens/verify")
                .header("cookie", "access_token=invalid-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unauthorized_body_leaks_no_reason() {
    let ctx = setup().await;
    let alice = create_user(&ctx.db, "alice@example.com", UserRole::Guest).await;
    let pair = login(&ctx.service, &alice).await;

    // Malformed credential, wrong-type credential, and no credential must
    // all produce the same body
    let cases: Vec<Option<String>> = vec![
        Some("access_token=not-a-jwt".to_string()),
        Some(access_cookie_only(&pair.refresh)),
        None,
    ];

    for cookie in cases {
        let mut builder = Request::builder().method("GET").uri("/api/tokens/verify");
        if let Some(ref c) = cookie {
            builder = builder.header("cookie", c.as_str());
        }
        let response = ctx
            .app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = response_json(response).await;
        assert_eq!(
            json["error"], "Authentication failed",
            "every rejection reason must collapse to the same body"
        );
    }
}

// =============================================================================
// Refresh Tests
// =============================================================================

#[tokio::test]
async fn test_refresh_issues_new_access_token() {
    let ctx = setup().await;
    let alice = create_user(&ctx.db, "alice@example.com", UserRole::Guest).await;
    let pair = login(&ctx.service, &alice).await;

    // Simulating an expired access token: only the refresh cookie is sent
    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tokens/refresh")
                .header("cookie", refresh_cookie_only(&pair.refresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let cookies = extract_set_cookies(&response);
    assert!(
        has_new_access_token(&cookies),
        "Should issue new access token from refresh token"
    );

    // The newly issued access token authenticates
    let new_access = extract_access_token(&cookies).unwrap();
    let response = ctx
        .app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/tokens/verify")
                .header("cookie", access_cookie_only(&new_access))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_without_cookie_rejected() {
    let ctx = setup().await;

    let response = ctx
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tokens/refresh")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_revoked_refresh_token_rejected() {
    let ctx = setup().await;
    let alice = create_user(&ctx.db, "alice@example.com", UserRole::Guest).await;
    let pair = login(&ctx.service, &alice).await;

    ctx.service.revoke_session(&pair.refresh).await.unwrap();

    let response = ctx
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tokens/refresh")
                .header("cookie", refresh_cookie_only(&pair.refresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_refresh_token_rejected() {
    let ctx = setup().await;

    let response = ctx
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tokens/refresh")
                .header("cookie", "refresh_token=invalid-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_foreign_refresh_token_rejected() {
    // Cryptographically valid token from another instance's secret: fails
    // stateless checks here, before any store lookup
    let ctx = setup().await;
    let foreign_jwt = nestlock::jwt::JwtConfig::new(b"some-other-deployment-signing-key");
    let foreign = foreign_jwt.generate_refresh_token("alice-uuid").unwrap();

    let response = ctx
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tokens/refresh")
                .header("cookie", refresh_cookie_only(&foreign.token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_deactivated_user_refresh_rejected() {
    let ctx = setup().await;
    let alice = create_user(&ctx.db, "alice@example.com", UserRole::Guest).await;
    let pair = login(&ctx.service, &alice).await;

    ctx.db.users().deactivate(&alice).await.unwrap();

    let response = ctx
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tokens/refresh")
                .header("cookie", refresh_cookie_only(&pair.refresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Token Type Confusion Tests
// =============================================================================

#[tokio::test]
async fn test_refresh_token_cannot_be_used_as_access_token() {
    let ctx = setup().await;
    let alice = create_user(&ctx.db, "alice@example.com", UserRole::Guest).await;
    let pair = login(&ctx.service, &alice).await;

    let response = ctx
        .app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/tokens/verify")
                .header("cookie", access_cookie_only(&pair.refresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_access_token_cannot_be_used_as_refresh_token() {
    let ctx = setup().await;
    let alice = create_user(&ctx.db, "alice@example.com", UserRole::Guest).await;
    let pair = login(&ctx.service, &alice).await;

    let response = ctx
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tokens/refresh")
                .header("cookie", refresh_cookie_only(&pair.access))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Logout Tests
// =============================================================================

#[tokio::test]
async fn test_logout_clears_both_cookies() {
    let ctx = setup().await;
    let alice = create_user(&ctx.db, "alice@example.com", UserRole::Guest).await;
    let pair = login(&ctx.service, &alice).await;

    let response = ctx
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tokens/logout")
                .header("cookie", auth_cookies(&pair.access, &pair.refresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let cookies = extract_set_cookies(&response);
    assert!(
        has_cleared_cookie(&cookies, "access_token"),
        "Should clear access_token cookie"
    );
    assert!(
        has_cleared_cookie(&cookies, "refresh_token"),
        "Should clear refresh_token cookie"
    );
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let ctx = setup().await;
    let alice = create_user(&ctx.db, "alice@example.com", UserRole::Guest).await;
    let pair = login(&ctx.service, &alice).await;

    assert!(ctx.service.validate_session(&pair.refresh).await.is_ok());

    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tokens/logout")
                .header("cookie", auth_cookies(&pair.access, &pair.refresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    // Every subsequent refresh with the revoked token fails
    for _ in 0..2 {
        let response = ctx
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/tokens/refresh")
                    .header("cookie", refresh_cookie_only(&pair.refresh))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_logout_succeeds_without_tokens() {
    let ctx = setup().await;

    let response = ctx
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tokens/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_double_logout_is_idempotent() {
    let ctx = setup().await;
    let alice = create_user(&ctx.db, "alice@example.com", UserRole::Guest).await;
    let pair = login(&ctx.service, &alice).await;

    for _ in 0..2 {
        let response = ctx
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/tokens/logout")
                    .header("cookie", auth_cookies(&pair.access, &pair.refresh))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

// =============================================================================
// Logout Everywhere Tests
// =============================================================================

#[tokio::test]
async fn test_logout_all_revokes_every_session() {
    let ctx = setup().await;
    let alice = create_user(&ctx.db, "alice@example.com", UserRole::Guest).await;

    let phone = login_with_device(&ctx.service, &alice, "iPhone", "10.0.0.1").await;
    let laptop = login_with_device(&ctx.service, &alice, "MacBook", "10.0.0.2").await;

    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tokens/logout-all")
                .header("cookie", auth_cookies(&phone.access, &phone.refresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["revoked"], 2);

    // Both refresh tokens now fail
    for refresh in [&phone.refresh, &laptop.refresh] {
        let response = ctx
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/tokens/refresh")
                    .header("cookie", refresh_cookie_only(refresh))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // A session created after the bulk revoke is unaffected
    let fresh = login(&ctx.service, &alice).await;
    let response = ctx
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tokens/refresh")
                .header("cookie", refresh_cookie_only(&fresh.refresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_logout_all_does_not_touch_other_users() {
    let ctx = setup().await;
    let alice = create_user(&ctx.db, "alice@example.com", UserRole::Guest).await;
    let bob = create_user(&ctx.db, "bob@example.com", UserRole::Guest).await;

    let alice_pair = login(&ctx.service, &alice).await;
    let bob_pair = login(&ctx.service, &bob).await;

    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tokens/logout-all")
                .header(
                    "cookie",
                    auth_cookies(&alice_pair.access, &alice_pair.refresh),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Bob's session still works
    let response = ctx
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tokens/refresh")
                .header("cookie", refresh_cookie_only(&bob_pair.refresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Session List Tests
// =============================================================================

#[tokio::test]
async fn test_list_sessions_returns_only_own_sessions() {
    let ctx = setup().await;
    let alice = create_user(&ctx.db, "alice@example.com", UserRole::Guest).await;
    let bob = create_user(&ctx.db, "bob@example.com", UserRole::Guest).await;

    let phone = login_with_device(&ctx.service, &alice, "iPhone", "10.0.0.1").await;
    let _laptop = login_with_device(&ctx.service, &alice, "MacBook", "10.0.0.2").await;
    let _bob_pair = login(&ctx.service, &bob).await;

    let response = ctx
        .app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/tokens")
                .header("cookie", auth_cookies(&phone.access, &phone.refresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    let sessions = json["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);

    let devices: Vec<&str> = sessions
        .iter()
        .filter_map(|s| s["device_name"].as_str())
        .collect();
    assert!(devices.contains(&"iPhone"));
    assert!(devices.contains(&"MacBook"));
}

#[tokio::test]
async fn test_list_sessions_excludes_revoked() {
    let ctx = setup().await;
    let alice = create_user(&ctx.db, "alice@example.com", UserRole::Guest).await;

    let phone = login_with_device(&ctx.service, &alice, "iPhone", "10.0.0.1").await;
    let laptop = login_with_device(&ctx.service, &alice, "MacBook", "10.0.0.2").await;

    ctx.service.revoke_session(&laptop.refresh).await.unwrap();

    let response = ctx
        .app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/tokens")
                .header("cookie", auth_cookies(&phone.access, &phone.refresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let json = response_json(response).await;
    let sessions = json["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["device_name"], "iPhone");
}
