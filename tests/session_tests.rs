//! Tests for the login, refresh and logout endpoints.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use clinic_gate::{
    api::LoginCredentials, auth::decode_descriptor, create_app, credentials::Role,
    envelope::EnvelopeCipher,
};
use common::*;
use tower::ServiceExt;

fn login_with_body(body: String) -> Request<Body> {
    with_peer(
        Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap(),
        peer(2),
    )
}

fn refresh_request(cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/api/auth/refresh");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn assert_cleared(cookies: &[String]) {
    for name in ["access_token", "refresh_token", "session"] {
        let line = find_cookie(cookies, name)
            .unwrap_or_else(|| panic!("{} should be cleared, got {:?}", name, cookies));
        assert!(line.contains("Max-Age=0"), "{} not expired: {}", name, line);
    }
}

#[tokio::test]
async fn test_login_success_sets_three_cookies() {
    let app = test_app();

    let response = app
        .oneshot(login_request(ADMIN_EMAIL, ADMIN_SECRET))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);

    let access = find_cookie(&cookies, "access_token").expect("access cookie");
    assert!(access.contains("Path=/;"));
    assert!(access.contains("SameSite=Strict"));
    assert!(!access.contains("HttpOnly"));
    assert!(access.contains("Max-Age=900"));

    let refresh = find_cookie(&cookies, "refresh_token").expect("refresh cookie");
    assert!(refresh.contains("HttpOnly"));
    assert!(refresh.contains("Path=/api/auth"));
    assert!(refresh.contains("Max-Age=604800"));

    let descriptor = cookie_value(&cookies, "session").expect("descriptor cookie");
    let descriptor = decode_descriptor(&descriptor).expect("decodable descriptor");
    assert_eq!(descriptor.id, ADMIN_ID);
    assert_eq!(descriptor.role, Role::Admin);
    assert_eq!(descriptor.email, ADMIN_EMAIL);

    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "Login successful");
    assert_eq!(json["data"]["principal"]["id"], ADMIN_ID);
    assert_eq!(json["data"]["principal"]["role"], "admin");

    let token = json["data"]["accessToken"].as_str().unwrap();
    assert_eq!(cookie_value(&cookies, "access_token").as_deref(), Some(token));

    let context = jwt().validate_access(token).unwrap();
    assert_eq!(context.principal_id, ADMIN_ID);
    assert_eq!(context.role, Role::Admin);
}

#[tokio::test]
async fn test_login_identifier_is_case_insensitive() {
    let app = test_app();

    let response = app
        .oneshot(login_request("Admin@Example.COM", ADMIN_SECRET))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_wrong_secret() {
    let app = test_app();

    let response = app
        .oneshot(login_request(ADMIN_EMAIL, "wrong"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_cleared(&set_cookies(&response));

    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "Invalid credentials");
    assert!(json.get("data").is_none());
}

#[tokio::test]
async fn test_login_unknown_identifier_same_answer() {
    let app = test_app();

    let response = app
        .oneshot(login_request("nobody@example.com", ADMIN_SECRET))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["message"], "Invalid credentials");
}

#[tokio::test]
async fn test_login_malformed_envelope() {
    let app = test_app();

    for envelope in ["", "no-delimiter", "zz:zz", "00112233:44556677"] {
        let body = serde_json::json!({ "envelope": envelope }).to_string();
        let response = app.clone().oneshot(login_with_body(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "envelope {:?}", envelope);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Invalid request");
    }
}

#[tokio::test]
async fn test_login_envelope_under_other_key() {
    let app = test_app();
    let other = EnvelopeCipher::new(b"ffffffffffffffffffffffffffffffff").unwrap();
    let envelope = other
        .seal(&LoginCredentials {
            identifier: ADMIN_EMAIL.into(),
            secret: ADMIN_SECRET.into(),
        })
        .unwrap();

    let body = serde_json::json!({ "envelope": envelope }).to_string();
    let response = app.oneshot(login_with_body(body)).await.unwrap();

    // Wrong key either fails padding or yields garbage JSON; both are 400
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_envelope_with_wrong_shape() {
    let app = test_app();
    let envelope = cipher().seal(&serde_json::json!({ "user": "x" })).unwrap();

    let body = serde_json::json!({ "envelope": envelope }).to_string();
    let response = app.oneshot(login_with_body(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_not_json() {
    let app = test_app();

    let response = app
        .oneshot(login_with_body("not json".into()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_rate_limited() {
    let app = test_app();

    // Same peer for every attempt; the burst allowance is five
    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(login_request(ADMIN_EMAIL, "wrong"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app
        .clone()
        .oneshot(login_request(ADMIN_EMAIL, ADMIN_SECRET))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);

    // Other clients are unaffected
    let other = with_peer(
        Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(sealed_login_body(ADMIN_EMAIL, ADMIN_SECRET)))
            .unwrap(),
        peer(3),
    );
    let response = app.oneshot(other).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_without_client_ip_is_refused() {
    let app = test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(sealed_login_body(ADMIN_EMAIL, ADMIN_SECRET)))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_login_behind_proxy_uses_forwarded_for() {
    let mut config = config_with_jwt(jwt());
    config.trust_forwarded_for = true;
    let app = create_app(&config);

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
        .body(Body::from(sealed_login_body(ADMIN_EMAIL, ADMIN_SECRET)))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_issues_new_access_token() {
    let app = test_app();
    let (cookies, _) = login(&app, ADMIN_EMAIL, ADMIN_SECRET).await;
    let cookie = cookie_header(&cookies, &["refresh_token"]);

    let response = app.oneshot(refresh_request(Some(&cookie))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let new_cookies = set_cookies(&response);
    // Only the access token is rewritten; the refresh token is not rotated
    assert_eq!(new_cookies.len(), 1);
    assert!(find_cookie(&new_cookies, "access_token").is_some());

    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "Token refreshed");
    let token = json["data"]["accessToken"].as_str().unwrap();

    let context = jwt().validate_access(token).unwrap();
    assert_eq!(context.principal_id, ADMIN_ID);
    assert_eq!(context.role, Role::Admin);
}

#[tokio::test]
async fn test_refresh_without_cookie() {
    let app = test_app();

    let response = app.oneshot(refresh_request(None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_cleared(&set_cookies(&response));
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "Session expired, please sign in again");
}

#[tokio::test]
async fn test_refresh_rejects_access_token() {
    let app = test_app();
    let (_, access) = login(&app, ADMIN_EMAIL, ADMIN_SECRET).await;

    let cookie = format!("refresh_token={}", access);
    let response = app.oneshot(refresh_request(Some(&cookie))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_with_expired_token() {
    // Refresh lifetime of one second, token minted well in the past
    let short = jwt().with_lifetimes(1, 1);
    let app = create_app(&config_with_jwt(short.clone()));
    let principal = clinic_gate::credentials::CredentialStore::find_by_id(&store(), ADMIN_ID)
        .unwrap();
    let pair = short.issue_at(&principal, 1_000).unwrap();

    let cookie = format!("refresh_token={}", pair.refresh.token);
    let response = app.oneshot(refresh_request(Some(&cookie))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_for_removed_principal() {
    let app = test_app();
    let principal = clinic_gate::credentials::Principal {
        id: "gone".into(),
        role: Role::Admin,
        name: "Former Staff".into(),
        email: "former@example.com".into(),
    };
    let pair = jwt().issue(&principal).unwrap();

    let cookie = format!("refresh_token={}", pair.refresh.token);
    let response = app.oneshot(refresh_request(Some(&cookie))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_clears_cookies() {
    let app = test_app();
    let (cookies, _) = login(&app, ADMIN_EMAIL, ADMIN_SECRET).await;
    let cookie = cookie_header(&cookies, &["refresh_token"]);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cleared = set_cookies(&response);
    assert_cleared(&cleared);
    assert!(find_cookie(&cleared, "refresh_token").unwrap().contains("Path=/api/auth"));

    let json = body_json(response).await;
    assert_eq!(json["success"], true);
}

#[tokio::test]
async fn test_logout_without_session_still_succeeds() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_cleared(&set_cookies(&response));
}
