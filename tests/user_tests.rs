mod common;

use authsvc::identity::IdentityFields;
use axum::http::{StatusCode, header};
use common::*;
use serde_json::json;

#[tokio::test]
async fn test_user_routes_require_session() {
    let t = TestApp::new().await;

    for (method, uri) in [
        ("GET", "/user"),
        ("GET", "/user/me"),
        ("GET", "/user/some-id"),
        ("DELETE", "/user/some-id"),
        ("GET", "/pkce"),
    ] {
        let response = t.send(empty(request(method, uri))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        assert_eq!(body_json(response).await["detail"], "Not authenticated");
    }
}

#[tokio::test]
async fn test_list_and_get_users() {
    let t = TestApp::new().await;
    let (alice, cookies) = t.register("alice").await;
    let (bob, _) = t.register("bob").await;

    let response = t
        .send(empty(request("GET", "/user").header(header::COOKIE, &cookies)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let users = body_json(response).await;
    assert_eq!(users.as_array().unwrap().len(), 2);

    let response = t
        .send(empty(request("GET", "/user/me").header(header::COOKIE, &cookies)))
        .await;
    assert_eq!(body_json(response).await["id"], alice.as_str());

    let response = t
        .send(empty(
            request("GET", &format!("/user/{}", bob)).header(header::COOKIE, &cookies),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["username"], "bob");

    let response = t
        .send(empty(request("GET", "/user/missing").header(header::COOKIE, &cookies)))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_renewal_on_user_route() {
    let t = TestApp::new().await;
    let (_, cookies) = t.register("alice").await;

    t.clock.advance(ACCESS_LIFETIME);
    let response = t
        .send(empty(request("GET", "/user/me").header(header::COOKIE, &cookies)))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie_value(&response, "access_token").is_some());
    assert!(set_cookie_value(&response, "refresh_token").is_none());
}

#[tokio::test]
async fn test_create_user() {
    let t = TestApp::new().await;
    let (_, cookies) = t.register("alice").await;

    let response = t
        .send(json(
            request("POST", "/user").header(header::COOKIE, &cookies),
            json!({ "username": "carol", "password": PASSWORD }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).is_empty());
    assert_eq!(body_json(response).await["username"], "carol");

    let response = t
        .send(json(
            request("POST", "/user").header(header::COOKIE, &cookies),
            json!({ "username": "carol", "password": PASSWORD }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["detail"], "User could not be created.");
}

#[tokio::test]
async fn test_search_users() {
    let t = TestApp::new().await;
    let (_, cookies) = t.register("Alice").await;
    t.register("malice").await;
    t.register("bob").await;

    let response = t
        .send(json(
            request("POST", "/user/search").header(header::COOKIE, &cookies),
            json!({ "username": "ALI" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let names: Vec<String> = body_json(response)
        .await
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["Alice", "malice"]);

    let response = t
        .send(json(
            request("POST", "/user/search").header(header::COOKIE, &cookies),
            json!({}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_own_user() {
    let t = TestApp::with_config(|config| config.identity_fields = IdentityFields::all()).await;
    let (id, cookies) = t.register("alice").await;

    let response = t
        .send(json(
            request("PUT", &format!("/user/{}", id)).header(header::COOKIE, &cookies),
            json!({ "email": "alice@example.com", "password": "NewPassword2" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["username"], "alice");
    assert_eq!(body["email"], "alice@example.com");

    // The new password works, by either field.
    let response = t
        .send(json(
            request("POST", "/login"),
            json!({ "email": "alice@example.com", "password": "NewPassword2" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = t
        .send(json(
            request("PUT", &format!("/user/{}", id)).header(header::COOKIE, &cookies),
            json!({}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_conflict() {
    let t = TestApp::new().await;
    let (id, cookies) = t.register("alice").await;
    t.register("bob").await;

    let response = t
        .send(json(
            request("PUT", &format!("/user/{}", id)).header(header::COOKIE, &cookies),
            json!({ "username": "bob" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cannot_modify_other_user() {
    let t = TestApp::new().await;
    let (_, cookies) = t.register("alice").await;
    let (bob, _) = t.register("bob").await;

    let response = t
        .send(json(
            request("PUT", &format!("/user/{}", bob)).header(header::COOKIE, &cookies),
            json!({ "username": "mallory" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = t
        .send(empty(
            request("DELETE", &format!("/user/{}", bob)).header(header::COOKIE, &cookies),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(t.db.users().get_by_id(&bob).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_own_user() {
    let t = TestApp::new().await;
    let (id, cookies) = t.register("alice").await;

    // Renewal is pending; deleting must not hand out a fresh access cookie.
    t.clock.advance(ACCESS_LIFETIME);
    let response = t
        .send(empty(
            request("DELETE", &format!("/user/{}", id)).header(header::COOKIE, &cookies),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = set_cookies(&response);
    assert_eq!(cleared.len(), 2);
    assert!(cleared.iter().all(|c| c.contains("Max-Age=0")));
    assert!(t.db.users().get_by_id(&id).await.unwrap().is_none());

    // The refresh token itself is not revoked, but the user is gone.
    let response = t
        .send(empty(request("GET", "/user/me").header(header::COOKIE, &cookies)))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pkce_records() {
    let t = TestApp::new().await;
    let (_, cookies) = t.register("alice").await;
    t.seed_pkce().await;

    let response = t
        .send(empty(request("GET", "/pkce").header(header::COOKIE, &cookies)))
        .await;
    let records = body_json(response).await;
    assert_eq!(records.as_array().unwrap().len(), 1);
    let id = records[0]["id"].as_str().unwrap().to_string();

    let response = t
        .send(empty(
            request("GET", &format!("/pkce/{}", id)).header(header::COOKIE, &cookies),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["code_challenge"], CHALLENGE);

    let response = t
        .send(empty(
            request("GET", &format!("/pkce/host/{}", TEST_HOST)).header(header::COOKIE, &cookies),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], id.as_str());

    let response = t
        .send(empty(
            request("DELETE", &format!("/pkce/{}", id)).header(header::COOKIE, &cookies),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(t.db.pkce().get_by_host(TEST_HOST).await.unwrap().is_none());

    let response = t
        .send(empty(
            request("GET", &format!("/pkce/{}", id)).header(header::COOKIE, &cookies),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["detail"], "PKCE not found.");
}
