//! Bucket API integration tests.
//!
//! Drives the router in-process against SQLite in memory and the in-memory
//! storage backend.

mod common;

use axum::http::{Method, StatusCode};
use common::{OTHER, OWNER, TestApp};
use serde_json::{Value, json};

async fn seed_listing_fixture(app: &TestApp, token: &str) {
    for i in 2..=9 {
        let res = app.create_bucket(token, json!({ "name": format!("bucket{i}") })).await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.text());
    }
    for name in ["public-bucket", "public-bucket-2"] {
        let res = app.create_bucket(token, json!({ "name": name, "public": true })).await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.text());
    }
}

#[tokio::test]
async fn create_then_get_bucket() {
    let app = TestApp::new().await;
    let token = app.user_token(OWNER);

    let created = app
        .create_bucket(
            &token,
            json!({
                "name": "avatars",
                "public": false,
                "file_size_limit": 1024,
                "allowed_mime_types": ["image/*"],
            }),
        )
        .await;
    assert_eq!(created.status, StatusCode::OK);
    let body = created.json();
    assert_eq!(body["id"], "avatars");
    assert_eq!(body["owner"], OWNER);
    assert_eq!(body["file_size_limit"], 1024);

    let fetched = app.call(Method::GET, "/bucket/avatars", Some(&token), None).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.json()["name"], "avatars");
    assert_eq!(fetched.json()["allowed_mime_types"], json!(["image/*"]));
}

#[tokio::test]
async fn get_missing_bucket_is_not_found() {
    let app = TestApp::new().await;
    let res = app
        .call(Method::GET, "/bucket/nope", Some(&app.user_token(OWNER)), None)
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.json()["statusCode"], "404");
}

#[tokio::test]
async fn anonymous_cannot_read_bucket_metadata() {
    let app = TestApp::new().await;
    app.create_bucket(&app.user_token(OWNER), json!({ "name": "private" })).await;

    let res = app
        .call(Method::GET, "/bucket/private", Some(&app.anon_token()), None)
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.json()["statusCode"], "400");
}

#[tokio::test]
async fn names_with_slashes_are_rejected() {
    let app = TestApp::new().await;
    let res = app
        .create_bucket(&app.user_token(OWNER), json!({ "name": "a/b" }))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    let body = res.json();
    assert_eq!(body["statusCode"], "400");
    assert_eq!(body["message"], "Bucket name invalid");
}

#[tokio::test]
async fn malformed_names_are_rejected() {
    let app = TestApp::new().await;
    let token = app.user_token(OWNER);
    let too_long = "x".repeat(101);
    for name in ["", " padded", "padded ", too_long.as_str()] {
        let res = app.create_bucket(&token, json!({ "name": name })).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST, "name {name:?}");
        assert_eq!(res.json()["statusCode"], "400");
    }

    let res = app.create_bucket(&token, json!({ "public": true })).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_names_conflict() {
    let app = TestApp::new().await;
    let token = app.user_token(OWNER);
    assert_eq!(app.create_bucket(&token, json!({ "name": "dup" })).await.status, StatusCode::OK);

    let res = app.create_bucket(&app.user_token(OTHER), json!({ "name": "dup" })).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.json()["statusCode"], "409");
}

#[tokio::test]
async fn listing_paginates_sorts_and_searches() {
    let app = TestApp::new().await;
    let token = app.user_token(OWNER);
    seed_listing_fixture(&app, &token).await;

    let res = app
        .call(
            Method::GET,
            "/bucket?limit=1&offset=2&sortColumn=name&sortOrder=asc&search=bucket",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    let names: Vec<Value> = res
        .json()
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("bucket4")]);

    let res = app
        .call(Method::GET, "/bucket?sortOrder=desc&search=public", Some(&token), None)
        .await;
    let names: Vec<Value> = res
        .json()
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("public-bucket-2"), json!("public-bucket")]);

    let all = app.call(Method::GET, "/bucket", Some(&token), None).await;
    assert_eq!(all.json().as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn listing_rejects_bad_pagination() {
    let app = TestApp::new().await;
    let token = app.user_token(OWNER);

    for uri in ["/bucket?limit=0", "/bucket?offset=-1", "/bucket?sortColumn=owner"] {
        let res = app.call(Method::GET, uri, Some(&token), None).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(res.json()["statusCode"], "400");
    }
}

#[tokio::test]
async fn anonymous_listing_is_empty() {
    let app = TestApp::new().await;
    seed_listing_fixture(&app, &app.user_token(OWNER)).await;

    let res = app.call(Method::GET, "/bucket", Some(&app.anon_token()), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json(), json!([]));
}

#[tokio::test]
async fn update_toggles_visibility_and_limits() {
    let app = TestApp::new().await;
    let token = app.user_token(OWNER);
    app.create_bucket(&token, json!({ "name": "docs", "file_size_limit": 10 })).await;

    let res = app
        .call(
            Method::PUT,
            "/bucket/docs",
            Some(&token),
            Some(json!({ "public": true, "file_size_limit": null })),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json(), json!({ "message": "Successfully updated" }));

    let bucket = app.call(Method::GET, "/bucket/docs", Some(&token), None).await.json();
    assert_eq!(bucket["public"], true);
    assert_eq!(bucket["file_size_limit"], Value::Null);
    assert_eq!(bucket["name"], "docs");
}

#[tokio::test]
async fn only_owners_update_or_delete() {
    let app = TestApp::new().await;
    app.create_bucket(&app.user_token(OWNER), json!({ "name": "mine" })).await;
    let intruder = app.user_token(OTHER);

    let res = app
        .call(Method::PUT, "/bucket/mine", Some(&intruder), Some(json!({ "public": true })))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.json()["statusCode"], "400");

    let res = app.call(Method::DELETE, "/bucket/mine", Some(&intruder), None).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn mutating_a_missing_bucket_is_masked() {
    let app = TestApp::new().await;
    let token = app.user_token(OWNER);

    for (method, uri, body) in [
        (Method::PUT, "/bucket/ghost", Some(json!({ "public": true }))),
        (Method::DELETE, "/bucket/ghost", None),
        (Method::POST, "/bucket/ghost/empty", None),
    ] {
        let res = app.call(method, uri, Some(&token), body).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(res.json()["statusCode"], "404");
    }
}

#[tokio::test]
async fn non_empty_bucket_survives_delete_until_emptied() {
    let app = TestApp::new().await;
    let token = app.user_token(OWNER);
    app.create_bucket(&token, json!({ "name": "full" })).await;
    for key in ["a.txt", "nested/b.txt"] {
        let res = app.upload(&token, "full", key, "text/plain", b"data").await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.text());
    }

    let res = app.call(Method::DELETE, "/bucket/full", Some(&token), None).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.json()["statusCode"], "409");

    let res = app.call(Method::POST, "/bucket/full/empty", Some(&token), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json(), json!({ "message": "Successfully emptied" }));
    assert_eq!(app.backend.object_count("full"), 0);

    let res = app.call(Method::DELETE, "/bucket/full", Some(&token), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json(), json!({ "message": "Successfully deleted" }));

    let res = app.call(Method::GET, "/bucket/full", Some(&token), None).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn emptying_is_idempotent() {
    let app = TestApp::new().await;
    let token = app.user_token(OWNER);
    app.create_bucket(&token, json!({ "name": "twice" })).await;
    app.upload(&token, "twice", "x", "text/plain", b"1").await;

    for _ in 0..2 {
        let res = app.call(Method::POST, "/bucket/twice/empty", Some(&token), None).await;
        assert_eq!(res.status, StatusCode::OK);
    }
    assert_eq!(app.backend.object_count("twice"), 0);
}

#[tokio::test]
async fn service_credential_empties_any_bucket() {
    let app = TestApp::new().await;
    let token = app.user_token(OWNER);
    app.create_bucket(&token, json!({ "name": "managed" })).await;
    app.upload(&token, "managed", "x", "text/plain", b"1").await;

    let res = app
        .call(Method::POST, "/bucket/managed/empty", Some(&app.user_token(OTHER)), None)
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.backend.object_count("managed"), 1);

    let res = app
        .call(Method::POST, "/bucket/managed/empty", Some(&app.service_token()), None)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(app.backend.object_count("managed"), 0);
}

#[tokio::test]
async fn mutating_endpoints_require_authorization() {
    let app = TestApp::new().await;
    let requests = [
        (Method::GET, "/bucket", None),
        (Method::POST, "/bucket", Some(json!({ "name": "x" }))),
        (Method::PUT, "/bucket/x", Some(json!({ "public": true }))),
        (Method::DELETE, "/bucket/x", None),
        (Method::POST, "/bucket/x/empty", None),
        (Method::DELETE, "/object/x/a.txt", None),
        (
            Method::POST,
            "/object/copy",
            Some(json!({ "bucketId": "x", "sourceKey": "a", "destinationKey": "b" })),
        ),
    ];

    for (method, uri, body) in requests {
        let res = app.call(method.clone(), uri, None, body).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST, "{method} {uri}");
        let body = res.json();
        assert_eq!(body["statusCode"], "400");
        assert_eq!(body["message"], "headers must have required property 'authorization'");
    }
}

#[tokio::test]
async fn invalid_tokens_are_rejected() {
    let app = TestApp::new().await;
    let res = app.call(Method::GET, "/bucket", Some("garbage"), None).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.json()["statusCode"], "400");
}

#[tokio::test]
async fn health_endpoints_report_ok() {
    let app = TestApp::new().await;
    let res = app.call(Method::GET, "/healthz", None, None).await;
    assert_eq!(res.status, StatusCode::OK);

    let res = app.call(Method::GET, "/readyz", None, None).await;
    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["checks"]["sqlite"]["ok"], true);
    assert_eq!(body["checks"]["backend"]["ok"], true);
}
