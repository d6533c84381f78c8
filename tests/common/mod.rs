//! Shared harness for the in-process API tests.

#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{Map, Value};
use std::sync::Arc;
use storage_gateway::{
    AppState,
    backend::MemoryBackend,
    build_router, db,
    models::principal::{ANON_ROLE, AUTHENTICATED_ROLE, Claims, SERVICE_ROLE},
    services::{authorization::AuthorizationEngine, jwt::JwtVerifier},
};
use tower::ServiceExt;

pub const SECRET: &str = "test-jwt-secret";
pub const OWNER: &str = "owner-1";
pub const OTHER: &str = "owner-2";

pub struct TestApp {
    pub router: Router,
    pub backend: Arc<MemoryBackend>,
    verifier: JwtVerifier,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.clone()).expect("response body is UTF-8")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_backend(MemoryBackend::new()).await
    }

    pub async fn with_backend(backend: MemoryBackend) -> Self {
        let pool = db::connect_in_memory().await.expect("in-memory sqlite");
        let backend = Arc::new(backend);
        let state = AppState::new(
            Arc::new(pool),
            backend.clone(),
            Arc::new(AuthorizationEngine::default()),
            Arc::new(JwtVerifier::new(SECRET)),
            1024 * 1024,
        );

        Self {
            router: build_router(state),
            backend,
            verifier: JwtVerifier::new(SECRET),
        }
    }

    fn token(&self, role: &str, sub: Option<&str>) -> String {
        self.verifier
            .sign(&Claims {
                sub: sub.map(str::to_string),
                role: role.to_string(),
                exp: (Utc::now() + Duration::hours(1)).timestamp(),
                extra: Map::new(),
            })
            .expect("sign token")
    }

    pub fn user_token(&self, sub: &str) -> String {
        self.token(AUTHENTICATED_ROLE, Some(sub))
    }

    pub fn anon_token(&self) -> String {
        self.token(ANON_ROLE, None)
    }

    pub fn service_token(&self) -> String {
        self.token(SERVICE_ROLE, Some("service"))
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("read body")
            .to_bytes()
            .to_vec();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Send a request with an optional bearer token and optional JSON body.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).expect("valid request")).await
    }

    pub async fn create_bucket(&self, token: &str, body: Value) -> TestResponse {
        self.call(Method::POST, "/bucket", Some(token), Some(body)).await
    }

    /// Upload raw bytes as `sub` via POST.
    pub async fn upload(
        &self,
        token: &str,
        bucket: &str,
        key: &str,
        content_type: &str,
        data: &'static [u8],
    ) -> TestResponse {
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/object/{bucket}/{key}"))
            .header("authorization", format!("Bearer {token}"))
            .header("content-type", content_type)
            .body(Body::from(data))
            .expect("valid request");
        self.send(request).await
    }
}
