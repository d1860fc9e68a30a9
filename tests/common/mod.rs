#![allow(dead_code)]

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

pub use tmi_api_rust::testing::{TestContext, TestUser};

/// A response with its body already read.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> Result<TestResponse> {
    let response: Response = app.clone().oneshot(request).await?;
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok(TestResponse { status, headers, body })
}

pub async fn get(app: &Router, uri: &str, user: Option<&TestUser>) -> Result<TestResponse> {
    send(app, request(Method::GET, uri, user, None)?).await
}

pub async fn delete(app: &Router, uri: &str, user: &TestUser) -> Result<TestResponse> {
    send(app, request(Method::DELETE, uri, Some(user), None)?).await
}

pub async fn post_json(app: &Router, uri: &str, user: &TestUser, body: Value) -> Result<TestResponse> {
    send(app, request(Method::POST, uri, Some(user), Some(body.to_string()))?).await
}

pub async fn put_json(app: &Router, uri: &str, user: &TestUser, body: Value) -> Result<TestResponse> {
    send(app, request(Method::PUT, uri, Some(user), Some(body.to_string()))?).await
}

pub async fn put_raw(app: &Router, uri: &str, user: &TestUser, body: &str) -> Result<TestResponse> {
    send(app, request(Method::PUT, uri, Some(user), Some(body.to_string()))?).await
}

fn request(method: Method, uri: &str, user: Option<&TestUser>, body: Option<String>) -> Result<Request<Body>> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(header::AUTHORIZATION, user.bearer());
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))?,
        None => builder.body(Body::empty())?,
    };
    Ok(request)
}
