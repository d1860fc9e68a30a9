mod common;

use anyhow::Result;
use reqwest::StatusCode;
use tmi_api_rust::routes;

#[tokio::test]
async fn health_endpoint_responds_over_tcp() -> Result<()> {
    let ctx = common::TestContext::new();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = routes::app(ctx.state.clone());
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let client = reqwest::Client::new();
    let res = client.get(format!("http://{}/health", addr)).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["database"], "not configured");
    assert_eq!(body["data"]["cache"], "memory");

    server.abort();
    Ok(())
}

#[tokio::test]
async fn root_describes_the_service() -> Result<()> {
    let ctx = common::TestContext::new();
    let app = ctx.router();

    let res = common::get(&app, "/", None).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["version"], env!("CARGO_PKG_VERSION"));
    Ok(())
}

#[tokio::test]
async fn protected_routes_require_a_token() -> Result<()> {
    let ctx = common::TestContext::new();
    let app = ctx.router();

    let res = common::get(&app, "/me/rate_limits", None).await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["code"], "unauthorized");
    assert!(res.header("x-ratelimit-limit").is_none());
    Ok(())
}

#[tokio::test]
async fn tokens_signed_with_another_secret_are_rejected() -> Result<()> {
    let ctx = common::TestContext::new();
    let app = ctx.router();

    let claims = tmi_api_rust::auth::Claims::new(uuid::Uuid::new_v4(), "eve@example.com", "Eve", true, 1);
    let forged = tmi_api_rust::auth::generate_jwt(&claims, "not-the-server-secret")?;
    let user = common::TestUser {
        user_id: claims.sub,
        email: claims.email.clone(),
        is_admin: true,
        token: forged,
    };

    let res = common::get(&app, "/admin/quotas/users", Some(&user)).await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    Ok(())
}
