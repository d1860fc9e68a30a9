mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn put_creates_then_replaces_user_quota() -> Result<()> {
    let ctx = common::TestContext::new();
    let app = ctx.router();
    let admin = ctx.admin();
    let owner = Uuid::new_v4();
    let uri = format!("/admin/quotas/users/{}", owner);

    let res = common::put_json(&app, &uri, &admin, json!({"max_requests_per_minute": 30})).await?;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.body["data"]["user_id"], owner.to_string());
    assert_eq!(res.body["data"]["max_requests_per_minute"], 30);
    assert!(res.body["data"]["max_requests_per_hour"].is_null());

    let res = common::put_json(
        &app,
        &uri,
        &admin,
        json!({"max_requests_per_minute": 45, "max_requests_per_hour": 900}),
    )
    .await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["max_requests_per_minute"], 45);
    assert_eq!(res.body["data"]["max_requests_per_hour"], 900);

    let res = common::get(&app, &uri, Some(&admin)).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["max_requests_per_minute"], 45);
    Ok(())
}

#[tokio::test]
async fn get_returns_defaults_when_no_quota_is_stored() -> Result<()> {
    let ctx = common::TestContext::new();
    let app = ctx.router();
    let admin = ctx.admin();
    let owner = Uuid::new_v4();

    let res = common::get(&app, &format!("/admin/quotas/users/{}", owner), Some(&admin)).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["max_requests_per_minute"], 100);

    let res = common::get(&app, &format!("/admin/quotas/webhooks/{}", owner), Some(&admin)).await?;
    assert_eq!(res.body["data"]["max_subscriptions"], 10);
    assert_eq!(res.body["data"]["max_events_per_minute"], 12);

    let res = common::get(&app, &format!("/admin/quotas/addons/{}", owner), Some(&admin)).await?;
    assert_eq!(res.body["data"]["max_active_invocations"], 1);
    assert_eq!(res.body["data"]["max_invocations_per_hour"], 10);
    Ok(())
}

#[tokio::test]
async fn delete_removes_quota_and_reports_missing() -> Result<()> {
    let ctx = common::TestContext::new();
    let app = ctx.router();
    let admin = ctx.admin();
    let uri = format!("/admin/quotas/addons/{}", Uuid::new_v4());

    let res = common::put_json(
        &app,
        &uri,
        &admin,
        json!({"max_active_invocations": 5, "max_invocations_per_hour": 50}),
    )
    .await?;
    assert_eq!(res.status, StatusCode::CREATED);

    let res = common::delete(&app, &uri, &admin).await?;
    assert_eq!(res.status, StatusCode::NO_CONTENT);

    let res = common::delete(&app, &uri, &admin).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["code"], "not_found");

    let res = common::get(&app, &uri, Some(&admin)).await?;
    assert_eq!(res.body["data"]["max_active_invocations"], 1);
    Ok(())
}

#[tokio::test]
async fn list_pages_stored_quotas() -> Result<()> {
    let ctx = common::TestContext::new();
    let app = ctx.router();
    let admin = ctx.admin();

    for _ in 0..3 {
        let uri = format!("/admin/quotas/webhooks/{}", Uuid::new_v4());
        let body = json!({
            "max_subscriptions": 20,
            "max_events_per_minute": 30,
            "max_subscription_requests_per_minute": 10,
            "max_subscription_requests_per_day": 100
        });
        let res = common::put_json(&app, &uri, &admin, body).await?;
        assert_eq!(res.status, StatusCode::CREATED);
    }

    let res = common::get(&app, "/admin/quotas/webhooks?limit=2", Some(&admin)).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["total"], 3);
    assert_eq!(res.body["data"]["limit"], 2);
    assert_eq!(res.body["data"]["quotas"].as_array().map(Vec::len), Some(2));

    let res = common::get(&app, "/admin/quotas/webhooks?limit=2&offset=2", Some(&admin)).await?;
    assert_eq!(res.body["data"]["quotas"].as_array().map(Vec::len), Some(1));

    let res = common::get(&app, "/admin/quotas/webhooks", Some(&admin)).await?;
    assert_eq!(res.body["data"]["limit"], 50);
    Ok(())
}

#[tokio::test]
async fn non_admins_are_forbidden() -> Result<()> {
    let ctx = common::TestContext::new();
    let app = ctx.router();
    let user = ctx.user();
    let uri = format!("/admin/quotas/users/{}", user.user_id);

    let res = common::put_json(&app, &uri, &user, json!({"max_requests_per_minute": 10_000})).await?;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.body["code"], "forbidden");

    let res = common::get(&app, "/admin/quotas/users", Some(&user)).await?;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = common::delete(&app, &uri, &user).await?;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn malformed_requests_are_rejected() -> Result<()> {
    let ctx = common::TestContext::new();
    let app = ctx.router();
    let admin = ctx.admin();

    let res = common::get(&app, "/admin/quotas/users/not-a-uuid", Some(&admin)).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["code"], "bad_request");

    let res = common::get(&app, "/admin/quotas/users?limit=-1", Some(&admin)).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = common::get(&app, "/admin/quotas/addons?offset=-5", Some(&admin)).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let uri = format!("/admin/quotas/users/{}", Uuid::new_v4());
    let res = common::put_raw(&app, &uri, &admin, "{not json").await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["code"], "invalid_json");
    Ok(())
}

#[tokio::test]
async fn out_of_range_values_report_every_field() -> Result<()> {
    let ctx = common::TestContext::new();
    let app = ctx.router();
    let admin = ctx.admin();
    let uri = format!("/admin/quotas/webhooks/{}", Uuid::new_v4());

    let body = json!({
        "max_subscriptions": 0,
        "max_events_per_minute": 12,
        "max_subscription_requests_per_minute": 5_000,
        "max_subscription_requests_per_day": 20
    });
    let res = common::put_json(&app, &uri, &admin, body).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["code"], "validation_error");
    assert!(res.body["field_errors"]["max_subscriptions"].is_string());
    assert!(res.body["field_errors"]["max_subscription_requests_per_minute"].is_string());
    assert!(res.body["field_errors"].get("max_events_per_minute").is_none());

    // Nothing was stored
    let res = common::get(&app, "/admin/quotas/webhooks", Some(&admin)).await?;
    assert_eq!(res.body["data"]["total"], 0);
    Ok(())
}

#[tokio::test]
async fn new_limits_apply_to_the_next_request() -> Result<()> {
    let ctx = common::TestContext::new();
    let app = ctx.router();
    let admin = ctx.admin();
    let user = ctx.user();

    // Warm the quota cache with the defaults
    let res = common::get(&app, "/me/rate_limits", Some(&user)).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.header("x-ratelimit-limit"), Some("100"));

    let uri = format!("/admin/quotas/users/{}", user.user_id);
    let res = common::put_json(&app, &uri, &admin, json!({"max_requests_per_minute": 7})).await?;
    assert_eq!(res.status, StatusCode::CREATED);

    let res = common::get(&app, "/me/rate_limits", Some(&user)).await?;
    assert_eq!(res.header("x-ratelimit-limit"), Some("7"));
    assert_eq!(res.body["data"]["api"]["limit"], 7);

    let res = common::delete(&app, &uri, &admin).await?;
    assert_eq!(res.status, StatusCode::NO_CONTENT);

    let res = common::get(&app, "/me/rate_limits", Some(&user)).await?;
    assert_eq!(res.header("x-ratelimit-limit"), Some("100"));
    Ok(())
}
