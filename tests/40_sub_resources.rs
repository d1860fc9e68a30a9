mod common;

use anyhow::Result;
use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tmi_api_rust::store::{
    InMemorySubResourceStore, SubResource, SubResourceError, SubResourceKind, SubResourceStore,
};
use tokio::sync::Notify;
use uuid::Uuid;

#[tokio::test]
async fn create_get_update_delete_threat() -> Result<()> {
    let ctx = common::TestContext::new();
    let app = ctx.router();
    let user = ctx.user();
    let tm = Uuid::new_v4();
    let base = format!("/threat_models/{}/threats", tm);

    let res = common::post_json(&app, &base, &user, json!({"name": "Spoofing", "severity": "high"})).await?;
    assert_eq!(res.status, StatusCode::CREATED);
    let id = res.body["data"]["id"].as_str().map(str::to_string).unwrap();
    assert_eq!(res.body["data"]["threat_model_id"], tm.to_string());
    assert_eq!(res.body["data"]["name"], "Spoofing");

    let item_uri = format!("{}/{}", base, id);
    let res = common::get(&app, &item_uri, Some(&user)).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["severity"], "high");

    let res = common::put_json(&app, &item_uri, &user, json!({"name": "Tampering", "severity": "low"})).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["id"], id);

    let res = common::delete(&app, &item_uri, &user).await?;
    assert_eq!(res.status, StatusCode::NO_CONTENT);

    let res = common::get(&app, &item_uri, Some(&user)).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn reads_after_writes_never_see_stale_cache() -> Result<()> {
    let ctx = common::TestContext::new();
    let app = ctx.router();
    let user = ctx.user();
    let tm = Uuid::new_v4();
    let base = format!("/threat_models/{}/documents", tm);

    let res = common::post_json(&app, &base, &user, json!({"name": "Architecture"})).await?;
    let id = res.body["data"]["id"].as_str().map(str::to_string).unwrap();
    let item_uri = format!("{}/{}", base, id);

    // Populate both the list and the entity cache
    let res = common::get(&app, &base, Some(&user)).await?;
    assert_eq!(res.body["data"]["total"], 1);
    let res = common::get(&app, &item_uri, Some(&user)).await?;
    assert_eq!(res.body["data"]["name"], "Architecture");

    common::post_json(&app, &base, &user, json!({"name": "Runbook"})).await?;
    let res = common::get(&app, &base, Some(&user)).await?;
    assert_eq!(res.body["data"]["total"], 2);
    assert_eq!(res.body["data"]["items"].as_array().map(Vec::len), Some(2));

    common::put_json(&app, &item_uri, &user, json!({"name": "Architecture v2"})).await?;
    let res = common::get(&app, &item_uri, Some(&user)).await?;
    assert_eq!(res.body["data"]["name"], "Architecture v2");
    let res = common::get(&app, &base, Some(&user)).await?;
    let names: Vec<&str> = res.body["data"]["items"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|item| item["name"].as_str())
        .collect();
    assert!(names.contains(&"Architecture v2"));

    common::delete(&app, &item_uri, &user).await?;
    let res = common::get(&app, &base, Some(&user)).await?;
    assert_eq!(res.body["data"]["total"], 1);
    Ok(())
}

#[tokio::test]
async fn collections_are_scoped_to_their_threat_model() -> Result<()> {
    let ctx = common::TestContext::new();
    let app = ctx.router();
    let user = ctx.user();
    let tm = Uuid::new_v4();
    let other_tm = Uuid::new_v4();

    let res = common::post_json(&app, &format!("/threat_models/{}/assets", tm), &user, json!({"name": "DB"})).await?;
    let id = res.body["data"]["id"].as_str().map(str::to_string).unwrap();

    // Cached under the entity key; the other threat model still must not see it
    common::get(&app, &format!("/threat_models/{}/assets/{}", tm, id), Some(&user)).await?;
    let res = common::get(&app, &format!("/threat_models/{}/assets/{}", other_tm, id), Some(&user)).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = common::get(&app, &format!("/threat_models/{}/assets", other_tm), Some(&user)).await?;
    assert_eq!(res.body["data"]["total"], 0);

    // Same id, other kind
    let res = common::get(&app, &format!("/threat_models/{}/notes/{}", tm, id), Some(&user)).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn managed_fields_cannot_be_overwritten() -> Result<()> {
    let ctx = common::TestContext::new();
    let app = ctx.router();
    let user = ctx.user();
    let tm = Uuid::new_v4();
    let forged = Uuid::new_v4();

    let res = common::post_json(
        &app,
        &format!("/threat_models/{}/sources", tm),
        &user,
        json!({"id": forged, "threat_model_id": forged, "url": "https://example.com/repo.git"}),
    )
    .await?;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_ne!(res.body["data"]["id"], forged.to_string());
    assert_eq!(res.body["data"]["threat_model_id"], tm.to_string());
    assert_eq!(res.body["data"]["url"], "https://example.com/repo.git");
    Ok(())
}

#[tokio::test]
async fn invalid_paths_and_paging_are_rejected() -> Result<()> {
    let ctx = common::TestContext::new();
    let app = ctx.router();
    let user = ctx.user();
    let tm = Uuid::new_v4();

    let res = common::get(&app, &format!("/threat_models/{}/widgets", tm), Some(&user)).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = common::get(&app, "/threat_models/not-a-uuid/threats", Some(&user)).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = common::get(&app, &format!("/threat_models/{}/threats?limit=5000", tm), Some(&user)).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = common::get(&app, &format!("/threat_models/{}/threats?offset=-1", tm), Some(&user)).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = common::put_json(
        &app,
        &format!("/threat_models/{}/threats/{}", tm, Uuid::new_v4()),
        &user,
        json!({"name": "ghost"}),
    )
    .await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = common::post_json(&app, &format!("/threat_models/{}/threats", tm), &user, json!([1, 2])).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["code"], "invalid_json");
    Ok(())
}

/// Store whose next `get` stalls after loading until released.
#[derive(Default)]
struct StallingStore {
    inner: InMemorySubResourceStore,
    armed: AtomicBool,
    loaded: Notify,
    release: Notify,
}

#[async_trait]
impl SubResourceStore for StallingStore {
    async fn get(&self, kind: SubResourceKind, threat_model_id: Uuid, id: Uuid) -> Result<SubResource, SubResourceError> {
        let result = self.inner.get(kind, threat_model_id, id).await;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.loaded.notify_one();
            self.release.notified().await;
        }
        result
    }

    async fn list(
        &self,
        kind: SubResourceKind,
        threat_model_id: Uuid,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<SubResource>, SubResourceError> {
        self.inner.list(kind, threat_model_id, offset, limit).await
    }

    async fn count(&self, kind: SubResourceKind, threat_model_id: Uuid) -> Result<usize, SubResourceError> {
        self.inner.count(kind, threat_model_id).await
    }

    async fn create(
        &self,
        kind: SubResourceKind,
        threat_model_id: Uuid,
        data: Map<String, Value>,
    ) -> Result<SubResource, SubResourceError> {
        self.inner.create(kind, threat_model_id, data).await
    }

    async fn update(
        &self,
        kind: SubResourceKind,
        threat_model_id: Uuid,
        id: Uuid,
        data: Map<String, Value>,
    ) -> Result<SubResource, SubResourceError> {
        self.inner.update(kind, threat_model_id, id, data).await
    }

    async fn delete(&self, kind: SubResourceKind, threat_model_id: Uuid, id: Uuid) -> Result<(), SubResourceError> {
        self.inner.delete(kind, threat_model_id, id).await
    }
}

#[tokio::test]
async fn read_overlapping_an_update_does_not_recache_old_value() -> Result<()> {
    let store = Arc::new(StallingStore::default());
    let mut ctx = common::TestContext::new();
    ctx.state.sub_resources = store.clone();
    let app = ctx.router();
    let user = ctx.user();
    let tm = Uuid::new_v4();
    let base = format!("/threat_models/{}/threats", tm);

    let res = common::post_json(&app, &base, &user, json!({"name": "Before"})).await?;
    assert_eq!(res.status, StatusCode::CREATED);
    let id = res.body["data"]["id"].as_str().map(str::to_string).unwrap();
    let item_uri = format!("{}/{}", base, id);

    store.armed.store(true, Ordering::SeqCst);
    let reader = {
        let (app, uri, user) = (app.clone(), item_uri.clone(), user.clone());
        tokio::spawn(async move { common::get(&app, &uri, Some(&user)).await })
    };
    store.loaded.notified().await;

    let res = common::put_json(&app, &item_uri, &user, json!({"name": "After"})).await?;
    assert_eq!(res.status, StatusCode::OK);
    store.release.notify_one();

    // The overlapping read may answer with what it loaded, but must not cache it
    let raced = reader.await??;
    assert_eq!(raced.body["data"]["name"], "Before");

    let res = common::get(&app, &item_uri, Some(&user)).await?;
    assert_eq!(res.body["data"]["name"], "After");
    Ok(())
}

#[tokio::test]
async fn cache_stats_track_reads_and_invalidations() -> Result<()> {
    let ctx = common::TestContext::new();
    let app = ctx.router();
    let admin = ctx.admin();
    let user = ctx.user();
    let base = format!("/threat_models/{}/notes", Uuid::new_v4());

    let res = common::post_json(&app, &base, &user, json!({"name": "Kickoff"})).await?;
    let id = res.body["data"]["id"].as_str().map(str::to_string).unwrap();
    let item_uri = format!("{}/{}", base, id);
    common::get(&app, &item_uri, Some(&user)).await?;
    common::get(&app, &item_uri, Some(&user)).await?;

    let res = common::get(&app, "/admin/cache/stats", Some(&admin)).await?;
    assert_eq!(res.status, StatusCode::OK);
    let stats = &res.body["data"];
    assert_eq!(stats["entities"]["note"]["hits"], 1);
    assert_eq!(stats["entities"]["note"]["misses"], 1);
    assert_eq!(stats["entities"]["note"]["writes"], 1);
    assert_eq!(stats["invalidations"], 1);

    let res = common::get(&app, "/admin/cache/stats", Some(&user)).await?;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = common::delete(&app, "/admin/cache/stats", &admin).await?;
    assert_eq!(res.status, StatusCode::NO_CONTENT);
    let res = common::get(&app, "/admin/cache/stats", Some(&admin)).await?;
    assert_eq!(res.body["data"]["total_hits"], 0);
    Ok(())
}
