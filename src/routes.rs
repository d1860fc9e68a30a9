// routes.rs - Router assembly

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{elevated, protected, public};
use crate::middleware::{jwt_auth_middleware, rate_limit_middleware};
use crate::quota::{AddonInvocationQuotaUpdate, UserApiQuotaUpdate, WebhookQuotaUpdate};
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let authenticated = Router::new()
        .merge(sub_resource_routes())
        .merge(collaboration_routes())
        .merge(quota_routes())
        .merge(cache_routes())
        .route("/me/rate_limits", get(protected::my_rate_limits))
        // Layers run outermost-last: authenticate, then rate limit
        .route_layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .route_layer(from_fn_with_state(state.clone(), jwt_auth_middleware));

    let mut router = Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .merge(authenticated)
        .layer(DefaultBodyLimit::max(state.config.api.max_request_size_bytes));

    if state.config.security.enable_cors {
        router = router.layer(cors_layer(&state.config.security.cors_origins));
    }

    if state.config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    router.with_state(state)
}

fn sub_resource_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/threat_models/:threat_model_id/:kind",
            get(protected::sub_resource_list).post(protected::sub_resource_create),
        )
        .route(
            "/threat_models/:threat_model_id/:kind/:id",
            get(protected::sub_resource_get)
                .put(protected::sub_resource_update)
                .delete(protected::sub_resource_delete),
        )
}

fn collaboration_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/threat_models/:threat_model_id/diagrams/:diagram_id/ws",
            get(protected::diagram_ws),
        )
        .route("/collaboration/sessions", get(protected::list_sessions))
}

fn quota_routes() -> Router<AppState> {
    use elevated::quotas::{quota_delete, quota_get, quota_list, quota_put};

    Router::new()
        .route("/admin/quotas/users", get(quota_list::<UserApiQuotaUpdate>))
        .route(
            "/admin/quotas/users/:owner_id",
            put(quota_put::<UserApiQuotaUpdate>)
                .get(quota_get::<UserApiQuotaUpdate>)
                .delete(quota_delete::<UserApiQuotaUpdate>),
        )
        .route("/admin/quotas/webhooks", get(quota_list::<WebhookQuotaUpdate>))
        .route(
            "/admin/quotas/webhooks/:owner_id",
            put(quota_put::<WebhookQuotaUpdate>)
                .get(quota_get::<WebhookQuotaUpdate>)
                .delete(quota_delete::<WebhookQuotaUpdate>),
        )
        .route("/admin/quotas/addons", get(quota_list::<AddonInvocationQuotaUpdate>))
        .route(
            "/admin/quotas/addons/:owner_id",
            put(quota_put::<AddonInvocationQuotaUpdate>)
                .get(quota_get::<AddonInvocationQuotaUpdate>)
                .delete(quota_delete::<AddonInvocationQuotaUpdate>),
        )
}

fn cache_routes() -> Router<AppState> {
    use elevated::cache_stats::{cache_stats, cache_stats_reset};

    Router::new().route("/admin/cache/stats", get(cache_stats).delete(cache_stats_reset))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}
