// testing/mod.rs - In-process fixtures for handler and router tests

use std::sync::Arc;

use axum::Router;
use uuid::Uuid;

use crate::auth::{generate_jwt, Claims};
use crate::config::AppConfig;
use crate::quota::{ManualClock, RateCounter};
use crate::routes;
use crate::state::AppState;

/// Fixed starting point for the manual clock: 2024-01-01T00:00:00Z.
pub const TEST_EPOCH: i64 = 1_704_067_200;

/// A fully wired in-memory application with a controllable clock.
pub struct TestContext {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
}

/// A principal able to call the API.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub user_id: Uuid,
    pub email: String,
    pub is_admin: bool,
    pub token: String,
}

impl TestUser {
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(AppConfig::development())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let clock = Arc::new(ManualClock::new(TEST_EPOCH));
        let state = AppState::in_memory(config, clock.clone());
        Self { state, clock }
    }

    /// Development config with requests counted by `counter`.
    pub fn with_counter(counter: Arc<dyn RateCounter>) -> Self {
        let clock = Arc::new(ManualClock::new(TEST_EPOCH));
        let state = AppState::in_memory_with_counter(AppConfig::development(), clock.clone(), counter);
        Self { state, clock }
    }

    pub fn router(&self) -> Router {
        routes::app(self.state.clone())
    }

    pub fn user(&self) -> TestUser {
        self.mint(false)
    }

    pub fn admin(&self) -> TestUser {
        self.mint(true)
    }

    fn mint(&self, is_admin: bool) -> TestUser {
        let user_id = Uuid::new_v4();
        let email = format!("{}@example.com", user_id.simple());
        let claims = Claims::new(
            user_id,
            email.clone(),
            if is_admin { "Test Admin" } else { "Test User" },
            is_admin,
            self.state.config.security.jwt_expiry_hours,
        );
        let token = generate_jwt(&claims, &self.state.config.security.jwt_secret)
            .unwrap_or_else(|e| panic!("failed to mint test token: {}", e));

        TestUser {
            user_id,
            email,
            is_admin,
            token,
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::validate_jwt;

    #[tokio::test]
    async fn minted_tokens_validate_against_context_secret() {
        let ctx = TestContext::new();
        let admin = ctx.admin();
        let user = ctx.user();

        let claims = validate_jwt(&admin.token, &ctx.state.config.security.jwt_secret).unwrap();
        assert_eq!(claims.sub, admin.user_id);
        assert!(claims.is_admin);

        let claims = validate_jwt(&user.token, &ctx.state.config.security.jwt_secret).unwrap();
        assert!(!claims.is_admin);
        assert_ne!(admin.user_id, user.user_id);
    }
}
