use std::sync::Arc;

use uuid::Uuid;

use crate::auth::{bearer_token, create_session_token, SessionAuth};
use crate::config::Config;
use crate::error::AppError;
use crate::store::memory::MemoryRouteStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub routes: MemoryRouteStore,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            routes: MemoryRouteStore::new(),
        }
    }

    /// Identity of the caller. No bearer token means anonymous; a bad one is
    /// rejected.
    pub fn session(&self, headers: &axum::http::HeaderMap) -> Result<SessionAuth, AppError> {
        let token = bearer_token(headers);
        SessionAuth::from_token(token.as_deref(), &self.config.jwt_secret)
    }

    /// Signs a session for `user_id` valid for the configured TTL.
    pub fn session_token(&self, user_id: Uuid) -> Result<String, AppError> {
        create_session_token(user_id, self.config.session_ttl.as_secs(), &self.config.jwt_secret)
    }
}
