use async_trait::async_trait;
use serde_json::Value;

use crate::auth::Credentials;
use crate::models::{CurrentUser, LoginOutcome, TwoFactorMethod, WorldQuery};

use super::ApiError;

/// Downstream calls the proxy makes against the platform.
///
/// Implementations share one cookie-backed session, so callers must go
/// through `SessionGuard` before anything that needs authentication.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Identity of the session currently held. A session that still waits
    /// for a second factor is reported as `ApiError::Unauthorized`.
    async fn current_user(&self) -> Result<CurrentUser, ApiError>;

    async fn login(&self, credentials: &Credentials) -> Result<LoginOutcome, ApiError>;

    /// Returns whether the platform accepted the code.
    async fn verify_two_factor(
        &self,
        method: TwoFactorMethod,
        code: &str,
    ) -> Result<bool, ApiError>;

    async fn search_worlds(&self, query: &WorldQuery) -> Result<Value, ApiError>;

    async fn get_world(&self, world_id: &str) -> Result<Value, ApiError>;

    async fn friends(&self) -> Result<Value, ApiError>;

    /// Drop the platform session held by this client.
    async fn logout(&self) -> Result<(), ApiError>;
}
