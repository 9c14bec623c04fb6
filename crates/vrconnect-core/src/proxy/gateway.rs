use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::api::{ApiError, PlatformApi};
use crate::auth::session::ceil_secs;
use crate::auth::{Credentials, SessionError, SessionGuard, SessionResult, SessionStatus};
use crate::models::WorldQuery;

use super::ProxyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayOptions {
    /// World lookups by id can run without the bot session on deployments
    /// where the platform serves them publicly.
    pub require_session_for_lookups: bool,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            require_session_for_lookups: true,
        }
    }
}

/// Request-facing side of the proxy. Clone is cheap.
#[derive(Clone)]
pub struct ProxyGateway {
    api: Arc<dyn PlatformApi>,
    guard: SessionGuard,
    options: GatewayOptions,
}

fn session_outcome(result: SessionResult) -> Result<(), ProxyError> {
    match result {
        SessionResult::Ok => Ok(()),
        SessionResult::RequiresTwoFactor => Err(ProxyError::AuthPending),
        SessionResult::CoolingDown(remaining) => Err(ProxyError::RateLimited {
            retry_after_secs: ceil_secs(remaining),
        }),
        SessionResult::Failed(message) => Err(ProxyError::Upstream {
            status: None,
            message,
        }),
    }
}

impl ProxyGateway {
    pub fn new(api: Arc<dyn PlatformApi>, guard: SessionGuard, options: GatewayOptions) -> Self {
        Self {
            api,
            guard,
            options,
        }
    }

    pub fn session(&self) -> &SessionGuard {
        &self.guard
    }

    pub fn status(&self) -> SessionStatus {
        self.guard.status()
    }

    async fn authorize(&self) -> Result<(), ProxyError> {
        session_outcome(self.guard.ensure_session().await)
    }

    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        let limit = self.request_timeout();
        tokio::time::timeout(limit, request)
            .await
            .unwrap_or_else(|_| Err(ApiError::Timeout(limit)))
    }

    fn request_timeout(&self) -> Duration {
        self.guard.settings().request_timeout
    }

    /// Map a downstream failure to the caller-facing error, updating the
    /// guard on rate limits and rejected sessions.
    fn translate(&self, operation: &'static str, err: ApiError) -> ProxyError {
        match err {
            ApiError::RateLimited => {
                let remaining = self.guard.report_rate_limited();
                ProxyError::RateLimited {
                    retry_after_secs: ceil_secs(remaining),
                }
            }
            ApiError::NotFound(detail) => ProxyError::NotFound(detail),
            other => {
                if matches!(other, ApiError::Unauthorized) {
                    self.guard.invalidate();
                }
                let status = other.status();
                warn!(operation, status = ?status, error = %other, "Platform request failed");
                ProxyError::Upstream {
                    status,
                    message: other.to_string(),
                }
            }
        }
    }

    pub async fn search_worlds(&self, query: &WorldQuery) -> Result<Value, ProxyError> {
        query.validate().map_err(ProxyError::InvalidInput)?;
        self.authorize().await?;

        debug!(query = ?query, "Searching worlds");
        self.call(self.api.search_worlds(query))
            .await
            .map_err(|e| self.translate("search_worlds", e))
    }

    pub async fn get_world_by_id(&self, world_id: &str) -> Result<Value, ProxyError> {
        let world_id = world_id.trim();
        if world_id.is_empty() {
            return Err(ProxyError::InvalidInput("World id is required".to_string()));
        }
        if self.options.require_session_for_lookups {
            self.authorize().await?;
        }

        self.call(self.api.get_world(world_id))
            .await
            .map_err(|e| match e {
                ApiError::NotFound(_) => {
                    ProxyError::NotFound(format!("World {} not found", world_id))
                }
                other => self.translate("get_world", other),
            })
    }

    pub async fn verify_two_factor(&self, code: &str) -> Result<(), ProxyError> {
        match self.guard.resolve_two_factor(code).await {
            Err(SessionError::InvalidInput(reason)) => Err(ProxyError::InvalidInput(reason)),
            Ok(SessionResult::Failed(reason)) => Err(ProxyError::TwoFactorRejected(reason)),
            Ok(result) => session_outcome(result),
        }
    }

    pub async fn list_friends(&self) -> Result<Value, ProxyError> {
        self.authorize().await?;
        self.call(self.api.friends())
            .await
            .map_err(|e| self.translate("friends", e))
    }

    /// Log the bot in with caller-supplied credentials. An `otp` answers
    /// the two-factor challenge the login raises, if any.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        otp: Option<&str>,
    ) -> Result<SessionStatus, ProxyError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(ProxyError::InvalidInput(
                "Username and password are required".to_string(),
            ));
        }

        let credentials = Credentials::new(username.trim(), password);
        let result = self.guard.login_with(credentials).await;
        match (result, otp.map(str::trim).filter(|code| !code.is_empty())) {
            (SessionResult::RequiresTwoFactor, Some(code)) => self.verify_two_factor(code).await?,
            (result, _) => session_outcome(result)?,
        }
        Ok(self.guard.status())
    }
}
