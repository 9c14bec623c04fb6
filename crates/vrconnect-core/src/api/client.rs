//! API client for communicating with the VRChat REST API.
//!
//! This module provides the `ApiClient` struct, the reqwest-backed
//! `PlatformApi` used in production.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{header, Client, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use crate::auth::Credentials;
use crate::models::{CurrentUser, LoginOutcome, TwoFactorMethod, WorldQuery};

use super::{ApiError, PlatformApi};

// ============================================================================
// Constants
// ============================================================================

/// Base URL for the platform API
pub const DEFAULT_API_BASE_URL: &str = "https://api.vrchat.cloud/api/1";

/// The platform rejects requests without an identifying User-Agent.
pub const DEFAULT_USER_AGENT: &str = "VRConnect/1.0.0";

/// HTTP request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Everything but alphanumerics and `-_.!~*'()` is percent-encoded; the
/// platform expects Basic credentials encoded this way before base64.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Path segments (world ids) are encoded with the same set.
const PATH_SEGMENT: &AsciiSet = URI_COMPONENT;

/// API client for the platform.
/// Clone is cheap - reqwest::Client uses Arc internally, so clones also
/// share the cookie jar that holds the bot session.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client with its own cookie store
    pub fn new(base_url: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Client against the public API with default settings
    pub fn with_defaults() -> Result<Self> {
        Self::new(
            DEFAULT_API_BASE_URL,
            DEFAULT_USER_AGENT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn basic_auth_header(username: &str, password: &str) -> String {
        let raw = format!(
            "{}:{}",
            utf8_percent_encode(username, URI_COMPONENT),
            utf8_percent_encode(password, URI_COMPONENT)
        );
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw)
        )
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, ApiError> {
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON: {}", e)))
    }

    async fn get_json(&self, url: &str, query: &[(&'static str, String)]) -> Result<Value, ApiError> {
        debug!(url = url, params = query.len(), "GET");
        let response = self.client.get(url).query(query).send().await?;
        let response = Self::check_response(response).await?;
        Self::read_json(response).await
    }
}

#[async_trait]
impl PlatformApi for ApiClient {
    async fn current_user(&self) -> Result<CurrentUser, ApiError> {
        let body = self.get_json(&self.url("/auth/user"), &[]).await?;
        match LoginOutcome::from_body(body).map_err(ApiError::InvalidResponse)? {
            LoginOutcome::Authenticated(user) => Ok(user),
            LoginOutcome::TwoFactorRequired(_) => Err(ApiError::Unauthorized),
        }
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginOutcome, ApiError> {
        let url = self.url("/auth/user");
        debug!(url = %url, username = %credentials.username, "Sending login request");

        let response = self
            .client
            .get(&url)
            .header(
                header::AUTHORIZATION,
                Self::basic_auth_header(&credentials.username, credentials.password()),
            )
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let body = Self::read_json(response).await?;
        LoginOutcome::from_body(body).map_err(ApiError::InvalidResponse)
    }

    async fn verify_two_factor(
        &self,
        method: TwoFactorMethod,
        code: &str,
    ) -> Result<bool, ApiError> {
        let url = self.url(&format!("/auth/twofactorauth/{}/verify", method.endpoint()));
        debug!(url = %url, method = %method, "Submitting two-factor code");

        let response = self
            .client
            .post(&url)
            .json(&json!({ "code": code }))
            .send()
            .await?;

        // A wrong code comes back as 400 rather than `verified: false`.
        if response.status() == StatusCode::BAD_REQUEST {
            return Ok(false);
        }

        let response = Self::check_response(response).await?;
        let body = Self::read_json(response).await?;
        Ok(body.get("verified").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn search_worlds(&self, query: &WorldQuery) -> Result<Value, ApiError> {
        self.get_json(&self.url("/worlds"), &query.to_query_pairs())
            .await
    }

    async fn get_world(&self, world_id: &str) -> Result<Value, ApiError> {
        let url = self.url(&format!(
            "/worlds/{}",
            utf8_percent_encode(world_id, PATH_SEGMENT)
        ));
        self.get_json(&url, &[]).await
    }

    async fn friends(&self) -> Result<Value, ApiError> {
        self.get_json(&self.url("/auth/user/friends"), &[]).await
    }

    async fn logout(&self) -> Result<(), ApiError> {
        let response = self.client.put(self.url("/logout")).send().await?;
        Self::check_response(response).await?;
        Ok(())
    }
}
