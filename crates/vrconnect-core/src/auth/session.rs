//! Shared bot session for the platform proxy.
//!
//! `SessionGuard` owns the single authenticated identity that every inbound
//! request borrows. At most one verification (current-user check, then login)
//! runs at a time; concurrent callers join the pending one through a shared
//! future and all see its outcome. A confirmed session is trusted for
//! `session_check_interval`, and a rate limit blocks every check until the
//! cool-down expires.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::api::client::REQUEST_TIMEOUT_SECS;
use crate::api::{ApiError, PlatformApi};
use crate::models::{LoginOutcome, TwoFactorMethod};

use super::Credentials;

// ============================================================================
// Constants
// ============================================================================

/// How long a confirmed session is trusted without asking the platform again.
pub const SESSION_CHECK_INTERVAL_SECS: u64 = 5 * 60;

/// Backoff after the platform rate limits the bot account.
pub const COOL_DOWN_SECS: u64 = 2 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardSettings {
    pub session_check_interval: Duration,
    pub cool_down: Duration,
    pub request_timeout: Duration,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            session_check_interval: Duration::from_secs(SESSION_CHECK_INTERVAL_SECS),
            cool_down: Duration::from_secs(COOL_DOWN_SECS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Outcome of a session check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionResult {
    Ok,
    RequiresTwoFactor,
    /// Remaining cool-down.
    CoolingDown(Duration),
    Failed(String),
}

impl SessionResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, SessionResult::Ok)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Whole seconds, rounded up so a retry hint never undershoots.
pub fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Unauthenticated,
    Authenticated,
    AwaitingTwoFactor,
    CoolingDown,
}

/// Point-in-time view of the guard, for diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub two_factor_methods: Vec<TwoFactorMethod>,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub cool_down_remaining_secs: Option<u64>,
    pub verification_in_flight: bool,
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone)]
enum Phase {
    Unauthenticated,
    Authenticated { verified_at: Instant },
    AwaitingTwoFactor { methods: Vec<TwoFactorMethod> },
}

type Verification = Shared<BoxFuture<'static, SessionResult>>;

/// Work carried by one in-flight verification.
enum Flight {
    /// Current-user check, then login with the stored credentials.
    Verify,
    /// Login with caller-supplied credentials, skipping the current-user check.
    Login {
        credentials: Credentials,
        switching: bool,
    },
}

enum LoginStart {
    CoolingDown(Duration),
    Busy,
    ChallengePending,
    Started(Verification),
}

struct InFlight {
    id: u64,
    verification: Verification,
}

struct SessionState {
    phase: Phase,
    /// Wall-clock twin of `Phase::Authenticated::verified_at`, for status output.
    last_verified_at: Option<DateTime<Utc>>,
    cool_down_until: Option<Instant>,
    in_flight: Option<InFlight>,
    next_flight_id: u64,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: Phase::Unauthenticated,
            last_verified_at: None,
            cool_down_until: None,
            in_flight: None,
            next_flight_id: 0,
        }
    }

    fn cool_down_remaining(&mut self, now: Instant) -> Option<Duration> {
        match self.cool_down_until {
            Some(until) if now < until => Some(until - now),
            Some(_) => {
                self.cool_down_until = None;
                None
            }
            None => None,
        }
    }

    fn is_fresh(&self, now: Instant, interval: Duration) -> bool {
        matches!(
            self.phase,
            Phase::Authenticated { verified_at } if now.duration_since(verified_at) < interval
        )
    }

    fn pending_methods(&self) -> Option<&[TwoFactorMethod]> {
        match &self.phase {
            Phase::AwaitingTwoFactor { methods } => Some(methods),
            _ => None,
        }
    }

    fn mark_authenticated(&mut self, now: Instant) {
        self.phase = Phase::Authenticated { verified_at: now };
        self.last_verified_at = Some(Utc::now());
    }

    fn drop_authentication(&mut self) {
        if matches!(self.phase, Phase::Authenticated { .. }) {
            self.phase = Phase::Unauthenticated;
        }
    }

    fn clear_two_factor(&mut self) {
        if matches!(self.phase, Phase::AwaitingTwoFactor { .. }) {
            self.phase = Phase::Unauthenticated;
        }
    }
}

struct Inner {
    api: Arc<dyn PlatformApi>,
    credentials: Mutex<Credentials>,
    settings: GuardSettings,
    state: Mutex<SessionState>,
    /// Serializes two-factor submissions.
    two_factor: tokio::sync::Mutex<()>,
}

impl Inner {
    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        let limit = self.settings.request_timeout;
        tokio::time::timeout(limit, request)
            .await
            .unwrap_or_else(|_| Err(ApiError::Timeout(limit)))
    }

    fn authenticated(&self) -> SessionResult {
        self.state.lock().mark_authenticated(Instant::now());
        SessionResult::Ok
    }

    fn rate_limited(&self) -> Duration {
        let now = Instant::now();
        let mut state = self.state.lock();
        let candidate = now + self.settings.cool_down;
        let until = state
            .cool_down_until
            .map_or(candidate, |current| current.max(candidate));
        state.cool_down_until = Some(until);
        state.drop_authentication();

        let remaining = until - now;
        warn!(
            cool_down_secs = ceil_secs(remaining),
            "Platform rate limited the bot, cooling down"
        );
        remaining
    }

    fn rate_limited_result(&self) -> SessionResult {
        SessionResult::CoolingDown(self.rate_limited())
    }

    /// One verification sequence: current user, then login if needed.
    async fn verify(&self) -> SessionResult {
        match self.call(self.api.current_user()).await {
            Ok(user) if user.is_valid() => {
                debug!(user = %user.display_name, "Bot session is valid");
                return self.authenticated();
            }
            Ok(_) => debug!("Current user response carried no identity"),
            Err(ApiError::RateLimited) => return self.rate_limited_result(),
            Err(e) => debug!(error = %e, "Current user check failed"),
        }

        if self.state.lock().pending_methods().is_some() {
            debug!("Two-factor challenge outstanding, skipping login");
            return SessionResult::RequiresTwoFactor;
        }

        let credentials = self.credentials.lock().clone();
        if !credentials.is_complete() {
            warn!("Bot credentials are not configured");
            self.state.lock().phase = Phase::Unauthenticated;
            return SessionResult::Failed("Bot credentials are not configured".to_string());
        }

        self.login(&credentials).await
    }

    /// Replace the bot account. The new credentials are kept only once the
    /// platform accepts them (or answers with a two-factor challenge).
    async fn login_as(&self, credentials: Credentials, switching: bool) -> SessionResult {
        if switching {
            if let Err(e) = self.call(self.api.logout()).await {
                debug!(error = %e, "Logout of previous bot session failed");
            }
            self.state.lock().phase = Phase::Unauthenticated;
        }

        let result = self.login(&credentials).await;
        match result {
            SessionResult::Ok | SessionResult::RequiresTwoFactor => {
                *self.credentials.lock() = credentials;
            }
            _ => debug!("Submitted credentials not adopted"),
        }
        result
    }

    async fn login(&self, credentials: &Credentials) -> SessionResult {
        info!(username = %credentials.username, "Logging in to VRChat as bot");
        match self.call(self.api.login(credentials)).await {
            Ok(LoginOutcome::Authenticated(user)) => {
                info!(user = %user.display_name, "Bot logged in");
                self.authenticated()
            }
            Ok(LoginOutcome::TwoFactorRequired(methods)) => {
                info!(methods = ?methods, "Bot login requires two-factor verification");
                self.state.lock().phase = Phase::AwaitingTwoFactor { methods };
                SessionResult::RequiresTwoFactor
            }
            Err(ApiError::RateLimited) => self.rate_limited_result(),
            Err(e) => {
                error!(error = %e, "Bot login failed");
                self.state.lock().phase = Phase::Unauthenticated;
                SessionResult::Failed(e.to_string())
            }
        }
    }
}

/// Clears the in-flight handle when the verification task ends, however it ends.
struct FlightReset {
    inner: Arc<Inner>,
    id: u64,
}

impl Drop for FlightReset {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        if state.in_flight.as_ref().is_some_and(|f| f.id == self.id) {
            state.in_flight = None;
        }
    }
}

// ============================================================================
// SessionGuard
// ============================================================================

/// Handle to the shared bot session. Clone is cheap; all clones share state.
#[derive(Clone)]
pub struct SessionGuard {
    inner: Arc<Inner>,
}

impl SessionGuard {
    pub fn new(api: Arc<dyn PlatformApi>, credentials: Credentials, settings: GuardSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                credentials: Mutex::new(credentials),
                settings,
                state: Mutex::new(SessionState::new()),
                two_factor: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn settings(&self) -> GuardSettings {
        self.inner.settings
    }

    /// Make sure the bot holds a usable session before an authenticated call.
    pub async fn ensure_session(&self) -> SessionResult {
        let verification = {
            let mut state = self.inner.state.lock();
            let now = Instant::now();

            if let Some(remaining) = state.cool_down_remaining(now) {
                return SessionResult::CoolingDown(remaining);
            }

            if let Some(flight) = &state.in_flight {
                debug!(flight = flight.id, "Joining in-flight session verification");
                flight.verification.clone()
            } else if state.is_fresh(now, self.inner.settings.session_check_interval) {
                return SessionResult::Ok;
            } else {
                self.start_flight(&mut state, Flight::Verify)
            }
        };

        verification.await
    }

    /// Spawn a verification and publish it while the state lock is held, so
    /// no second caller can start another one.
    fn start_flight(&self, state: &mut SessionState, flight: Flight) -> Verification {
        let id = state.next_flight_id;
        state.next_flight_id += 1;
        debug!(flight = id, "Starting session verification");

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let _reset = FlightReset {
                inner: Arc::clone(&inner),
                id,
            };
            match flight {
                Flight::Verify => inner.verify().await,
                Flight::Login {
                    credentials,
                    switching,
                } => inner.login_as(credentials, switching).await,
            }
        });

        let verification = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!(flight = id, error = %e, "Session verification task failed");
                    SessionResult::Failed(format!("Session verification aborted: {}", e))
                }
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(InFlight {
            id,
            verification: verification.clone(),
        });
        verification
    }

    /// Wait for a pending verification without starting one.
    async fn join_in_flight(&self) {
        let pending = self
            .inner
            .state
            .lock()
            .in_flight
            .as_ref()
            .map(|f| f.verification.clone());
        if let Some(verification) = pending {
            verification.await;
        }
    }

    /// Submit a two-factor code for the pending bot login.
    ///
    /// A rejected code leaves the guard waiting for two-factor. Calls are
    /// serialized, and once the session is authenticated further calls are
    /// no-ops returning `Ok`.
    pub async fn resolve_two_factor(&self, code: &str) -> Result<SessionResult, SessionError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(SessionError::InvalidInput(
                "Two-factor code is required".to_string(),
            ));
        }

        let _serial = self.inner.two_factor.lock().await;
        self.join_in_flight().await;

        let method = {
            let state = self.inner.state.lock();
            match &state.phase {
                Phase::Authenticated { .. } => {
                    debug!("Session already authenticated, ignoring two-factor code");
                    return Ok(SessionResult::Ok);
                }
                Phase::AwaitingTwoFactor { methods } => TwoFactorMethod::preferred(methods),
                Phase::Unauthenticated => TwoFactorMethod::EmailOtp,
            }
        };

        match self
            .inner
            .call(self.inner.api.verify_two_factor(method, code))
            .await
        {
            Ok(true) => info!(method = %method, "Two-factor code accepted"),
            Ok(false) => {
                warn!(method = %method, "Two-factor code rejected");
                return Ok(SessionResult::Failed(
                    "Two-factor code was rejected".to_string(),
                ));
            }
            Err(ApiError::RateLimited) => return Ok(self.inner.rate_limited_result()),
            Err(e) => {
                warn!(error = %e, "Two-factor verification failed");
                return Ok(SessionResult::Failed(e.to_string()));
            }
        }

        self.inner.state.lock().clear_two_factor();

        match self.inner.call(self.inner.api.current_user()).await {
            Ok(user) if user.is_valid() => {
                info!(user = %user.display_name, "Bot session confirmed after two-factor");
                Ok(self.inner.authenticated())
            }
            Ok(_) => Ok(SessionResult::Failed(
                "Two-factor accepted but the session has no identity".to_string(),
            )),
            Err(ApiError::RateLimited) => Ok(self.inner.rate_limited_result()),
            Err(e) => Ok(SessionResult::Failed(format!(
                "Two-factor accepted but the session could not be confirmed: {}",
                e
            ))),
        }
    }

    /// Enter (or extend) the cool-down after a downstream 429.
    /// Returns the remaining cool-down.
    pub fn report_rate_limited(&self) -> Duration {
        self.inner.rate_limited()
    }

    /// Forget a cached session the platform no longer accepts.
    pub fn invalidate(&self) {
        self.inner.state.lock().drop_authentication();
    }

    /// Log the bot in with caller-supplied credentials.
    ///
    /// The credentials always go through a real login, even when a session
    /// is already cached, and replace the stored ones only if the platform
    /// accepts them. Re-submitting the credentials of a pending two-factor
    /// challenge leaves the challenge in place so a code already sent stays
    /// valid.
    pub async fn login_with(&self, credentials: Credentials) -> SessionResult {
        loop {
            match self.begin_login(&credentials) {
                LoginStart::CoolingDown(remaining) => return SessionResult::CoolingDown(remaining),
                LoginStart::Busy => self.join_in_flight().await,
                LoginStart::ChallengePending => {
                    debug!("Two-factor challenge already pending for these credentials");
                    return SessionResult::RequiresTwoFactor;
                }
                LoginStart::Started(flight) => return flight.await,
            }
        }
    }

    fn begin_login(&self, credentials: &Credentials) -> LoginStart {
        let mut state = self.inner.state.lock();
        if let Some(remaining) = state.cool_down_remaining(Instant::now()) {
            return LoginStart::CoolingDown(remaining);
        }
        if state.in_flight.is_some() {
            return LoginStart::Busy;
        }

        let switching = {
            let current = self.inner.credentials.lock();
            if *current == *credentials && state.pending_methods().is_some() {
                return LoginStart::ChallengePending;
            }
            current.username != credentials.username
        };

        LoginStart::Started(self.start_flight(
            &mut state,
            Flight::Login {
                credentials: credentials.clone(),
                switching,
            },
        ))
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.inner.state.lock().phase, Phase::Authenticated { .. })
    }

    pub fn is_awaiting_two_factor(&self) -> bool {
        self.inner.state.lock().pending_methods().is_some()
    }

    pub fn cool_down_remaining(&self) -> Option<Duration> {
        self.inner.state.lock().cool_down_remaining(Instant::now())
    }

    pub fn status(&self) -> SessionStatus {
        let mut state = self.inner.state.lock();
        let cool_down = state.cool_down_remaining(Instant::now());

        let phase = match (&state.phase, cool_down) {
            (Phase::AwaitingTwoFactor { .. }, _) => SessionPhase::AwaitingTwoFactor,
            (_, Some(_)) => SessionPhase::CoolingDown,
            (Phase::Authenticated { .. }, None) => SessionPhase::Authenticated,
            (Phase::Unauthenticated, None) => SessionPhase::Unauthenticated,
        };

        SessionStatus {
            phase,
            two_factor_methods: state.pending_methods().map(<[_]>::to_vec).unwrap_or_default(),
            last_verified_at: state.last_verified_at,
            cool_down_remaining_secs: cool_down.map(ceil_secs),
            verification_in_flight: state.in_flight.is_some(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
