//! In-memory platform for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::api::{ApiError, PlatformApi};
use crate::auth::Credentials;
use crate::models::{CurrentUser, LoginOutcome, TwoFactorMethod, WorldQuery};

pub(crate) const VALID_CODE: &str = "123456";
pub(crate) const BOT_PASSWORD: &str = "secret";
pub(crate) const KNOWN_WORLD: &str = "wrld_4cf554b4-430c-4f8f-b53e-1f294eed230b";

#[derive(Debug, Clone)]
pub(crate) enum LoginBehavior {
    Succeed,
    TwoFactor(Vec<TwoFactorMethod>),
    Fail(String),
    RateLimited,
    Panic,
}

#[derive(Debug, Clone)]
pub(crate) enum SearchBehavior {
    Results(Value),
    RateLimited,
    Status(u16, String),
}

/// Platform double that keeps its own notion of the bot session and counts
/// every call made against it.
pub(crate) struct FakePlatform {
    logged_in: AtomicBool,
    pending_two_factor: AtomicBool,
    login: Mutex<LoginBehavior>,
    search: Mutex<SearchBehavior>,
    delay: Mutex<Duration>,
    current_user_calls: AtomicUsize,
    login_calls: AtomicUsize,
    verify_calls: AtomicUsize,
    search_calls: AtomicUsize,
    world_calls: AtomicUsize,
    friends_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    last_query: Mutex<Option<WorldQuery>>,
}

impl FakePlatform {
    pub(crate) fn new() -> Self {
        Self {
            logged_in: AtomicBool::new(false),
            pending_two_factor: AtomicBool::new(false),
            login: Mutex::new(LoginBehavior::Succeed),
            search: Mutex::new(SearchBehavior::Results(
                json!([{ "id": KNOWN_WORLD, "name": "The Plaza" }]),
            )),
            delay: Mutex::new(Duration::ZERO),
            current_user_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
            world_calls: AtomicUsize::new(0),
            friends_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            last_query: Mutex::new(None),
        }
    }

    pub(crate) fn set_login(&self, behavior: LoginBehavior) {
        *self.login.lock() = behavior;
    }

    pub(crate) fn set_search(&self, behavior: SearchBehavior) {
        *self.search.lock() = behavior;
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub(crate) fn set_logged_in(&self, logged_in: bool) {
        self.logged_in.store(logged_in, Ordering::SeqCst);
    }

    pub(crate) fn current_user_calls(&self) -> usize {
        self.current_user_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn world_calls(&self) -> usize {
        self.world_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_query(&self) -> Option<WorldQuery> {
        self.last_query.lock().clone()
    }

    /// Every call that would have left the process.
    pub(crate) fn network_calls(&self) -> usize {
        [
            &self.current_user_calls,
            &self.login_calls,
            &self.verify_calls,
            &self.search_calls,
            &self.world_calls,
            &self.friends_calls,
            &self.logout_calls,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn bot() -> CurrentUser {
        CurrentUser {
            id: "usr_c1644b5b-3ca4-45b4-97c6-a2a0de70d469".to_string(),
            display_name: "VRConnect Bot".to_string(),
            username: Some("vrconnectbot".to_string()),
        }
    }
}

#[async_trait]
impl PlatformApi for FakePlatform {
    async fn current_user(&self) -> Result<CurrentUser, ApiError> {
        self.current_user_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.logged_in.load(Ordering::SeqCst) {
            Ok(Self::bot())
        } else {
            Err(ApiError::Unauthorized)
        }
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginOutcome, ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if credentials.password() != BOT_PASSWORD {
            return Err(ApiError::AccessDenied(
                "Invalid Username/Email or Password".to_string(),
            ));
        }
        let behavior = self.login.lock().clone();
        match behavior {
            LoginBehavior::Succeed => {
                self.logged_in.store(true, Ordering::SeqCst);
                Ok(LoginOutcome::Authenticated(Self::bot()))
            }
            LoginBehavior::TwoFactor(methods) => {
                self.pending_two_factor.store(true, Ordering::SeqCst);
                Ok(LoginOutcome::TwoFactorRequired(methods))
            }
            LoginBehavior::Fail(message) => Err(ApiError::AccessDenied(message)),
            LoginBehavior::RateLimited => Err(ApiError::RateLimited),
            LoginBehavior::Panic => panic!("scripted login panic"),
        }
    }

    async fn verify_two_factor(
        &self,
        _method: TwoFactorMethod,
        code: &str,
    ) -> Result<bool, ApiError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if code == VALID_CODE && self.pending_two_factor.swap(false, Ordering::SeqCst) {
            self.logged_in.store(true, Ordering::SeqCst);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn search_worlds(&self, query: &WorldQuery) -> Result<Value, ApiError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock() = Some(query.clone());
        self.pause().await;
        let behavior = self.search.lock().clone();
        match behavior {
            SearchBehavior::Results(value) => Ok(value),
            SearchBehavior::RateLimited => Err(ApiError::RateLimited),
            SearchBehavior::Status(status, body) => {
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
                Err(ApiError::from_status(status, &body))
            }
        }
    }

    async fn get_world(&self, world_id: &str) -> Result<Value, ApiError> {
        self.world_calls.fetch_add(1, Ordering::SeqCst);
        if world_id == KNOWN_WORLD {
            Ok(json!({ "id": KNOWN_WORLD, "name": "The Plaza", "capacity": 32 }))
        } else {
            Err(ApiError::NotFound(format!("World {} not found", world_id)))
        }
    }

    async fn friends(&self) -> Result<Value, ApiError> {
        self.friends_calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!([{ "id": "usr_friend", "displayName": "Friend" }]))
    }

    async fn logout(&self) -> Result<(), ApiError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.logged_in.store(false, Ordering::SeqCst);
        self.pending_two_factor.store(false, Ordering::SeqCst);
        Ok(())
    }
}
