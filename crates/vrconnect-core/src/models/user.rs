use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Two-factor methods the platform may offer during login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TwoFactorMethod {
    EmailOtp,
    Totp,
    Otp,
    #[serde(other)]
    Unknown,
}

impl TwoFactorMethod {
    /// Pick the method a submitted code should be verified against.
    /// Email OTP is what the bot account receives by default.
    pub fn preferred(methods: &[TwoFactorMethod]) -> TwoFactorMethod {
        if methods.is_empty() || methods.contains(&TwoFactorMethod::EmailOtp) {
            TwoFactorMethod::EmailOtp
        } else if methods.contains(&TwoFactorMethod::Totp) {
            TwoFactorMethod::Totp
        } else if methods.contains(&TwoFactorMethod::Otp) {
            TwoFactorMethod::Otp
        } else {
            TwoFactorMethod::EmailOtp
        }
    }

    /// Path segment under `/auth/twofactorauth/` for this method.
    pub fn endpoint(&self) -> &'static str {
        match self {
            TwoFactorMethod::EmailOtp | TwoFactorMethod::Unknown => "emailotp",
            TwoFactorMethod::Totp => "totp",
            TwoFactorMethod::Otp => "otp",
        }
    }
}

impl std::fmt::Display for TwoFactorMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TwoFactorMethod::EmailOtp => write!(f, "emailOtp"),
            TwoFactorMethod::Totp => write!(f, "totp"),
            TwoFactorMethod::Otp => write!(f, "otp"),
            TwoFactorMethod::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

impl CurrentUser {
    /// A usable identity always carries a user id.
    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty()
    }
}

/// What `/auth/user` answered for a login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated(CurrentUser),
    TwoFactorRequired(Vec<TwoFactorMethod>),
}

impl LoginOutcome {
    /// Interpret an `/auth/user` body. The platform answers a login that
    /// still needs a second factor with `{"requiresTwoFactorAuth": [...]}`
    /// instead of a user object.
    pub fn from_body(body: Value) -> Result<Self, String> {
        if let Some(methods) = body.get("requiresTwoFactorAuth") {
            let methods: Vec<TwoFactorMethod> = serde_json::from_value(methods.clone())
                .map_err(|e| format!("Unrecognized two-factor methods: {}", e))?;
            return Ok(LoginOutcome::TwoFactorRequired(methods));
        }

        let user: CurrentUser = serde_json::from_value(body)
            .map_err(|e| format!("Unrecognized user response: {}", e))?;
        if !user.is_valid() {
            return Err("User response has no id".to_string());
        }
        Ok(LoginOutcome::Authenticated(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_login_outcome_two_factor() {
        let outcome = LoginOutcome::from_body(json!({ "requiresTwoFactorAuth": ["emailOtp"] }))
            .expect("two-factor body should parse");
        assert_eq!(outcome, LoginOutcome::TwoFactorRequired(vec![TwoFactorMethod::EmailOtp]));
    }

    #[test]
    fn test_login_outcome_user() {
        let body = json!({
            "id": "usr_c1644b5b-3ca4-45b4-97c6-a2a0de70d469",
            "displayName": "VRConnect Bot",
            "username": "vrconnectbot",
            "bio": "ignored"
        });
        match LoginOutcome::from_body(body).expect("user body should parse") {
            LoginOutcome::Authenticated(user) => {
                assert_eq!(user.display_name, "VRConnect Bot");
                assert_eq!(user.username.as_deref(), Some("vrconnectbot"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_login_outcome_rejects_missing_id() {
        assert!(LoginOutcome::from_body(json!({ "id": "", "displayName": "x" })).is_err());
        assert!(LoginOutcome::from_body(json!({ "ok": true })).is_err());
    }

    #[test]
    fn test_unknown_two_factor_method_is_tolerated() {
        let outcome = LoginOutcome::from_body(json!({ "requiresTwoFactorAuth": ["totp", "passkey"] }))
            .expect("unknown methods should not fail parsing");
        assert_eq!(
            outcome,
            LoginOutcome::TwoFactorRequired(vec![TwoFactorMethod::Totp, TwoFactorMethod::Unknown])
        );
    }

    #[test]
    fn test_preferred_method() {
        assert_eq!(TwoFactorMethod::preferred(&[]), TwoFactorMethod::EmailOtp);
        assert_eq!(
            TwoFactorMethod::preferred(&[TwoFactorMethod::Totp, TwoFactorMethod::Otp]),
            TwoFactorMethod::Totp
        );
        assert_eq!(TwoFactorMethod::preferred(&[TwoFactorMethod::Otp]).endpoint(), "otp");
    }
}
