use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Buffer before expiry at which a bundle is treated as stale (5 minutes)
pub const EXPIRY_BUFFER_MINUTES: i64 = 5;

/// Longest token lifetime the identity provider can be configured to issue (1 day)
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 24 * 60 * 60;

/// Tokens issued for one authenticated session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialBundle {
    pub access_token: String,
    pub refresh_token: String,
    pub id_token: String,
    pub expires_at: DateTime<Utc>,
}

// Tokens never reach logs through Debug
impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("id_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl CredentialBundle {
    pub fn new(
        access_token: String,
        refresh_token: String,
        id_token: String,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            id_token,
            expires_at,
        }
    }

    /// Build a bundle from the provider's `expires_in` (seconds from now).
    /// Lifetimes outside `1..=MAX_TOKEN_LIFETIME_SECS` are rejected.
    pub fn issued_now(
        access_token: String,
        refresh_token: String,
        id_token: String,
        expires_in_secs: i64,
    ) -> Result<Self> {
        let expires_at = Some(expires_in_secs)
            .filter(|secs| (1..=MAX_TOKEN_LIFETIME_SECS).contains(secs))
            .and_then(TimeDelta::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| Error::Permanent("Invalid token lifetime".to_string()))?;
        Ok(Self::new(access_token, refresh_token, id_token, expires_at))
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// True once we are inside the safety buffer before expiry.
    pub fn needs_refresh(&self) -> bool {
        Utc::now() + Duration::minutes(EXPIRY_BUFFER_MINUTES) >= self.expires_at
    }

    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at - Utc::now()
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        self.time_until_expiry().num_minutes().max(0)
    }

    pub fn user(&self) -> Result<UserIdentity> {
        UserIdentity::from_id_token(&self.id_token)
    }
}

/// Who is signed in, as stated by the identity token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
    pub email_verified: bool,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<BoolClaim>,
    #[serde(default)]
    iat: Option<i64>,
}

/// Cognito emits `email_verified` either as a JSON bool or as "true"/"false".
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BoolClaim {
    Bool(bool),
    Text(String),
}

impl BoolClaim {
    fn as_bool(&self) -> bool {
        match self {
            BoolClaim::Bool(b) => *b,
            BoolClaim::Text(s) => s.eq_ignore_ascii_case("true"),
        }
    }
}

impl UserIdentity {
    /// Decode the claims segment of an ID token. The signature is not checked;
    /// the token came straight from the identity provider over TLS.
    pub fn from_id_token(token: &str) -> Result<Self> {
        let payload = token
            .split('.')
            .nth(1)
            .ok_or_else(|| Error::Permanent("Malformed identity token".to_string()))?;

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| Error::Permanent(format!("Malformed identity token: {}", e)))?;

        let claims: IdTokenClaims = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Permanent(format!("Malformed identity token claims: {}", e)))?;

        let created_at = claims
            .iat
            .and_then(|iat| Utc.timestamp_opt(iat, 0).single())
            .unwrap_or_else(Utc::now);

        Ok(Self {
            id: claims.sub,
            email: claims.email.unwrap_or_default(),
            email_verified: claims
                .email_verified
                .as_ref()
                .map(BoolClaim::as_bool)
                .unwrap_or(false),
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_jwt(claims: &str) -> String {
        format!(
            "{}.{}.signature",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#),
            URL_SAFE_NO_PAD.encode(claims)
        )
    }

    #[test]
    fn test_user_from_id_token() {
        let token = fake_jwt(
            r#"{"sub":"user-123","email":"user@example.com","email_verified":true,"iat":1700000000}"#,
        );
        let user = UserIdentity::from_id_token(&token).unwrap();
        assert_eq!(user.id, "user-123");
        assert_eq!(user.email, "user@example.com");
        assert!(user.email_verified);
        assert_eq!(user.created_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_user_from_id_token_string_verified_claim() {
        let token = fake_jwt(r#"{"sub":"abc","email":"a@b.co","email_verified":"false"}"#);
        let user = UserIdentity::from_id_token(&token).unwrap();
        assert!(!user.email_verified);

        let token = fake_jwt(r#"{"sub":"abc","email_verified":"TRUE"}"#);
        assert!(UserIdentity::from_id_token(&token).unwrap().email_verified);
    }

    #[test]
    fn test_user_from_malformed_token() {
        assert!(UserIdentity::from_id_token("").is_err());
        assert!(UserIdentity::from_id_token("only-one-segment").is_err());
        assert!(UserIdentity::from_id_token("a.!!!not-base64!!!.c").is_err());
        assert!(UserIdentity::from_id_token(&fake_jwt(r#"{"email":"no-sub"}"#)).is_err());
    }

    #[test]
    fn test_bundle_expiry_buffer() {
        let fresh = CredentialBundle::issued_now("a".into(), "r".into(), "i".into(), 3600).unwrap();
        assert!(!fresh.is_expired());
        assert!(!fresh.needs_refresh());
        assert!(fresh.minutes_until_expiry() >= 59);

        // Inside the 5 minute buffer but not yet expired
        let stale = CredentialBundle::issued_now("a".into(), "r".into(), "i".into(), 120).unwrap();
        assert!(!stale.is_expired());
        assert!(stale.needs_refresh());

        let expired = CredentialBundle::new(
            "a".into(),
            "r".into(),
            "i".into(),
            Utc::now() - Duration::seconds(10),
        );
        assert!(expired.is_expired());
        assert_eq!(expired.minutes_until_expiry(), 0);
    }

    #[test]
    fn test_issued_now_rejects_unusable_lifetimes() {
        for secs in [0, -10, MAX_TOKEN_LIFETIME_SECS + 1, 9_000_000_000_000_000, i64::MAX] {
            let err = CredentialBundle::issued_now("a".into(), "r".into(), "i".into(), secs)
                .unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::Permanent, "{}", secs);
        }
        assert!(
            CredentialBundle::issued_now("a".into(), "r".into(), "i".into(), MAX_TOKEN_LIFETIME_SECS)
                .is_ok()
        );
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let bundle = CredentialBundle::issued_now(
            "secret-access".into(),
            "secret-refresh".into(),
            "secret-id".into(),
            3600,
        )
        .unwrap();
        let debug = format!("{:?}", bundle);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }
}
