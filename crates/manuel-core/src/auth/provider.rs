use async_trait::async_trait;

use super::{CredentialBundle, UserIdentity};
use crate::error::{Error, Result};

/// Minimum password length accepted by the user pool policy
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length accepted by the user pool policy
pub const MAX_PASSWORD_LENGTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpResult {
    pub subject: String,
    pub needs_confirmation: bool,
}

/// Result of a password sign-in. Each provider callback path maps to exactly
/// one variant.
#[derive(Debug, Clone, PartialEq)]
pub enum SignInOutcome {
    Authenticated {
        credentials: CredentialBundle,
        user: UserIdentity,
    },
    /// The pool wants another step first (e.g. `NEW_PASSWORD_REQUIRED`)
    ChallengeRequired {
        challenge: String,
        session: Option<String>,
    },
}

/// Network boundary to the external identity service.
///
/// Implementations translate every provider error into the crate
/// [`Error`] taxonomy before returning.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResult>;

    async fn confirm_sign_up(&self, email: &str, code: &str) -> Result<()>;

    async fn resend_confirmation_code(&self, email: &str) -> Result<()>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInOutcome>;

    /// Exchange a refresh token for a new bundle. `Error::SessionExpired`
    /// means the refresh token itself is no longer valid.
    async fn refresh(&self, refresh_token: &str) -> Result<CredentialBundle>;

    /// Check that an access token is still accepted.
    async fn get_user(&self, access_token: &str) -> Result<()>;

    /// Best effort; an already signed-out token is not an error.
    async fn sign_out(&self, access_token: &str) -> Result<()>;

    async fn forgot_password(&self, email: &str) -> Result<()>;

    async fn confirm_forgot_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<()>;

    async fn change_password(
        &self,
        access_token: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<()>;
}

/// Basic shape check; the provider has the final word.
pub fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::Validation(format!("'{}' is not a valid email address", email)))
    }
}

/// Local copy of the user pool password policy so obviously weak passwords
/// fail without a round trip.
pub fn validate_password(password: &str) -> Result<()> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(Error::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(Error::Validation(format!(
            "Password must be at most {} characters",
            MAX_PASSWORD_LENGTH
        )));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(Error::Validation(
            "Password must contain an uppercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(Error::Validation(
            "Password must contain a lowercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(Error::Validation("Password must contain a number".to_string()));
    }
    Ok(())
}

pub fn validate_code(code: &str) -> Result<()> {
    let code = code.trim();
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::Validation(
            "Confirmation code must be numeric".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("  first.last+tag@sub.example.co  ").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("user").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@localhost").is_err());
        assert!(validate_email("user@@example.com").is_err());
        assert!(validate_email("us er@example.com").is_err());
        assert!(validate_email("user@example.").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("Passw0rdOk").is_ok());

        assert!(matches!(validate_password("abc"), Err(Error::Validation(_))));
        assert!(validate_password("alllowercase1").is_err());
        assert!(validate_password("ALLUPPERCASE1").is_err());
        assert!(validate_password("NoDigitsHere").is_err());
        assert!(validate_password(&format!("Aa1{}", "x".repeat(300))).is_err());
    }

    #[test]
    fn test_validate_code() {
        assert!(validate_code("123456").is_ok());
        assert!(validate_code(" 123456 ").is_ok());
        assert!(validate_code("").is_err());
        assert!(validate_code("12a456").is_err());
    }
}
