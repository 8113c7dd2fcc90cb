//! Amazon Cognito user pool adapter.
//!
//! Speaks the user pool JSON protocol directly: every operation is a POST to
//! the regional endpoint with an `X-Amz-Target` header naming the action.
//! Errors are mapped on the structured `__type` code only.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{CredentialBundle, IdentityProvider, SignInOutcome, SignUpResult, UserIdentity};
use crate::config::Config;
use crate::error::{truncate_body, Error, Result};

const TARGET_PREFIX: &str = "AWSCognitoIdentityProviderService";

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Header some endpoints use instead of `__type`
const ERROR_TYPE_HEADER: &str = "x-amzn-errortype";

const AUTH_FLOW_PASSWORD: &str = "USER_PASSWORD_AUTH";
const AUTH_FLOW_REFRESH: &str = "REFRESH_TOKEN_AUTH";

/// Which call an error came from. Some codes mean different things per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    SignUp,
    ConfirmSignUp,
    ResendConfirmationCode,
    SignIn,
    Refresh,
    GetUser,
    SignOut,
    ForgotPassword,
    ConfirmForgotPassword,
    ChangePassword,
}

impl Operation {
    fn target(self) -> &'static str {
        match self {
            Operation::SignUp => "SignUp",
            Operation::ConfirmSignUp => "ConfirmSignUp",
            Operation::ResendConfirmationCode => "ResendConfirmationCode",
            Operation::SignIn | Operation::Refresh => "InitiateAuth",
            Operation::GetUser => "GetUser",
            Operation::SignOut => "GlobalSignOut",
            Operation::ForgotPassword => "ForgotPassword",
            Operation::ConfirmForgotPassword => "ConfirmForgotPassword",
            Operation::ChangePassword => "ChangePassword",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SignUpResponse {
    user_sub: String,
    #[serde(default)]
    user_confirmed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthResponse {
    authentication_result: Option<AuthenticationResult>,
    challenge_name: Option<String>,
    session: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResult {
    access_token: String,
    id_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    error_type: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

/// Empty `{}` responses
#[derive(Debug, Deserialize)]
struct Ack {}

#[derive(Clone)]
pub struct CognitoIdentityProvider {
    client: Client,
    endpoint: String,
    client_id: String,
}

impl CognitoIdentityProvider {
    pub fn new(endpoint: impl Into<String>, client_id: impl Into<String>, client: Client) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            client_id: client_id.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::new(
            config.identity_endpoint(),
            config.client_id()?.to_string(),
            client,
        ))
    }

    async fn call<B, T>(&self, operation: Operation, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(operation = operation.target(), "Identity provider call");

        let response = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, CONTENT_TYPE)
            .header(
                "X-Amz-Target",
                format!("{}.{}", TARGET_PREFIX, operation.target()),
            )
            .json(body)
            .send()
            .await
            .map_err(|e| Error::from_transport(&e))?;

        let status = response.status();
        let header_code = response
            .headers()
            .get(ERROR_TYPE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response
            .text()
            .await
            .map_err(|e| Error::from_transport(&e))?;

        if status.is_success() {
            return serde_json::from_str(&text).map_err(|e| {
                Error::Permanent(format!(
                    "Unexpected {} response: {}",
                    operation.target(),
                    e
                ))
            });
        }

        let parsed: Option<ErrorBody> = serde_json::from_str(&text).ok();
        let code = parsed
            .as_ref()
            .and_then(|b| b.error_type.clone())
            .or(header_code)
            .map(|c| normalize_code(&c).to_string());
        let message = parsed
            .and_then(|b| b.message)
            .unwrap_or_else(|| truncate_body(&text));

        match code {
            Some(code) => Err(map_error(operation, &code, &message)),
            None if status.is_server_error() => Err(Error::Transient(format!(
                "Identity provider returned {}",
                status
            ))),
            None => {
                warn!(operation = operation.target(), status = status.as_u16(), "Identity provider error without code");
                Err(Error::Permanent(message))
            }
        }
    }

    fn bundle_from(result: AuthenticationResult, previous_refresh: Option<&str>) -> Result<CredentialBundle> {
        let refresh_token = match (result.refresh_token, previous_refresh) {
            (Some(token), _) => token,
            (None, Some(previous)) => previous.to_string(),
            (None, None) => {
                return Err(Error::Permanent(
                    "Identity provider did not return a refresh token".to_string(),
                ))
            }
        };
        CredentialBundle::issued_now(
            result.access_token,
            refresh_token,
            result.id_token,
            result.expires_in,
        )
    }
}

/// `aws.cognito#NotAuthorizedException` and `NotAuthorizedException:` both
/// appear in the wild; keep only the bare code.
fn normalize_code(raw: &str) -> &str {
    let code = raw.rsplit('#').next().unwrap_or(raw);
    code.split(':').next().unwrap_or(code).trim()
}

/// Translate a Cognito error code into the crate taxonomy.
pub(crate) fn map_error(operation: Operation, code: &str, message: &str) -> Error {
    match code {
        "UsernameExistsException" | "AliasExistsException" => Error::Conflict(message.to_string()),
        "InvalidPasswordException" | "InvalidParameterException" => {
            Error::Validation(message.to_string())
        }
        "CodeMismatchException" | "ExpiredCodeException" => Error::InvalidCode(message.to_string()),
        "UserNotConfirmedException" => Error::NotConfirmed(message.to_string()),
        "TooManyRequestsException"
        | "LimitExceededException"
        | "TooManyFailedAttemptsException" => Error::Throttled(message.to_string()),
        "NotAuthorizedException" => match operation {
            Operation::Refresh | Operation::GetUser | Operation::SignOut => Error::SessionExpired,
            _ => Error::InvalidCredentials(message.to_string()),
        },
        "UserNotFoundException" => match operation {
            Operation::SignIn => Error::InvalidCredentials(message.to_string()),
            Operation::Refresh | Operation::GetUser => Error::SessionExpired,
            _ => Error::Validation("No account found for this email".to_string()),
        },
        "PasswordResetRequiredException" => {
            Error::Permanent("Password reset required - use forgot password".to_string())
        }
        "InternalErrorException" | "ServiceUnavailableException" => {
            Error::Transient(message.to_string())
        }
        other => {
            warn!(code = other, operation = operation.target(), "Unmapped identity provider error");
            Error::Permanent(format!("{}: {}", other, message))
        }
    }
}

#[async_trait]
impl IdentityProvider for CognitoIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResult> {
        let body = json!({
            "ClientId": self.client_id,
            "Username": email,
            "Password": password,
            "UserAttributes": [{ "Name": "email", "Value": email }],
        });
        let response: SignUpResponse = self.call(Operation::SignUp, &body).await?;
        info!(needs_confirmation = !response.user_confirmed, "Account created");
        Ok(SignUpResult {
            subject: response.user_sub,
            needs_confirmation: !response.user_confirmed,
        })
    }

    async fn confirm_sign_up(&self, email: &str, code: &str) -> Result<()> {
        let body = json!({
            "ClientId": self.client_id,
            "Username": email,
            "ConfirmationCode": code,
        });
        let _: Ack = self.call(Operation::ConfirmSignUp, &body).await?;
        Ok(())
    }

    async fn resend_confirmation_code(&self, email: &str) -> Result<()> {
        let body = json!({ "ClientId": self.client_id, "Username": email });
        let _: serde_json::Value = self.call(Operation::ResendConfirmationCode, &body).await?;
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInOutcome> {
        let body = json!({
            "ClientId": self.client_id,
            "AuthFlow": AUTH_FLOW_PASSWORD,
            "AuthParameters": { "USERNAME": email, "PASSWORD": password },
        });
        let response: InitiateAuthResponse = self.call(Operation::SignIn, &body).await?;

        match (response.authentication_result, response.challenge_name) {
            (Some(result), _) => {
                let credentials = Self::bundle_from(result, None)?;
                let user = credentials.user()?;
                Ok(SignInOutcome::Authenticated { credentials, user })
            }
            (None, Some(challenge)) => {
                info!(challenge = %challenge, "Sign-in requires a challenge response");
                Ok(SignInOutcome::ChallengeRequired {
                    challenge,
                    session: response.session,
                })
            }
            (None, None) => Err(Error::Permanent(
                "Identity provider returned neither tokens nor a challenge".to_string(),
            )),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<CredentialBundle> {
        let body = json!({
            "ClientId": self.client_id,
            "AuthFlow": AUTH_FLOW_REFRESH,
            "AuthParameters": { "REFRESH_TOKEN": refresh_token },
        });
        let response: InitiateAuthResponse = self.call(Operation::Refresh, &body).await?;
        let result = response.authentication_result.ok_or(Error::SessionExpired)?;
        Self::bundle_from(result, Some(refresh_token))
    }

    async fn get_user(&self, access_token: &str) -> Result<()> {
        let body = json!({ "AccessToken": access_token });
        let _: serde_json::Value = self.call(Operation::GetUser, &body).await?;
        Ok(())
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let body = json!({ "AccessToken": access_token });
        match self.call::<_, Ack>(Operation::SignOut, &body).await {
            Ok(_) | Err(Error::SessionExpired) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn forgot_password(&self, email: &str) -> Result<()> {
        let body = json!({ "ClientId": self.client_id, "Username": email });
        let _: serde_json::Value = self.call(Operation::ForgotPassword, &body).await?;
        Ok(())
    }

    async fn confirm_forgot_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<()> {
        let body = json!({
            "ClientId": self.client_id,
            "Username": email,
            "ConfirmationCode": code,
            "Password": new_password,
        });
        let _: Ack = self.call(Operation::ConfirmForgotPassword, &body).await?;
        Ok(())
    }

    async fn change_password(
        &self,
        access_token: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let body = json!({
            "AccessToken": access_token,
            "PreviousPassword": old_password,
            "ProposedPassword": new_password,
        });
        let _: Ack = self.call(Operation::ChangePassword, &body).await?;
        Ok(())
    }
}
