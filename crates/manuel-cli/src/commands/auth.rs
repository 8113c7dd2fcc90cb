use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use tracing::warn;

use manuel_core::{Error, ErrorKind};

use crate::app::App;
use crate::cli::{AuthCommand, PasswordArg};

pub async fn run(app: &App, command: AuthCommand) -> Result<()> {
    let session = app.session();
    let out = app.output;

    match command {
        AuthCommand::Signup { email, password } => {
            let password = new_password(password, "Password: ")?;
            let result = session.sign_up(&email, &password).await?;
            out.emit(
                &json!({
                    "subject": result.subject,
                    "needsConfirmation": result.needs_confirmation,
                }),
                |_| {
                    if result.needs_confirmation {
                        println!("Account created. Check {} for a confirmation code, then run:", email);
                        println!("  manuel auth confirm {} <code>", email);
                    } else {
                        println!("Account created. You can now sign in.");
                    }
                },
            )?;
        }
        AuthCommand::Confirm { email, code } => {
            session.confirm_sign_up(&email, &code).await?;
            out.success("Account confirmed. You can now sign in.");
        }
        AuthCommand::ResendCode { email } => {
            session.resend_confirmation_code(&email).await?;
            out.success(&format!("A new confirmation code was sent to {}", email));
        }
        AuthCommand::Login { email, password } => {
            let password = existing_password(password, "Password: ")?;
            let user = session.sign_in(&email, &password).await?;
            let snapshot = session.snapshot().await;
            if snapshot.last_error == Some(ErrorKind::Storage) {
                warn!("Signed in without persisting the session");
                eprintln!("Warning: {}", Error::Storage(String::new()).user_message());
            }
            out.emit(&user, |user| println!("Signed in as {}", user.email))?;
        }
        AuthCommand::Logout => {
            if session.is_authenticated().await {
                session.sign_out().await?;
                out.success("Signed out");
            } else {
                out.success("Not signed in");
            }
        }
        AuthCommand::Status => {
            let snapshot = session.snapshot().await;
            out.emit(&snapshot, |snapshot| match (&snapshot.user, snapshot.is_authenticated) {
                (Some(user), true) => {
                    let verified = if user.email_verified { "" } else { " (email not verified)" };
                    println!("Signed in as {}{}", user.email, verified);
                    if let Some(expires_at) = snapshot.expires_at {
                        let minutes = (expires_at - Utc::now()).num_minutes().max(0);
                        println!("Session token expires in {} min (refreshed automatically)", minutes);
                    }
                }
                _ => println!("Not signed in"),
            })?;
        }
        AuthCommand::ForgotPassword { email } => {
            session.forgot_password(&email).await?;
            out.success(&format!(
                "If an account exists for {}, a reset code has been sent",
                email
            ));
        }
        AuthCommand::ResetPassword {
            email,
            code,
            password,
        } => {
            let password = new_password(password, "New password: ")?;
            session.confirm_forgot_password(&email, &code, &password).await?;
            out.success("Password reset. You can now sign in.");
        }
        AuthCommand::ChangePassword => {
            let current = rpassword::prompt_password("Current password: ")?;
            let proposed = new_password(PasswordArg { password: None }, "New password: ")?;
            session.change_password(&current, &proposed).await?;
            out.success("Password changed");
        }
    }
    Ok(())
}

fn existing_password(arg: PasswordArg, prompt: &str) -> Result<String> {
    match arg.password {
        Some(password) => Ok(password),
        None => Ok(rpassword::prompt_password(prompt)?),
    }
}

/// Prompted new passwords are asked for twice.
fn new_password(arg: PasswordArg, prompt: &str) -> Result<String> {
    if let Some(password) = arg.password {
        return Ok(password);
    }
    let first = rpassword::prompt_password(prompt)?;
    let second = rpassword::prompt_password("Repeat password: ")?;
    if first != second {
        return Err(Error::Validation("Passwords do not match".to_string()).into());
    }
    Ok(first)
}
