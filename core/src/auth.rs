use crate::api::{self, Backend, CreateUserRequest, PasswordReset};
use crate::notify::{NotificationCenter, Severity};
use crate::store::{self, CredentialStore};
use anyhow::Result;
use std::sync::Arc;

/// Password rule check. Returns the empty list iff the password is 6-12
/// characters, has at least one digit, one lowercase, one uppercase, one
/// of `@`, `_`, `.`, and nothing outside `[A-Za-z0-9@_.]`.
pub fn validate_password(password: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let length = password.chars().count();
    if !(6..=12).contains(&length) {
        errors.push("Password must be between 6-12 characters".to_string());
    }
    if password
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || matches!(c, '@' | '_' | '.')))
    {
        errors.push("Only @, _, and . special characters are allowed".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least 1 number".to_string());
    }
    if !password.chars().any(|c| matches!(c, '@' | '_' | '.')) {
        errors.push("Password must contain at least 1 special character (@, _, or .)".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("Password must contain at least 1 lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must contain at least 1 uppercase letter".to_string());
    }
    errors
}

#[derive(Debug, Clone, Default)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl SignupForm {
    pub fn is_valid(&self) -> bool {
        !self.username.is_empty()
            && !self.email.is_empty()
            && !self.password.is_empty()
            && self.password == self.confirm_password
            && validate_password(&self.password).is_empty()
    }
}

/// Login, signup, and password-reset flows. Credentials land in the store
/// in the call's own continuation, so the very next authenticated request
/// picks them up; there is no poll-for-token step.
#[derive(Clone)]
pub struct AuthFlow {
    backend: Arc<dyn Backend>,
    notifier: NotificationCenter,
    store: CredentialStore,
}

impl AuthFlow {
    pub fn new(
        backend: Arc<dyn Backend>,
        notifier: NotificationCenter,
        store: CredentialStore,
    ) -> Self {
        Self {
            backend,
            notifier,
            store,
        }
    }

    /// Returns whether the account was created.
    pub async fn sign_up(&self, form: &SignupForm) -> Result<bool> {
        if !form.is_valid() {
            self.notifier
                .pop(Severity::Error, "Please fill all fields correctly.");
            return Ok(false);
        }
        let request = CreateUserRequest {
            username: form.username.clone(),
            email: form.email.clone(),
            password: form.password.clone(),
        };
        match self.backend.create_user(&request).await {
            Ok(()) => {
                self.notifier
                    .pop(Severity::Success, "Account created! You can now log in.");
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(%err, "signup failed");
                self.notifier
                    .pop(Severity::Error, api::detail_or(&err, "Error creating user"));
                Ok(false)
            }
        }
    }

    /// Returns whether a token was obtained and persisted.
    pub async fn log_in(&self, username: &str, password: &str) -> Result<bool> {
        match self.backend.oauth_token(username, password).await {
            Ok(token) => {
                self.store.set(store::ACCESS_TOKEN, &token.access_token)?;
                self.store.set(store::TOKEN_TYPE, &token.token_type)?;
                self.notifier.pop(Severity::Success, "Login successful");
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(%err, "login failed");
                self.notifier.pop(Severity::Error, "Login failed");
                Ok(false)
            }
        }
    }

    pub async fn reset_password(&self, identifier: &str, new_password: &str) -> Result<bool> {
        if identifier.is_empty() || !validate_password(new_password).is_empty() {
            self.notifier
                .pop(Severity::Error, "Please fill all fields correctly.");
            return Ok(false);
        }
        let request = PasswordReset {
            identifier: identifier.to_string(),
            new_password: new_password.to_string(),
        };
        match self.backend.reset_password(&request).await {
            Ok(()) => {
                self.notifier
                    .pop(Severity::Success, "Password reset successful");
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(%err, "password reset failed");
                self.notifier
                    .pop(Severity::Error, "Error resetting password");
                Ok(false)
            }
        }
    }

    /// Drop the bearer token, its type, and the persisted wikipedia
    /// session. Idempotent.
    pub fn log_out(&self) {
        self.store.remove(store::ACCESS_TOKEN);
        self.store.remove(store::TOKEN_TYPE);
        self.store.remove(store::SESSION_ID);
    }
}
