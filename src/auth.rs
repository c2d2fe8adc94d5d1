use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::{ApiClient, SubmissionError};
use crate::storage::{load_json, save_json, ACCESS_TOKEN_KEY, AUTH_USER_KEY};

/// Signed-in user as kept in the store.
///
/// `name` and `full_name` are both filled from whichever of `full_name`,
/// `fullName` or `name` the backend sent. Every other key the backend sent,
/// `full_name` included, is kept as is.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "fullName")]
    pub full_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthUser {
    pub fn normalize(raw: &Value) -> Self {
        let text = |key: &str| {
            raw.get(key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        let display = text("full_name")
            .or_else(|| text("fullName"))
            .or_else(|| text("name"))
            .unwrap_or_default();

        let mut extra = raw.as_object().cloned().unwrap_or_default();
        for key in ["email", "name", "fullName"] {
            extra.remove(key);
        }

        Self {
            email: text("email").unwrap_or_default(),
            name: display.clone(),
            full_name: display,
            extra,
        }
    }
}

const RESET_REQUEST_FALLBACK: &str = "Unable to request password reset.";

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: String,
    user: Value,
}

#[derive(Debug, Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct SignUpRequest<'a> {
    full_name: &'a str,
    email: &'a str,
    password: &'a str,
    company_name: Option<&'a str>,
}

pub struct AuthClient {
    client: ApiClient,
}

impl AuthClient {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        load_json(self.client.store(), AUTH_USER_KEY)
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, SubmissionError> {
        let response: AuthResponse = self
            .client
            .post_json("/api/v1/auth/sign-in", &SignInRequest { email, password }, None)
            .map_err(|e| SubmissionError::from_api(&e, "Unable to sign in."))?;

        let user = self.persist_session(response)?;
        tracing::info!(email = %user.email, "Signed in");
        Ok(user)
    }

    pub fn sign_up(&self, full_name: &str, email: &str, password: &str) -> Result<AuthUser, SubmissionError> {
        let request = SignUpRequest {
            full_name,
            email,
            password,
            company_name: None,
        };
        let response: AuthResponse = self
            .client
            .post_json("/api/v1/auth/sign-up", &request, None)
            .map_err(|e| SubmissionError::from_api(&e, "Unable to create account."))?;

        let user = self.persist_session(response)?;
        tracing::info!(email = %user.email, "Account created");
        Ok(user)
    }

    /// Re-validate the stored session against the backend.
    ///
    /// Any failure, including a missing token, clears the stored session.
    pub fn check_profile(&self) -> Result<AuthUser, SubmissionError> {
        let token = self.client.store().get(ACCESS_TOKEN_KEY).ok().flatten();
        let saved = self.current_user().filter(|u| !u.email.is_empty());

        let (Some(_), Some(saved)) = (token, saved) else {
            self.sign_out();
            return Err(SubmissionError::new("Not signed in."));
        };

        let query = [("email", saved.email.clone())];
        match self.client.get_json::<Value>("/api/v1/auth/profile", &query) {
            Ok(raw) => {
                let user = AuthUser::normalize(&raw);
                save_json(self.client.store(), AUTH_USER_KEY, &user)
                    .map_err(|e| SubmissionError::new(e.to_string()))?;
                Ok(user)
            }
            Err(e) => {
                self.sign_out();
                Err(SubmissionError::from_api(&e, "Session expired."))
            }
        }
    }

    /// Returns the backend's confirmation message.
    pub fn forgot_password(&self, email: &str) -> Result<String, SubmissionError> {
        let body = serde_json::json!({ "email": email });
        let response: Value = self
            .client
            .post_json("/api/v1/auth/forgot-password", &body, None)
            .map_err(|e| SubmissionError::from_api(&e, RESET_REQUEST_FALLBACK))?;
        Ok(confirmation(&response, "Password reset instructions sent."))
    }

    pub fn reset_password(&self, token: &str, new_password: &str) -> Result<String, SubmissionError> {
        let body = serde_json::json!({ "token": token, "new_password": new_password });
        let response: Value = self
            .client
            .post_json("/api/v1/auth/reset-password", &body, None)
            .map_err(|e| SubmissionError::from_api(&e, "Unable to reset password."))?;
        Ok(confirmation(&response, "Password has been reset."))
    }

    pub fn sign_out(&self) {
        let store = self.client.store();
        for key in [ACCESS_TOKEN_KEY, AUTH_USER_KEY] {
            if let Err(e) = store.remove(key) {
                tracing::warn!(key = %key, error = %e, "Failed to clear session key");
            }
        }
    }

    fn persist_session(&self, response: AuthResponse) -> Result<AuthUser, SubmissionError> {
        let user = AuthUser::normalize(&response.user);
        let store = self.client.store();

        store
            .set(ACCESS_TOKEN_KEY, &response.access_token)
            .and_then(|_| save_json(store, AUTH_USER_KEY, &user))
            .map_err(|e| SubmissionError::new(format!("Failed to save session: {}", e)))?;

        Ok(user)
    }
}

fn confirmation(response: &Value, fallback: &str) -> String {
    response
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or(fallback)
        .to_string()
}
