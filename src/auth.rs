use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::domain::UserId;
use crate::error::VaultError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
}

/// Tokens plus identity as returned by the identity provider. This is the
/// provider's security session, distinct from the application `Session`.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub user: AuthUser,
}

pub trait IdentityClient: Send + Sync {
    fn sign_in_with_password(&self, email: &str, password: &str)
    -> Result<AuthSession, VaultError>;
    fn sign_up(&self, email: &str, password: &str) -> Result<(), VaultError>;
    /// OAuth entry point: the provider's authorize URL for the user to open
    /// in a browser.
    fn authorize_url(&self, provider: &str) -> String;
    fn current_user(&self, access_token: &str) -> Result<AuthUser, VaultError>;
    fn refresh(&self, refresh_token: &str) -> Result<AuthSession, VaultError>;
    fn sign_out(&self, access_token: &str) -> Result<(), VaultError>;
}

#[derive(Clone)]
pub struct SupabaseAuthClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    user: UserPayload,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl SupabaseAuthClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, VaultError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("datavault/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| VaultError::AuthHttp(err.to_string()))?,
        );
        headers.insert(
            "apikey",
            HeaderValue::from_str(api_key).map_err(|err| VaultError::AuthHttp(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| VaultError::AuthHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn auth_failure(response: reqwest::blocking::Response) -> VaultError {
        let status = response.status().as_u16();
        let message = response
            .json::<ErrorPayload>()
            .ok()
            .and_then(|payload| payload.error_description.or(payload.msg).or(payload.error))
            .unwrap_or_else(|| "request rejected".to_string());
        match status {
            400 | 401 | 403 | 422 => VaultError::AuthFailed(message),
            _ => VaultError::AuthStatus { status, message },
        }
    }

    fn parse_session(response: reqwest::blocking::Response) -> Result<AuthSession, VaultError> {
        let payload = response
            .json::<TokenResponse>()
            .map_err(|err| VaultError::AuthHttp(err.to_string()))?;
        Ok(AuthSession {
            access_token: payload.access_token,
            refresh_token: payload.refresh_token,
            user: AuthUser {
                id: payload.user.id.parse()?,
                email: payload.user.email.unwrap_or_default(),
            },
        })
    }
}

impl IdentityClient for SupabaseAuthClient {
    fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, VaultError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .map_err(|err| VaultError::AuthHttp(err.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::auth_failure(response));
        }
        Self::parse_session(response)
    }

    fn sign_up(&self, email: &str, password: &str) -> Result<(), VaultError> {
        let url = format!("{}/auth/v1/signup", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .map_err(|err| VaultError::AuthHttp(err.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::auth_failure(response));
        }
        Ok(())
    }

    fn authorize_url(&self, provider: &str) -> String {
        format!("{}/auth/v1/authorize?provider={provider}", self.base_url)
    }

    fn current_user(&self, access_token: &str) -> Result<AuthUser, VaultError> {
        let url = format!("{}/auth/v1/user", self.base_url);
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .send()
            .map_err(|err| VaultError::AuthHttp(err.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::auth_failure(response));
        }
        let payload = response
            .json::<UserPayload>()
            .map_err(|err| VaultError::AuthHttp(err.to_string()))?;
        Ok(AuthUser {
            id: payload.id.parse()?,
            email: payload.email.unwrap_or_default(),
        })
    }

    fn refresh(&self, refresh_token: &str) -> Result<AuthSession, VaultError> {
        let url = format!("{}/auth/v1/token?grant_type=refresh_token", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .map_err(|err| VaultError::AuthHttp(err.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::auth_failure(response));
        }
        Self::parse_session(response)
    }

    fn sign_out(&self, access_token: &str) -> Result<(), VaultError> {
        let url = format!("{}/auth/v1/logout", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .send()
            .map_err(|err| VaultError::AuthHttp(err.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::auth_failure(response));
        }
        Ok(())
    }
}
