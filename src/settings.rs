use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::UserId;
use crate::error::VaultError;

/// Row key within the per-user settings table; one row per (user, type).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingType {
    Kaggle,
    ApiConfig,
}

impl SettingType {
    pub fn as_str(self) -> &'static str {
        match self {
            SettingType::Kaggle => "kaggle",
            SettingType::ApiConfig => "api_config",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KaggleSettings {
    pub username: String,
    pub key: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfigSettings {
    pub subdomain: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

pub trait SettingsClient: Send + Sync {
    fn get(&self, user: &UserId, setting_type: SettingType) -> Result<Option<Value>, VaultError>;
    fn upsert(
        &self,
        user: &UserId,
        setting_type: SettingType,
        settings: Value,
    ) -> Result<(), VaultError>;
    fn delete(&self, user: &UserId, setting_type: SettingType) -> Result<(), VaultError>;
    /// Whether another user already claimed this subdomain.
    fn subdomain_taken(&self, subdomain: &str, requesting_user: &UserId)
    -> Result<bool, VaultError>;
}

/// Lowercase letters, digits, hyphens; leading letter; 3-20 characters.
pub fn validate_subdomain(subdomain: &str) -> Result<(), VaultError> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9-]{2,19}$").unwrap());
    if pattern.is_match(subdomain) {
        Ok(())
    } else {
        Err(VaultError::InvalidSubdomain(subdomain.to_string()))
    }
}

#[derive(Clone)]
pub struct SupabaseSettingsClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SettingsRow {
    settings: Value,
}

impl SupabaseSettingsClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, VaultError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("datavault/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| VaultError::SettingsHttp(err.to_string()))?,
        );
        headers.insert(
            "apikey",
            HeaderValue::from_str(api_key)
                .map_err(|err| VaultError::SettingsHttp(err.to_string()))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|err| VaultError::SettingsHttp(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| VaultError::SettingsHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/user_settings", self.base_url)
    }

    fn status_error(response: reqwest::blocking::Response) -> VaultError {
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "settings request failed".to_string());
        VaultError::SettingsStatus { status, message }
    }
}

impl SettingsClient for SupabaseSettingsClient {
    fn get(&self, user: &UserId, setting_type: SettingType) -> Result<Option<Value>, VaultError> {
        let response = self
            .client
            .get(self.table_url())
            .query(&[
                ("user_id", format!("eq.{user}")),
                ("setting_type", format!("eq.{}", setting_type.as_str())),
                ("select", "settings".to_string()),
            ])
            .send()
            .map_err(|err| VaultError::SettingsHttp(err.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::status_error(response));
        }
        let mut rows = response
            .json::<Vec<SettingsRow>>()
            .map_err(|err| VaultError::SettingsHttp(err.to_string()))?;
        Ok(rows.pop().map(|row| row.settings))
    }

    fn upsert(
        &self,
        user: &UserId,
        setting_type: SettingType,
        settings: Value,
    ) -> Result<(), VaultError> {
        let response = self
            .client
            .post(self.table_url())
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&serde_json::json!({
                "user_id": user.as_str(),
                "setting_type": setting_type.as_str(),
                "settings": settings,
            }))
            .send()
            .map_err(|err| VaultError::SettingsHttp(err.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::status_error(response));
        }
        Ok(())
    }

    fn delete(&self, user: &UserId, setting_type: SettingType) -> Result<(), VaultError> {
        let response = self
            .client
            .delete(self.table_url())
            .query(&[
                ("user_id", format!("eq.{user}")),
                ("setting_type", format!("eq.{}", setting_type.as_str())),
            ])
            .send()
            .map_err(|err| VaultError::SettingsHttp(err.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::status_error(response));
        }
        Ok(())
    }

    fn subdomain_taken(
        &self,
        subdomain: &str,
        requesting_user: &UserId,
    ) -> Result<bool, VaultError> {
        let response = self
            .client
            .get(self.table_url())
            .query(&[
                ("settings->>subdomain", format!("eq.{subdomain}")),
                ("user_id", format!("neq.{requesting_user}")),
                ("select", "user_id".to_string()),
            ])
            .send()
            .map_err(|err| VaultError::SettingsHttp(err.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::status_error(response));
        }
        let rows = response
            .json::<Vec<Value>>()
            .map_err(|err| VaultError::SettingsHttp(err.to_string()))?;
        Ok(!rows.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn subdomain_validation() {
        assert!(validate_subdomain("myapi").is_ok());
        assert!(validate_subdomain("a2-b").is_ok());
        assert_matches!(
            validate_subdomain("My-Api").unwrap_err(),
            VaultError::InvalidSubdomain(_)
        );
        assert_matches!(
            validate_subdomain("2api").unwrap_err(),
            VaultError::InvalidSubdomain(_)
        );
        assert_matches!(
            validate_subdomain("ab").unwrap_err(),
            VaultError::InvalidSubdomain(_)
        );
        assert_matches!(
            validate_subdomain("a-very-long-subdomain-name").unwrap_err(),
            VaultError::InvalidSubdomain(_)
        );
    }

    #[test]
    fn setting_type_row_keys() {
        assert_eq!(SettingType::Kaggle.as_str(), "kaggle");
        assert_eq!(SettingType::ApiConfig.as_str(), "api_config");
    }
}
