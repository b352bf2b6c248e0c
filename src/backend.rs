use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;

use crate::domain::UserId;
use crate::error::VaultError;

pub const UNREACHABLE_MESSAGE: &str =
    "Could not connect to API. Make sure the API server is running and accessible.";

/// Outcome of a dataset-scoped API call. Rejections come back as data, not
/// errors, so the presentation layer can render them inline; an unreachable
/// service is kept distinct from a rejecting one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiReply {
    Success(Value),
    Rejected(String),
    Unreachable(String),
}

impl ApiReply {
    /// JSON projection: success payload as-is, failures as `{"error": ...}`.
    pub fn to_value(&self) -> Value {
        match self {
            ApiReply::Success(value) => value.clone(),
            ApiReply::Rejected(message) | ApiReply::Unreachable(message) => {
                serde_json::json!({ "error": message })
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ApiReply::Success(_))
    }
}

/// API key as minted by the backend; shown once, never stored client-side.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyGrant {
    pub api_key: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiDocs {
    pub base_url: String,
    pub authentication: DocsAuth,
    pub endpoints: BTreeMap<String, DocsEndpoint>,
    #[serde(default)]
    pub available_datasets: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocsAuth {
    #[serde(rename = "type")]
    pub auth_type: String,
    pub header: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocsEndpoint {
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub example: String,
}

pub trait BackendClient: Send + Sync {
    fn data_summary(&self, bucket_path: &str, api_key: &str) -> ApiReply;
    fn data_stats(&self, bucket_path: &str, api_key: &str) -> ApiReply;
    fn data_head(&self, bucket_path: &str, api_key: &str, n: usize) -> ApiReply;
    fn generate_key(&self, access_token: &str) -> Result<ApiKeyGrant, VaultError>;
    fn docs(&self, user: &UserId) -> Result<ApiDocs, VaultError>;
}

#[derive(Clone)]
pub struct BackendHttpClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

impl BackendHttpClient {
    pub fn new(base_url: &str) -> Result<Self, VaultError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("datavault/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| VaultError::BackendUnreachable(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| VaultError::BackendUnreachable(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn data_call(&self, endpoint: &str, bucket_path: &str, api_key: &str, extra: &[(&str, String)]) -> ApiReply {
        let url = format!("{}/api{endpoint}", self.base_url);
        let mut request = self
            .client
            .get(&url)
            .query(&[("bucket_path", bucket_path)])
            .header("X-API-Key", api_key);
        for (name, value) in extra {
            request = request.query(&[(*name, value.as_str())]);
        }

        let response = match request.send() {
            Ok(response) => response,
            Err(err) if err.is_connect() || err.is_timeout() => {
                return ApiReply::Unreachable(UNREACHABLE_MESSAGE.to_string());
            }
            Err(err) => return ApiReply::Rejected(err.to_string()),
        };

        let status = response.status();
        if status.is_success() {
            match response.json::<Value>() {
                Ok(value) => ApiReply::Success(value),
                Err(err) => ApiReply::Rejected(err.to_string()),
            }
        } else {
            let message = response
                .json::<ErrorBody>()
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| {
                    format!("API call failed with status code {}", status.as_u16())
                });
            ApiReply::Rejected(message)
        }
    }
}

impl BackendClient for BackendHttpClient {
    fn data_summary(&self, bucket_path: &str, api_key: &str) -> ApiReply {
        self.data_call("/data/summary", bucket_path, api_key, &[])
    }

    fn data_stats(&self, bucket_path: &str, api_key: &str) -> ApiReply {
        self.data_call("/data/stats", bucket_path, api_key, &[])
    }

    fn data_head(&self, bucket_path: &str, api_key: &str, n: usize) -> ApiReply {
        self.data_call("/data/head", bucket_path, api_key, &[("n", n.to_string())])
    }

    fn generate_key(&self, access_token: &str) -> Result<ApiKeyGrant, VaultError> {
        let url = format!("{}/api/generate-key", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .send()
            .map_err(|err| VaultError::BackendUnreachable(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| "key generation rejected".to_string());
            return Err(VaultError::BackendStatus {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<ApiKeyGrant>()
            .map_err(|err| VaultError::BackendUnreachable(err.to_string()))
    }

    fn docs(&self, user: &UserId) -> Result<ApiDocs, VaultError> {
        let url = format!("{}/api/docs/{}", self.base_url, user);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| VaultError::BackendUnreachable(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "documentation request rejected".to_string());
            return Err(VaultError::BackendStatus {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<ApiDocs>()
            .map_err(|err| VaultError::BackendUnreachable(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_projection() {
        let ok = ApiReply::Success(serde_json::json!({"rows": 3}));
        assert_eq!(ok.to_value()["rows"], 3);

        let rejected = ApiReply::Rejected("bad key".to_string());
        assert_eq!(rejected.to_value()["error"], "bad key");
        assert!(!rejected.is_success());

        let unreachable = ApiReply::Unreachable(UNREACHABLE_MESSAGE.to_string());
        assert_eq!(unreachable.to_value()["error"], UNREACHABLE_MESSAGE);
    }
}
