use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::error::VaultError;

pub const DEFAULT_BUCKET: &str = "datasets";

/// One listing entry under a prefix. Folder entries carry no extension;
/// callers distinguish by name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreEntry {
    pub name: String,
}

/// Bucket-scoped blob operations. Paths are caller-supplied strings already
/// scoped to a user namespace; authorization is the backing service's
/// concern, not this client's.
pub trait ObjectStore: Send + Sync {
    fn list(&self, prefix: &str) -> Result<Vec<StoreEntry>, VaultError>;
    fn upload(&self, path: &str, bytes: &[u8]) -> Result<String, VaultError>;
    fn download(&self, path: &str) -> Result<Vec<u8>, VaultError>;
    fn remove(&self, path: &str) -> Result<(), VaultError>;
}

#[derive(Clone)]
pub struct SupabaseStorageClient {
    client: Client,
    base_url: String,
    bucket: String,
}

impl SupabaseStorageClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, VaultError> {
        Self::with_bucket(base_url, api_key, DEFAULT_BUCKET)
    }

    pub fn with_bucket(base_url: &str, api_key: &str, bucket: &str) -> Result<Self, VaultError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("datavault/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| VaultError::StorageHttp(err.to_string()))?,
        );
        headers.insert(
            "apikey",
            HeaderValue::from_str(api_key).map_err(|err| VaultError::StorageHttp(err.to_string()))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|err| VaultError::StorageHttp(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| VaultError::StorageHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url, self.bucket, path
        )
    }

    fn status_error(response: reqwest::blocking::Response) -> VaultError {
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "storage request failed".to_string());
        VaultError::StorageStatus { status, message }
    }
}

impl ObjectStore for SupabaseStorageClient {
    fn list(&self, prefix: &str) -> Result<Vec<StoreEntry>, VaultError> {
        let url = format!("{}/storage/v1/object/list/{}", self.base_url, self.bucket);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "prefix": prefix,
                "limit": 1000,
                "offset": 0,
            }))
            .send()
            .map_err(|err| VaultError::StorageHttp(err.to_string()))?;

        // a missing prefix lists as empty, never as an error
        if response.status().as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(Self::status_error(response));
        }
        response
            .json::<Vec<StoreEntry>>()
            .map_err(|err| VaultError::StorageHttp(err.to_string()))
    }

    fn upload(&self, path: &str, bytes: &[u8]) -> Result<String, VaultError> {
        let response = self
            .client
            .post(self.object_url(path))
            .header(CONTENT_TYPE, "text/csv")
            .body(bytes.to_vec())
            .send()
            .map_err(|err| VaultError::StorageHttp(err.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::status_error(response));
        }
        Ok(path.to_string())
    }

    fn download(&self, path: &str) -> Result<Vec<u8>, VaultError> {
        let response = self
            .client
            .get(self.object_url(path))
            .send()
            .map_err(|err| VaultError::StorageHttp(err.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::status_error(response));
        }
        let bytes = response
            .bytes()
            .map_err(|err| VaultError::StorageHttp(err.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn remove(&self, path: &str) -> Result<(), VaultError> {
        let response = self
            .client
            .delete(self.object_url(path))
            .send()
            .map_err(|err| VaultError::StorageHttp(err.to_string()))?;
        // removing an object that is not there is success; overwrite stays
        // idempotent without a pre-check
        if matches!(response.status().as_u16(), 400 | 404) {
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(Self::status_error(response));
        }
        Ok(())
    }
}
