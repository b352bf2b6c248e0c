use std::fs::File;
use std::path::Path;
use std::time::Duration;

use camino::Utf8PathBuf;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::config::KaggleCredentials;
use crate::domain::DatasetName;
use crate::error::VaultError;

/// Third-party dataset-hosting provider: authenticate, then fetch and unpack
/// a named dataset archive to local disk. Credentials are resolved per call
/// so they can come from the settings store as well as local config.
pub trait DatasetProvider: Send + Sync {
    /// Download the dataset archive and unpack it into `destination`,
    /// returning the unpacked file paths.
    fn download_dataset(
        &self,
        credentials: &KaggleCredentials,
        name: &DatasetName,
        destination: &Path,
    ) -> Result<Vec<Utf8PathBuf>, VaultError>;
}

#[derive(Clone)]
pub struct KaggleHttpClient {
    client: Client,
    base_url: String,
}

impl KaggleHttpClient {
    pub fn new() -> Result<Self, VaultError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("datavault/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| VaultError::KaggleHttp(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|err| VaultError::KaggleHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: "https://www.kaggle.com/api/v1".to_string(),
        })
    }

}

impl DatasetProvider for KaggleHttpClient {
    fn download_dataset(
        &self,
        credentials: &KaggleCredentials,
        name: &DatasetName,
        destination: &Path,
    ) -> Result<Vec<Utf8PathBuf>, VaultError> {
        let url = format!("{}/datasets/download/{}", self.base_url, name.as_str());
        debug!(dataset = %name, "requesting dataset archive");

        let mut response = self
            .client
            .get(&url)
            .basic_auth(&credentials.username, Some(&credentials.key))
            .send()
            .map_err(|err| VaultError::KaggleHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "dataset download failed".to_string());
            return Err(VaultError::KaggleStatus { status, message });
        }

        let archive_path = destination.join("dataset.zip");
        let mut file =
            File::create(&archive_path).map_err(|err| VaultError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| VaultError::Filesystem(err.to_string()))?;

        crate::fs_util::validate_zip(&archive_path)?;
        let extracted = crate::fs_util::extract_zip(&archive_path, destination)?;
        std::fs::remove_file(&archive_path)
            .map_err(|err| VaultError::Filesystem(err.to_string()))?;
        debug!(files = extracted.len(), "dataset archive unpacked");
        Ok(extracted)
    }
}
