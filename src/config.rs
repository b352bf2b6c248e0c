use std::fs;
use std::path::PathBuf;

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::VaultError;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";

/// On-disk credentials file, all fields optional. Environment variables fill
/// anything the file leaves out.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CredentialsFile {
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub store_url: Option<String>,
    #[serde(default)]
    pub store_key: Option<String>,
    #[serde(default)]
    pub kaggle: Option<KaggleCredentials>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KaggleCredentials {
    pub username: String,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_base_url: String,
    pub store_url: Option<String>,
    pub store_key: Option<String>,
    pub kaggle: Option<KaggleCredentials>,
}

impl Credentials {
    /// Backing-store URL and key, or an error naming what is missing.
    pub fn store(&self) -> Result<(&str, &str), VaultError> {
        let url = self
            .store_url
            .as_deref()
            .ok_or_else(|| VaultError::MissingCredentials("store_url".to_string()))?;
        let key = self
            .store_key
            .as_deref()
            .ok_or_else(|| VaultError::MissingCredentials("store_key".to_string()))?;
        Ok((url, key))
    }
}

pub struct CredentialsLoader;

impl CredentialsLoader {
    /// Resolve credentials from an explicit file, the default file location,
    /// and the environment, in that order of precedence per field.
    pub fn resolve(path: Option<&str>) -> Result<Credentials, VaultError> {
        let file = match path {
            Some(path) => {
                let path = PathBuf::from(path);
                let content =
                    fs::read_to_string(&path).map_err(|_| VaultError::ConfigRead(path.clone()))?;
                serde_json::from_str(&content)
                    .map_err(|err| VaultError::ConfigParse(err.to_string()))?
            }
            None => match Self::default_path() {
                Some(path) if path.exists() => {
                    let content = fs::read_to_string(&path)
                        .map_err(|_| VaultError::ConfigRead(path.clone()))?;
                    serde_json::from_str(&content)
                        .map_err(|err| VaultError::ConfigParse(err.to_string()))?
                }
                _ => CredentialsFile::default(),
            },
        };

        Ok(Self::resolve_file(file))
    }

    pub fn resolve_file(file: CredentialsFile) -> Credentials {
        let env = |name: &str| std::env::var(name).ok().filter(|value| !value.is_empty());

        let kaggle = file.kaggle.or_else(|| {
            match (env("KAGGLE_USERNAME"), env("KAGGLE_KEY")) {
                (Some(username), Some(key)) => Some(KaggleCredentials { username, key }),
                _ => None,
            }
        });

        Credentials {
            api_base_url: file
                .api_base_url
                .or_else(|| env("DATAVAULT_API_BASE_URL"))
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            store_url: file.store_url.or_else(|| env("DATAVAULT_STORE_URL")),
            store_key: file.store_key.or_else(|| env("DATAVAULT_STORE_KEY")),
            kaggle,
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| {
            dirs.home_dir()
                .join(".config")
                .join("datavault")
                .join("credentials.json")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_fields_win_over_defaults() {
        let file = CredentialsFile {
            api_base_url: Some("https://api.example.com".to_string()),
            store_url: Some("https://store.example.com".to_string()),
            store_key: Some("anon-key".to_string()),
            kaggle: Some(KaggleCredentials {
                username: "alice".to_string(),
                key: "k".to_string(),
            }),
        };

        let resolved = CredentialsLoader::resolve_file(file);
        assert_eq!(resolved.api_base_url, "https://api.example.com");
        assert_eq!(resolved.store().unwrap().0, "https://store.example.com");
        assert_eq!(resolved.kaggle.unwrap().username, "alice");
    }

    #[test]
    fn missing_store_is_reported_by_field() {
        let resolved = Credentials {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            store_url: None,
            store_key: None,
            kaggle: None,
        };
        let err = resolved.store().unwrap_err();
        assert!(err.to_string().contains("store_url"));
    }
}
