use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum VaultError {
    #[error("invalid dataset name: {0}")]
    InvalidDatasetName(String),

    #[error("invalid subdomain: {0}")]
    InvalidSubdomain(String),

    #[error("subdomain already taken: {0}")]
    SubdomainTaken(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("not signed in")]
    SessionMissing,

    #[error("identity service request failed: {0}")]
    AuthHttp(String),

    #[error("identity service returned status {status}: {message}")]
    AuthStatus { status: u16, message: String },

    #[error("storage request failed: {0}")]
    StorageHttp(String),

    #[error("storage returned status {status}: {message}")]
    StorageStatus { status: u16, message: String },

    #[error("settings request failed: {0}")]
    SettingsHttp(String),

    #[error("settings store returned status {status}: {message}")]
    SettingsStatus { status: u16, message: String },

    #[error("dataset provider request failed: {0}")]
    KaggleHttp(String),

    #[error("dataset provider returned status {status}: {message}")]
    KaggleStatus { status: u16, message: String },

    #[error("could not connect to API: {0}")]
    BackendUnreachable(String),

    #[error("API returned status {status}: {message}")]
    BackendStatus { status: u16, message: String },

    #[error("failed to load dataset; attempted:\n{}", format_attempts(.attempts))]
    DecodeExhausted { attempts: Vec<String> },

    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("failed to read credentials file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse credentials file: {0}")]
    ConfigParse(String),

    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("no CSV files found in downloaded dataset: {0}")]
    NoCsvInDataset(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

fn format_attempts(attempts: &[String]) -> String {
    attempts
        .iter()
        .map(|attempt| format!("- {attempt}"))
        .collect::<Vec<_>>()
        .join("\n")
}
