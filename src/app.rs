use std::fs;
use std::path::Path;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::debug;

use crate::auth::{AuthUser, IdentityClient};
use crate::backend::{ApiDocs, ApiKeyGrant, ApiReply, BackendClient};
use crate::config::KaggleCredentials;
use crate::domain::{DatasetEntry, DatasetName, DatasetSlug, UserId};
use crate::error::VaultError;
use crate::kaggle::DatasetProvider;
use crate::loader::{DatasetLoader, LoadedTable};
use crate::settings::{ApiConfigSettings, KaggleSettings, SettingType, SettingsClient};
use crate::storage::{ObjectStore, StoreEntry};

/// Canonical cleaned-CSV filename preferred when a dataset ships several
/// files.
pub const PREFERRED_FILE: &str = "scrubbed.csv";

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Steps of one acquisition request. `CacheHit` short-circuits to
/// `LoadRemote`; every step can fail into a user-visible error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquirePhase {
    Idle,
    CheckCache,
    FetchExternal,
    NormalizeLocalFile,
    StoreRemote,
    LoadRemote,
}

impl AcquirePhase {
    pub fn label(self) -> &'static str {
        match self {
            AcquirePhase::Idle => "Idle",
            AcquirePhase::CheckCache => "CheckCache",
            AcquirePhase::FetchExternal => "FetchExternal",
            AcquirePhase::NormalizeLocalFile => "NormalizeLocalFile",
            AcquirePhase::StoreRemote => "StoreRemote",
            AcquirePhase::LoadRemote => "LoadRemote",
        }
    }

    pub fn index(self) -> usize {
        match self {
            AcquirePhase::Idle => 0,
            AcquirePhase::CheckCache => 1,
            AcquirePhase::FetchExternal => 2,
            AcquirePhase::NormalizeLocalFile => 3,
            AcquirePhase::StoreRemote => 4,
            AcquirePhase::LoadRemote => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AcquireOptions {
    /// Skip the cache check and re-download from the provider.
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcquireResult {
    pub dataset: String,
    pub bucket_path: String,
    /// "cache" when the blob was already stored, "download" otherwise.
    pub action: String,
    pub strategy: String,
    pub rows: usize,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Welcome,
    Login,
    Register,
    Explorer,
    Visualize,
    ApiKeys,
    Settings,
}

/// Per-connection application state. Created once by `Session::new`, mutated
/// only through `App::dispatch`, reset wholesale on logout. Never persisted.
#[derive(Debug, Default)]
pub struct Session {
    pub authenticated: bool,
    pub user: Option<AuthUser>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub page: Page,
    /// Blob path of the currently loaded dataset.
    pub current_dataset: Option<String>,
    pub table: Option<LoadedTable>,
    /// Last generated API key, kept only for this session's example calls.
    pub api_key: Option<String>,
    pub summary_response: Option<ApiReply>,
    pub stats_response: Option<ApiReply>,
    pub head_response: Option<ApiReply>,
    pub status: Option<String>,
}

impl Default for Page {
    fn default() -> Self {
        Page::Welcome
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_id(&self) -> Result<UserId, VaultError> {
        self.user
            .as_ref()
            .map(|user| user.id.clone())
            .ok_or(VaultError::SessionMissing)
    }

    pub fn access_token(&self) -> Result<&str, VaultError> {
        self.access_token
            .as_deref()
            .ok_or(VaultError::SessionMissing)
    }
}

/// Every user interaction, as data. One handler per variant in
/// `App::dispatch`; rendering never mutates state.
#[derive(Debug, Clone)]
pub enum Action {
    LogIn { email: String, password: String },
    OAuthLogIn { provider: String },
    Register { email: String, password: String },
    LogOut,
    GoTo(Page),
    Acquire { dataset: DatasetName, force: bool },
    LoadStored { path: String },
    ListDatasets,
    GenerateKey,
    FetchDocs,
    FetchSummary,
    FetchStats,
    FetchHead { n: usize },
    SaveKaggleSettings { username: String, key: String },
    DeleteKaggleSettings,
    SaveSubdomain { subdomain: String },
    DeleteSubdomain,
}

#[derive(Debug)]
pub enum ActionOutcome {
    None,
    Message(String),
    /// URL the user should open in a browser (OAuth sign-in).
    BrowseUrl(String),
    Acquired(AcquireResult),
    Datasets(Vec<DatasetEntry>),
    Reply(ApiReply),
    KeyGranted(ApiKeyGrant),
    Docs(ApiDocs),
}

#[derive(Clone)]
pub struct App<P, S, I, C, B>
where
    P: DatasetProvider,
    S: ObjectStore,
    I: IdentityClient,
    C: SettingsClient,
    B: BackendClient,
{
    provider: P,
    store: S,
    identity: I,
    settings: C,
    backend: B,
    /// Provider credentials from local config; the settings store is
    /// consulted per user when these are absent.
    kaggle_credentials: Option<KaggleCredentials>,
}

impl<P, S, I, C, B> App<P, S, I, C, B>
where
    P: DatasetProvider,
    S: ObjectStore,
    I: IdentityClient,
    C: SettingsClient,
    B: BackendClient,
{
    pub fn new(provider: P, store: S, identity: I, settings: C, backend: B) -> Self {
        Self {
            provider,
            store,
            identity,
            settings,
            backend,
            kaggle_credentials: None,
        }
    }

    pub fn with_kaggle_credentials(mut self, credentials: Option<KaggleCredentials>) -> Self {
        self.kaggle_credentials = credentials;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Apply one user action to the session. All client errors surface here
    /// and are rendered by the caller; none are fatal to the session.
    pub fn dispatch(
        &self,
        session: &mut Session,
        action: Action,
        sink: &dyn ProgressSink,
    ) -> Result<ActionOutcome, VaultError> {
        match action {
            Action::LogIn { email, password } => {
                let auth = self.identity.sign_in_with_password(&email, &password)?;
                session.authenticated = true;
                session.user = Some(auth.user);
                session.access_token = Some(auth.access_token);
                session.refresh_token = Some(auth.refresh_token);
                session.page = Page::Explorer;
                Ok(ActionOutcome::None)
            }
            Action::OAuthLogIn { provider } => {
                Ok(ActionOutcome::BrowseUrl(self.identity.authorize_url(&provider)))
            }
            Action::Register { email, password } => {
                self.identity.sign_up(&email, &password)?;
                session.page = Page::Login;
                Ok(ActionOutcome::Message(
                    "Registration successful! Check your email to verify your account."
                        .to_string(),
                ))
            }
            Action::LogOut => {
                if let Some(token) = session.access_token.take() {
                    self.identity.sign_out(&token)?;
                }
                *session = Session::new();
                Ok(ActionOutcome::None)
            }
            Action::GoTo(page) => {
                session.page = page;
                Ok(ActionOutcome::None)
            }
            Action::Acquire { dataset, force } => {
                let user = session.user_id()?;
                let (result, loaded) =
                    self.acquire(&user, &dataset, AcquireOptions { force }, sink)?;
                session.current_dataset = Some(result.bucket_path.clone());
                session.table = Some(loaded);
                session.summary_response = None;
                session.stats_response = None;
                session.head_response = None;
                Ok(ActionOutcome::Acquired(result))
            }
            Action::LoadStored { path } => {
                session.user_id()?;
                let loaded = self.load_stored(&path, sink)?;
                let result = AcquireResult {
                    dataset: path.clone(),
                    bucket_path: path.clone(),
                    action: "load".to_string(),
                    strategy: loaded.strategy.describe(),
                    rows: loaded.table.row_count(),
                    columns: loaded.table.columns.clone(),
                };
                session.current_dataset = Some(path);
                session.table = Some(loaded);
                session.summary_response = None;
                session.stats_response = None;
                session.head_response = None;
                Ok(ActionOutcome::Acquired(result))
            }
            Action::ListDatasets => {
                let user = session.user_id()?;
                Ok(ActionOutcome::Datasets(self.list_datasets(&user)?))
            }
            Action::GenerateKey => {
                let token = session.access_token()?.to_string();
                let grant = self.backend.generate_key(&token)?;
                session.api_key = Some(grant.api_key.clone());
                Ok(ActionOutcome::KeyGranted(grant))
            }
            Action::FetchDocs => {
                let user = session.user_id()?;
                Ok(ActionOutcome::Docs(self.backend.docs(&user)?))
            }
            Action::FetchSummary => {
                let reply = self.data_reply(session, |path, key| {
                    self.backend.data_summary(path, key)
                })?;
                session.summary_response = Some(reply.clone());
                Ok(ActionOutcome::Reply(reply))
            }
            Action::FetchStats => {
                let reply = self.data_reply(session, |path, key| {
                    self.backend.data_stats(path, key)
                })?;
                session.stats_response = Some(reply.clone());
                Ok(ActionOutcome::Reply(reply))
            }
            Action::FetchHead { n } => {
                let reply = self.data_reply(session, |path, key| {
                    self.backend.data_head(path, key, n)
                })?;
                session.head_response = Some(reply.clone());
                Ok(ActionOutcome::Reply(reply))
            }
            Action::SaveKaggleSettings { username, key } => {
                let user = session.user_id()?;
                self.save_kaggle_settings(&user, &username, &key)?;
                Ok(ActionOutcome::Message(
                    "Kaggle credentials saved.".to_string(),
                ))
            }
            Action::DeleteKaggleSettings => {
                let user = session.user_id()?;
                self.settings.delete(&user, SettingType::Kaggle)?;
                Ok(ActionOutcome::Message(
                    "Kaggle credentials deleted.".to_string(),
                ))
            }
            Action::SaveSubdomain { subdomain } => {
                let user = session.user_id()?;
                self.save_subdomain(&user, &subdomain)?;
                Ok(ActionOutcome::Message(format!(
                    "Subdomain {subdomain} saved."
                )))
            }
            Action::DeleteSubdomain => {
                let user = session.user_id()?;
                self.settings.delete(&user, SettingType::ApiConfig)?;
                Ok(ActionOutcome::Message("Subdomain deleted.".to_string()))
            }
        }
    }

    fn data_reply(
        &self,
        session: &mut Session,
        call: impl Fn(&str, &str) -> ApiReply,
    ) -> Result<ApiReply, VaultError> {
        let path = session
            .current_dataset
            .clone()
            .ok_or_else(|| VaultError::DatasetNotFound("no dataset loaded".to_string()))?;
        let Some(key) = session.api_key.clone() else {
            return Ok(ApiReply::Rejected(
                "Please generate an API key first.".to_string(),
            ));
        };
        Ok(call(&path, &key))
    }

    /// Run one acquisition request:
    /// CheckCache → (hit) LoadRemote, or
    /// FetchExternal → NormalizeLocalFile → StoreRemote → LoadRemote.
    pub fn acquire(
        &self,
        user: &UserId,
        dataset: &DatasetName,
        options: AcquireOptions,
        sink: &dyn ProgressSink,
    ) -> Result<(AcquireResult, LoadedTable), VaultError> {
        let slug = dataset.slug();
        let prefix = slug.prefix(user);

        sink.event(ProgressEvent {
            message: format!("phase={}; listing {prefix}", AcquirePhase::CheckCache.label()),
            elapsed: None,
        });
        if !options.force {
            let entries = self.store.list(&prefix)?;
            if let Some(entry) = cache_entry(&entries) {
                let bucket_path = slug.blob_path(user, &entry.name);
                sink.event(ProgressEvent {
                    message: format!("phase={}; dataset found in storage", AcquirePhase::LoadRemote.label()),
                    elapsed: None,
                });
                let loaded = self.load_stored(&bucket_path, sink)?;
                let result = AcquireResult {
                    dataset: dataset.to_string(),
                    bucket_path,
                    action: "cache".to_string(),
                    strategy: loaded.strategy.describe(),
                    rows: loaded.table.row_count(),
                    columns: loaded.table.columns.clone(),
                };
                return Ok((result, loaded));
            }
        }

        // temp dir is removed on drop, so local unpack artifacts are cleaned
        // up on every exit path
        let temp = tempfile::Builder::new()
            .prefix("datavault-fetch")
            .tempdir()
            .map_err(|err| VaultError::Filesystem(err.to_string()))?;
        let bucket_path = self.fetch_and_store(user, dataset, &slug, temp.path(), sink)?;

        sink.event(ProgressEvent {
            message: format!("phase={}; reading stored blob", AcquirePhase::LoadRemote.label()),
            elapsed: None,
        });
        let loaded = self.load_stored(&bucket_path, sink)?;
        let result = AcquireResult {
            dataset: dataset.to_string(),
            bucket_path,
            action: "download".to_string(),
            strategy: loaded.strategy.describe(),
            rows: loaded.table.row_count(),
            columns: loaded.table.columns.clone(),
        };
        Ok((result, loaded))
    }

    fn fetch_and_store(
        &self,
        user: &UserId,
        dataset: &DatasetName,
        slug: &DatasetSlug,
        scratch: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<String, VaultError> {
        sink.event(ProgressEvent {
            message: format!("phase={}; downloading {dataset}", AcquirePhase::FetchExternal.label()),
            elapsed: None,
        });
        let credentials = self.provider_credentials(user)?;
        let start = std::time::Instant::now();
        let files = self
            .provider
            .download_dataset(&credentials, dataset, scratch)?;
        sink.event(ProgressEvent {
            message: format!("provider.response latency_ms={}", start.elapsed().as_millis()),
            elapsed: None,
        });

        sink.event(ProgressEvent {
            message: format!("phase={}; selecting CSV", AcquirePhase::NormalizeLocalFile.label()),
            elapsed: None,
        });
        let csv_file =
            select_csv(&files).ok_or_else(|| VaultError::NoCsvInDataset(dataset.to_string()))?;
        let file_name = csv_file
            .file_name()
            .ok_or_else(|| VaultError::Filesystem("unnamed file in dataset".to_string()))?;

        sink.event(ProgressEvent {
            message: format!("phase={}; uploading {file_name}", AcquirePhase::StoreRemote.label()),
            elapsed: None,
        });
        let bucket_path = slug.blob_path(user, file_name);
        debug!(path = %bucket_path, "storing dataset blob");
        // idempotent overwrite: drop any existing blob before uploading
        self.store.remove(&bucket_path)?;
        let bytes =
            fs::read(csv_file).map_err(|err| VaultError::Filesystem(err.to_string()))?;
        self.store.upload(&bucket_path, &bytes)?;
        Ok(bucket_path)
    }

    /// Local config wins; otherwise the user's stored Kaggle settings are
    /// fetched, matching how the settings page feeds later downloads.
    fn provider_credentials(&self, user: &UserId) -> Result<KaggleCredentials, VaultError> {
        if let Some(credentials) = &self.kaggle_credentials {
            return Ok(credentials.clone());
        }
        self.kaggle_settings(user)?
            .map(|settings| KaggleCredentials {
                username: settings.username,
                key: settings.key,
            })
            .ok_or_else(|| {
                VaultError::MissingCredentials(
                    "Kaggle credentials not found. Please configure them in the Settings page first."
                        .to_string(),
                )
            })
    }

    /// Download a stored blob and decode it into a table.
    pub fn load_stored(
        &self,
        bucket_path: &str,
        sink: &dyn ProgressSink,
    ) -> Result<LoadedTable, VaultError> {
        sink.event(ProgressEvent {
            message: format!("storage.download {bucket_path}"),
            elapsed: None,
        });
        let bytes = self.store.download(bucket_path)?;
        let loaded = DatasetLoader::new().load(&bytes)?;
        sink.event(ProgressEvent {
            message: format!(
                "loaded {} rows via {}",
                loaded.table.row_count(),
                loaded.strategy.describe()
            ),
            elapsed: None,
        });
        Ok(loaded)
    }

    /// Datasets visible in the user's namespace: CSV blobs at the root plus
    /// one folder level of CSV blobs. A folder that fails to list is skipped.
    pub fn list_datasets(&self, user: &UserId) -> Result<Vec<DatasetEntry>, VaultError> {
        let root = user.namespace();
        let mut datasets = Vec::new();
        for entry in self.store.list(&root)? {
            if entry.name.ends_with(".csv") {
                datasets.push(DatasetEntry {
                    path: format!("{root}/{}", entry.name),
                    name: entry.name,
                });
                continue;
            }
            let Ok(files) = self.store.list(&format!("{root}/{}", entry.name)) else {
                continue;
            };
            for file in files {
                if file.name.ends_with(".csv") {
                    datasets.push(DatasetEntry {
                        name: format!("{}/{}", entry.name, file.name),
                        path: format!("{root}/{}/{}", entry.name, file.name),
                    });
                }
            }
        }
        Ok(datasets)
    }

    pub fn kaggle_settings(&self, user: &UserId) -> Result<Option<KaggleSettings>, VaultError> {
        Ok(self
            .settings
            .get(user, SettingType::Kaggle)?
            .and_then(|value| serde_json::from_value(value).ok()))
    }

    pub fn save_kaggle_settings(
        &self,
        user: &UserId,
        username: &str,
        key: &str,
    ) -> Result<(), VaultError> {
        if username.is_empty() || key.is_empty() {
            return Err(VaultError::MissingCredentials(
                "kaggle username and key".to_string(),
            ));
        }
        let settings = KaggleSettings {
            username: username.to_string(),
            key: key.to_string(),
            updated_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        self.settings.upsert(
            user,
            SettingType::Kaggle,
            serde_json::to_value(settings)
                .map_err(|err| VaultError::SettingsHttp(err.to_string()))?,
        )
    }

    pub fn delete_setting(
        &self,
        user: &UserId,
        setting_type: SettingType,
    ) -> Result<(), VaultError> {
        self.settings.delete(user, setting_type)
    }

    pub fn subdomain(&self, user: &UserId) -> Result<Option<String>, VaultError> {
        Ok(self
            .settings
            .get(user, SettingType::ApiConfig)?
            .and_then(|value| serde_json::from_value::<ApiConfigSettings>(value).ok())
            .map(|settings| settings.subdomain))
    }

    pub fn save_subdomain(&self, user: &UserId, subdomain: &str) -> Result<(), VaultError> {
        crate::settings::validate_subdomain(subdomain)?;
        if self.settings.subdomain_taken(subdomain, user)? {
            return Err(VaultError::SubdomainTaken(subdomain.to_string()));
        }
        let settings = ApiConfigSettings {
            subdomain: subdomain.to_string(),
            updated_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        self.settings.upsert(
            user,
            SettingType::ApiConfig,
            serde_json::to_value(settings)
                .map_err(|err| VaultError::SettingsHttp(err.to_string()))?,
        )
    }
}

/// Cache-presence policy: exact listing-name matching only. `scrubbed.csv`
/// wins when present, else the first CSV entry.
pub fn cache_entry(entries: &[StoreEntry]) -> Option<&StoreEntry> {
    entries
        .iter()
        .find(|entry| entry.name == PREFERRED_FILE)
        .or_else(|| entries.iter().find(|entry| entry.name.ends_with(".csv")))
}

/// File-selection policy after unpacking: prefer `scrubbed.csv`, else the
/// first CSV in archive order.
pub fn select_csv(files: &[Utf8PathBuf]) -> Option<&Utf8PathBuf> {
    let csvs: Vec<&Utf8PathBuf> = files
        .iter()
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false)
        })
        .collect();
    csvs.iter()
        .find(|path| path.file_name() == Some(PREFERRED_FILE))
        .copied()
        .or_else(|| csvs.first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_prefers_scrubbed_csv() {
        let files = vec![
            Utf8PathBuf::from("/tmp/x/other.csv"),
            Utf8PathBuf::from("/tmp/x/readme.txt"),
            Utf8PathBuf::from("/tmp/x/scrubbed.csv"),
        ];
        assert_eq!(
            select_csv(&files).unwrap().file_name(),
            Some("scrubbed.csv")
        );
    }

    #[test]
    fn select_falls_back_to_first_csv() {
        let files = vec![
            Utf8PathBuf::from("/tmp/x/readme.txt"),
            Utf8PathBuf::from("/tmp/x/b.csv"),
            Utf8PathBuf::from("/tmp/x/a.csv"),
        ];
        assert_eq!(select_csv(&files).unwrap().file_name(), Some("b.csv"));
        assert_eq!(select_csv(&[Utf8PathBuf::from("/tmp/readme.txt")]), None);
    }

    #[test]
    fn cache_entry_uses_exact_names() {
        let entries = vec![
            StoreEntry {
                name: "notes.txt".to_string(),
            },
            StoreEntry {
                name: "data.csv".to_string(),
            },
            StoreEntry {
                name: "scrubbed.csv".to_string(),
            },
        ];
        assert_eq!(cache_entry(&entries).unwrap().name, "scrubbed.csv");

        let entries = vec![StoreEntry {
            name: "data.csv".to_string(),
        }];
        assert_eq!(cache_entry(&entries).unwrap().name, "data.csv");
        assert!(cache_entry(&[]).is_none());
    }

    #[test]
    fn session_starts_signed_out() {
        let session = Session::new();
        assert!(!session.authenticated);
        assert_eq!(session.page, Page::Welcome);
        assert!(session.user_id().is_err());
    }
}
