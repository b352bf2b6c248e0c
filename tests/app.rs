use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use serde_json::Value;

use datavault_explorer::app::{AcquireOptions, Action, App, Page, Session};
use datavault_explorer::auth::{AuthSession, AuthUser, IdentityClient};
use datavault_explorer::backend::{ApiDocs, ApiKeyGrant, ApiReply, BackendClient};
use datavault_explorer::config::KaggleCredentials;
use datavault_explorer::domain::{DatasetName, UserId};
use datavault_explorer::error::VaultError;
use datavault_explorer::kaggle::DatasetProvider;
use datavault_explorer::output::JsonOutput;
use datavault_explorer::settings::{SettingType, SettingsClient};
use datavault_explorer::storage::{ObjectStore, StoreEntry};

/// Blob store backed by a map; lists immediate children of a prefix the way
/// the hosted store does.
#[derive(Default)]
struct MemoryStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    fn insert(&self, path: &str, bytes: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .insert(path.to_string(), bytes.to_vec());
    }

    fn keys(&self) -> Vec<String> {
        self.blobs.lock().unwrap().keys().cloned().collect()
    }

    fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(path).cloned()
    }
}

impl ObjectStore for MemoryStore {
    fn list(&self, prefix: &str) -> Result<Vec<StoreEntry>, VaultError> {
        let blobs = self.blobs.lock().unwrap();
        let prefix = format!("{}/", prefix.trim_end_matches('/'));
        let mut names = BTreeSet::new();
        for key in blobs.keys() {
            if let Some(rest) = key.strip_prefix(&prefix) {
                if let Some(name) = rest.split('/').next() {
                    names.insert(name.to_string());
                }
            }
        }
        Ok(names
            .into_iter()
            .map(|name| StoreEntry { name })
            .collect())
    }

    fn upload(&self, path: &str, bytes: &[u8]) -> Result<String, VaultError> {
        self.insert(path, bytes);
        Ok(path.to_string())
    }

    fn download(&self, path: &str) -> Result<Vec<u8>, VaultError> {
        self.get(path).ok_or_else(|| VaultError::StorageStatus {
            status: 404,
            message: format!("object not found: {path}"),
        })
    }

    fn remove(&self, path: &str) -> Result<(), VaultError> {
        self.blobs.lock().unwrap().remove(path);
        Ok(())
    }
}

/// Provider that unpacks a queued set of files per call.
struct MockProvider {
    rounds: Mutex<VecDeque<Vec<(String, Vec<u8>)>>>,
    calls: Mutex<usize>,
}

impl MockProvider {
    fn new(rounds: Vec<Vec<(&str, &[u8])>>) -> Self {
        Self {
            rounds: Mutex::new(
                rounds
                    .into_iter()
                    .map(|files| {
                        files
                            .into_iter()
                            .map(|(name, bytes)| (name.to_string(), bytes.to_vec()))
                            .collect()
                    })
                    .collect(),
            ),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl DatasetProvider for MockProvider {
    fn download_dataset(
        &self,
        _credentials: &KaggleCredentials,
        _name: &DatasetName,
        destination: &Path,
    ) -> Result<Vec<Utf8PathBuf>, VaultError> {
        *self.calls.lock().unwrap() += 1;
        let files = self
            .rounds
            .lock()
            .unwrap()
            .pop_front()
            .expect("mock provider exhausted");
        let mut paths = Vec::new();
        for (name, bytes) in files {
            let path = destination.join(&name);
            std::fs::write(&path, bytes).unwrap();
            paths.push(Utf8PathBuf::from_path_buf(path).unwrap());
        }
        Ok(paths)
    }
}

#[derive(Default)]
struct MockIdentity;

impl IdentityClient for MockIdentity {
    fn sign_in_with_password(
        &self,
        email: &str,
        _password: &str,
    ) -> Result<AuthSession, VaultError> {
        Ok(AuthSession {
            access_token: "token".to_string(),
            refresh_token: "refresh".to_string(),
            user: AuthUser {
                id: "42ab".parse().unwrap(),
                email: email.to_string(),
            },
        })
    }

    fn sign_up(&self, _email: &str, _password: &str) -> Result<(), VaultError> {
        Ok(())
    }

    fn authorize_url(&self, provider: &str) -> String {
        format!("https://auth.example.com/authorize?provider={provider}")
    }

    fn current_user(&self, _access_token: &str) -> Result<AuthUser, VaultError> {
        Ok(AuthUser {
            id: "42ab".parse().unwrap(),
            email: "alice@example.com".to_string(),
        })
    }

    fn refresh(&self, _refresh_token: &str) -> Result<AuthSession, VaultError> {
        Err(VaultError::AuthHttp("not implemented".to_string()))
    }

    fn sign_out(&self, _access_token: &str) -> Result<(), VaultError> {
        Ok(())
    }
}

#[derive(Default)]
struct MemorySettings {
    rows: Mutex<BTreeMap<(String, String), Value>>,
}

impl SettingsClient for MemorySettings {
    fn get(&self, user: &UserId, setting_type: SettingType) -> Result<Option<Value>, VaultError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&(user.to_string(), setting_type.as_str().to_string()))
            .cloned())
    }

    fn upsert(
        &self,
        user: &UserId,
        setting_type: SettingType,
        settings: Value,
    ) -> Result<(), VaultError> {
        self.rows
            .lock()
            .unwrap()
            .insert((user.to_string(), setting_type.as_str().to_string()), settings);
        Ok(())
    }

    fn delete(&self, user: &UserId, setting_type: SettingType) -> Result<(), VaultError> {
        self.rows
            .lock()
            .unwrap()
            .remove(&(user.to_string(), setting_type.as_str().to_string()));
        Ok(())
    }

    fn subdomain_taken(
        &self,
        _subdomain: &str,
        _requesting_user: &UserId,
    ) -> Result<bool, VaultError> {
        Ok(false)
    }
}

#[derive(Default)]
struct MockBackend;

impl BackendClient for MockBackend {
    fn data_summary(&self, bucket_path: &str, _api_key: &str) -> ApiReply {
        ApiReply::Success(serde_json::json!({ "bucket_path": bucket_path }))
    }

    fn data_stats(&self, _bucket_path: &str, _api_key: &str) -> ApiReply {
        ApiReply::Rejected("no stats".to_string())
    }

    fn data_head(&self, _bucket_path: &str, _api_key: &str, n: usize) -> ApiReply {
        ApiReply::Success(serde_json::json!({ "n": n }))
    }

    fn generate_key(&self, _access_token: &str) -> Result<ApiKeyGrant, VaultError> {
        Ok(ApiKeyGrant {
            api_key: "dv_key".to_string(),
            message: "store this key".to_string(),
        })
    }

    fn docs(&self, _user: &UserId) -> Result<ApiDocs, VaultError> {
        Err(VaultError::BackendUnreachable("not implemented".to_string()))
    }
}

fn kaggle_creds() -> Option<KaggleCredentials> {
    Some(KaggleCredentials {
        username: "alice".to_string(),
        key: "k".to_string(),
    })
}

fn test_app(
    provider: MockProvider,
    store: MemoryStore,
) -> App<MockProvider, MemoryStore, MockIdentity, MemorySettings, MockBackend> {
    App::new(
        provider,
        store,
        MockIdentity,
        MemorySettings::default(),
        MockBackend,
    )
    .with_kaggle_credentials(kaggle_creds())
}

fn user() -> UserId {
    "42ab".parse().unwrap()
}

fn dataset() -> DatasetName {
    "org/demo".parse().unwrap()
}

#[test]
fn cache_hit_skips_the_provider() {
    let store = MemoryStore::default();
    store.insert("user_42ab/org_demo/scrubbed.csv", b"a,b\n1,2\n");
    let provider = MockProvider::new(vec![]);
    let app = test_app(provider, store);

    let (result, loaded) = app
        .acquire(&user(), &dataset(), AcquireOptions::default(), &JsonOutput)
        .unwrap();

    assert_eq!(result.action, "cache");
    assert_eq!(result.bucket_path, "user_42ab/org_demo/scrubbed.csv");
    assert_eq!(loaded.table.columns, vec!["a", "b"]);
    // re-running an acquisition for a stored dataset never calls the provider
    assert_eq!(app.provider().calls(), 0);
}

#[test]
fn cache_miss_stores_the_preferred_file() {
    let store = MemoryStore::default();
    let provider = MockProvider::new(vec![vec![
        ("other.csv", b"x\n1\n".as_slice()),
        ("scrubbed.csv", b"city,shape,duration\nseattle,disk,5\n".as_slice()),
    ]]);
    let app = test_app(provider, store);

    let (result, loaded) = app
        .acquire(&user(), &dataset(), AcquireOptions::default(), &JsonOutput)
        .unwrap();

    assert_eq!(result.action, "download");
    assert_eq!(result.bucket_path, "user_42ab/org_demo/scrubbed.csv");
    assert_eq!(loaded.table.columns, vec!["city", "shape", "duration"]);
    assert_eq!(app.provider().calls(), 1);
    assert!(
        app.store()
            .get("user_42ab/org_demo/scrubbed.csv")
            .is_some()
    );

    // second run for the same dataset is a cache hit
    let (result, _) = app
        .acquire(&user(), &dataset(), AcquireOptions::default(), &JsonOutput)
        .unwrap();
    assert_eq!(result.action, "cache");
    assert_eq!(app.provider().calls(), 1);
}

#[test]
fn overwrite_leaves_exactly_one_blob_with_latest_content() {
    let store = MemoryStore::default();
    let provider = MockProvider::new(vec![
        vec![("scrubbed.csv", b"v\n1\n".as_slice())],
        vec![("scrubbed.csv", b"v\n2\n".as_slice())],
    ]);
    let app = test_app(provider, store);

    let options = AcquireOptions { force: true };
    app.acquire(&user(), &dataset(), options, &JsonOutput)
        .unwrap();
    app.acquire(&user(), &dataset(), options, &JsonOutput)
        .unwrap();

    let keys = app.store().keys();
    assert_eq!(keys, vec!["user_42ab/org_demo/scrubbed.csv".to_string()]);
    assert_eq!(
        app.store().get("user_42ab/org_demo/scrubbed.csv").unwrap(),
        b"v\n2\n"
    );
}

#[test]
fn first_csv_is_taken_when_no_scrubbed_file_exists() {
    let store = MemoryStore::default();
    let provider = MockProvider::new(vec![vec![
        ("readme.txt", b"notes".as_slice()),
        ("data.csv", b"a\n1\n".as_slice()),
    ]]);
    let app = test_app(provider, store);

    let (result, _) = app
        .acquire(&user(), &dataset(), AcquireOptions::default(), &JsonOutput)
        .unwrap();
    assert_eq!(result.bucket_path, "user_42ab/org_demo/data.csv");
}

#[test]
fn dataset_without_csv_fails() {
    let store = MemoryStore::default();
    let provider = MockProvider::new(vec![vec![("readme.txt", b"notes".as_slice())]]);
    let app = test_app(provider, store);

    let err = app
        .acquire(&user(), &dataset(), AcquireOptions::default(), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, VaultError::NoCsvInDataset(_));
    assert!(app.store().keys().is_empty());
}

#[test]
fn provider_credentials_fall_back_to_stored_settings() {
    let store = MemoryStore::default();
    let provider = MockProvider::new(vec![vec![("scrubbed.csv", b"a\n1\n".as_slice())]]);
    let settings = MemorySettings::default();
    settings
        .upsert(
            &user(),
            SettingType::Kaggle,
            serde_json::json!({ "username": "alice", "key": "k" }),
        )
        .unwrap();
    let app = App::new(provider, store, MockIdentity, settings, MockBackend);

    let (result, _) = app
        .acquire(&user(), &dataset(), AcquireOptions::default(), &JsonOutput)
        .unwrap();
    assert_eq!(result.action, "download");
}

#[test]
fn missing_provider_credentials_are_reported() {
    let store = MemoryStore::default();
    let provider = MockProvider::new(vec![vec![("scrubbed.csv", b"a\n1\n".as_slice())]]);
    let app = App::new(
        provider,
        store,
        MockIdentity,
        MemorySettings::default(),
        MockBackend,
    );

    let err = app
        .acquire(&user(), &dataset(), AcquireOptions::default(), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, VaultError::MissingCredentials(_));
    assert_eq!(app.provider().calls(), 0);
}

#[test]
fn listing_covers_root_and_nested_blobs() {
    let store = MemoryStore::default();
    store.insert("user_42ab/root.csv", b"a\n");
    store.insert("user_42ab/org_demo/scrubbed.csv", b"a\n");
    store.insert("user_42ab/org_demo/notes.txt", b"x");
    store.insert("user_other/org_demo/scrubbed.csv", b"a\n");
    let app = test_app(MockProvider::new(vec![]), store);

    let datasets = app.list_datasets(&user()).unwrap();
    let names: Vec<&str> = datasets.iter().map(|entry| entry.name.as_str()).collect();
    assert_eq!(names, vec!["org_demo/scrubbed.csv", "root.csv"]);
    assert_eq!(datasets[0].path, "user_42ab/org_demo/scrubbed.csv");
}

#[test]
fn dispatch_drives_login_acquire_and_logout() {
    let store = MemoryStore::default();
    store.insert("user_42ab/org_demo/scrubbed.csv", b"a,b\n1,2\n");
    let app = test_app(MockProvider::new(vec![]), store);
    let mut session = Session::new();

    app.dispatch(
        &mut session,
        Action::LogIn {
            email: "alice@example.com".to_string(),
            password: "pw".to_string(),
        },
        &JsonOutput,
    )
    .unwrap();
    assert!(session.authenticated);
    assert_eq!(session.page, Page::Explorer);

    app.dispatch(
        &mut session,
        Action::Acquire {
            dataset: dataset(),
            force: false,
        },
        &JsonOutput,
    )
    .unwrap();
    assert_eq!(
        session.current_dataset.as_deref(),
        Some("user_42ab/org_demo/scrubbed.csv")
    );
    assert_eq!(
        session.table.as_ref().unwrap().table.columns,
        vec!["a", "b"]
    );

    // data calls require a generated key first
    app.dispatch(&mut session, Action::FetchSummary, &JsonOutput)
        .unwrap();
    assert_matches!(
        session.summary_response.as_ref().unwrap(),
        ApiReply::Rejected(_)
    );

    app.dispatch(&mut session, Action::GenerateKey, &JsonOutput)
        .unwrap();
    app.dispatch(&mut session, Action::FetchSummary, &JsonOutput)
        .unwrap();
    assert_matches!(
        session.summary_response.as_ref().unwrap(),
        ApiReply::Success(_)
    );

    app.dispatch(&mut session, Action::LogOut, &JsonOutput)
        .unwrap();
    assert!(!session.authenticated);
    assert_eq!(session.page, Page::Welcome);
    assert!(session.table.is_none());
    assert!(session.api_key.is_none());
}

#[test]
fn actions_requiring_auth_fail_signed_out() {
    let app = test_app(MockProvider::new(vec![]), MemoryStore::default());
    let mut session = Session::new();

    let err = app
        .dispatch(
            &mut session,
            Action::Acquire {
                dataset: dataset(),
                force: false,
            },
            &JsonOutput,
        )
        .unwrap_err();
    assert_matches!(err, VaultError::SessionMissing);
}
