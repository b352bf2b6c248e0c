use datavault_explorer::config::{
    CredentialsFile, CredentialsLoader, DEFAULT_API_BASE_URL, KaggleCredentials,
};
use datavault_explorer::error::VaultError;

#[test]
fn fully_specified_file_resolves_as_is() {
    let file = CredentialsFile {
        api_base_url: Some("https://api.example.com".to_string()),
        store_url: Some("https://store.example.com".to_string()),
        store_key: Some("anon".to_string()),
        kaggle: Some(KaggleCredentials {
            username: "alice".to_string(),
            key: "k".to_string(),
        }),
    };

    let resolved = CredentialsLoader::resolve_file(file);
    assert_eq!(resolved.api_base_url, "https://api.example.com");
    let (url, key) = resolved.store().unwrap();
    assert_eq!(url, "https://store.example.com");
    assert_eq!(key, "anon");
    assert_eq!(resolved.kaggle.unwrap().username, "alice");
}

#[test]
fn api_base_url_defaults_to_localhost() {
    let resolved = CredentialsLoader::resolve_file(CredentialsFile {
        api_base_url: None,
        store_url: Some("https://store.example.com".to_string()),
        store_key: Some("anon".to_string()),
        kaggle: None,
    });
    assert_eq!(resolved.api_base_url, DEFAULT_API_BASE_URL);
}

#[test]
fn explicit_missing_file_is_an_error() {
    let err = CredentialsLoader::resolve(Some("/nonexistent/datavault-creds.json")).unwrap_err();
    assert!(matches!(err, VaultError::ConfigRead(_)));
}

#[test]
fn malformed_file_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    std::fs::write(&path, "{not json").unwrap();

    let err = CredentialsLoader::resolve(path.to_str()).unwrap_err();
    assert!(matches!(err, VaultError::ConfigParse(_)));
}

#[test]
fn file_from_disk_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    std::fs::write(
        &path,
        r#"{
            "api_base_url": "https://api.example.com",
            "store_url": "https://store.example.com",
            "store_key": "anon",
            "kaggle": { "username": "alice", "key": "k" }
        }"#,
    )
    .unwrap();

    let resolved = CredentialsLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.api_base_url, "https://api.example.com");
    assert_eq!(resolved.kaggle.unwrap().key, "k");
}
