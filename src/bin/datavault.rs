use std::path::Path;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use datavault_explorer::app::{AcquireOptions, App};
use datavault_explorer::auth::{AuthSession, IdentityClient, SupabaseAuthClient};
use datavault_explorer::backend::{
    ApiKeyGrant, ApiReply, BackendClient, BackendHttpClient,
};
use datavault_explorer::config::{Credentials, CredentialsLoader, KaggleCredentials};
use datavault_explorer::domain::{DatasetName, UserId};
use datavault_explorer::error::VaultError;
use datavault_explorer::kaggle::{DatasetProvider, KaggleHttpClient};
use datavault_explorer::output::{JsonOutput, OutputMode};
use datavault_explorer::settings::{SettingType, SettingsClient, SupabaseSettingsClient};
use datavault_explorer::storage::{ObjectStore, StoreEntry, SupabaseStorageClient};
use datavault_explorer::tui::Tui;

#[derive(Parser)]
#[command(name = "datavault")]
#[command(about = "Explore hosted datasets: fetch, cache in object storage, preview, manage API access")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Credentials file (defaults to ~/.config/datavault/credentials.json,
    /// with environment variables as fallback).
    #[arg(long, global = true)]
    credentials: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Sign in, register, OAuth")]
    Auth(AuthArgs),
    #[command(about = "Fetch, list and load datasets")]
    Data(DataArgs),
    #[command(about = "Companion REST API calls")]
    Api(ApiArgs),
    #[command(about = "Per-user settings (provider credentials, subdomain)")]
    Settings(SettingsArgs),
}

#[derive(Args)]
struct AuthArgs {
    #[command(subcommand)]
    command: AuthCommand,
}

#[derive(Subcommand)]
enum AuthCommand {
    #[command(about = "Sign in with email and password, print session tokens")]
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    #[command(about = "Register a new account")]
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    #[command(about = "Print the OAuth authorize URL")]
    OauthUrl {
        #[arg(long, default_value = "google")]
        provider: String,
    },
    #[command(about = "Exchange a refresh token for a fresh session")]
    Refresh {
        #[arg(long)]
        token: String,
    },
    #[command(about = "Show the identity behind an access token")]
    Whoami {
        #[arg(long)]
        token: String,
    },
}

#[derive(Args)]
struct DataArgs {
    #[command(subcommand)]
    command: DataCommand,
}

#[derive(Subcommand)]
enum DataCommand {
    #[command(about = "Acquire a dataset: cache check, provider download, store, load")]
    Fetch {
        /// Dataset in owner/name form.
        name: String,
        #[arg(long)]
        user: String,
        /// Re-download even when the dataset is already stored.
        #[arg(long)]
        force: bool,
    },
    #[command(about = "List datasets stored under a user's namespace")]
    List {
        #[arg(long)]
        user: String,
    },
    #[command(about = "Load a stored blob and preview it")]
    Load {
        /// Full blob path, e.g. user_<id>/<slug>/scrubbed.csv
        path: String,
        #[arg(long, default_value_t = 5)]
        rows: usize,
    },
}

#[derive(Args)]
struct ApiArgs {
    #[command(subcommand)]
    command: ApiCommand,
}

#[derive(Subcommand)]
enum ApiCommand {
    #[command(about = "Dataset summary")]
    Summary {
        #[arg(long)]
        path: String,
        #[arg(long)]
        key: String,
    },
    #[command(about = "Dataset statistics")]
    Stats {
        #[arg(long)]
        path: String,
        #[arg(long)]
        key: String,
    },
    #[command(about = "First N rows")]
    Head {
        #[arg(long)]
        path: String,
        #[arg(long)]
        key: String,
        #[arg(long, default_value_t = 5)]
        n: usize,
    },
    #[command(about = "Generate a new API key (requires a session access token)")]
    GenerateKey {
        #[arg(long)]
        token: String,
    },
    #[command(about = "Per-user API documentation")]
    Docs {
        #[arg(long)]
        user: String,
    },
}

#[derive(Args)]
struct SettingsArgs {
    #[command(subcommand)]
    command: SettingsCommand,
}

#[derive(Subcommand)]
enum SettingsCommand {
    #[command(about = "Show stored Kaggle credentials")]
    KaggleShow {
        #[arg(long)]
        user: String,
    },
    #[command(about = "Store Kaggle credentials")]
    KaggleSet {
        #[arg(long)]
        user: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        key: String,
    },
    #[command(about = "Delete stored Kaggle credentials")]
    KaggleDelete {
        #[arg(long)]
        user: String,
    },
    #[command(about = "Show the custom API subdomain")]
    SubdomainShow {
        #[arg(long)]
        user: String,
    },
    #[command(about = "Set the custom API subdomain")]
    SubdomainSet {
        #[arg(long)]
        user: String,
        #[arg(long)]
        subdomain: String,
    },
    #[command(about = "Delete the custom API subdomain")]
    SubdomainDelete {
        #[arg(long)]
        user: String,
    },
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(vault) = report.downcast_ref::<VaultError>() {
            return ExitCode::from(map_exit_code(vault));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &VaultError) -> u8 {
    match error {
        VaultError::DatasetNotFound(_) | VaultError::MissingCredentials(_) => 2,
        VaultError::AuthFailed(_) | VaultError::SessionMissing => 2,
        VaultError::AuthHttp(_)
        | VaultError::AuthStatus { .. }
        | VaultError::StorageHttp(_)
        | VaultError::StorageStatus { .. }
        | VaultError::SettingsHttp(_)
        | VaultError::SettingsStatus { .. }
        | VaultError::KaggleHttp(_)
        | VaultError::KaggleStatus { .. }
        | VaultError::BackendUnreachable(_)
        | VaultError::BackendStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let credentials = CredentialsLoader::resolve(cli.credentials.as_deref()).into_diagnostic()?;

    match cli.command {
        Some(Commands::Auth(args)) => run_auth(args.command, &credentials),
        Some(Commands::Data(args)) => run_data(args.command, &credentials, output_mode),
        Some(Commands::Api(args)) => run_api(args.command, &credentials),
        Some(Commands::Settings(args)) => run_settings(args.command, &credentials),
        None => {
            if cli.non_interactive {
                return Err(miette::Report::msg(
                    "command required (try `datavault data --help`)",
                ));
            }
            let app = build_full_app(&credentials)?;
            Tui::new().run(&app)
        }
    }
}

type FullApp = App<
    KaggleHttpClient,
    SupabaseStorageClient,
    SupabaseAuthClient,
    SupabaseSettingsClient,
    BackendHttpClient,
>;

fn build_full_app(credentials: &Credentials) -> miette::Result<FullApp> {
    let (store_url, store_key) = credentials.store().into_diagnostic()?;
    let provider = KaggleHttpClient::new().into_diagnostic()?;
    let store = SupabaseStorageClient::new(store_url, store_key).into_diagnostic()?;
    let identity = SupabaseAuthClient::new(store_url, store_key).into_diagnostic()?;
    let settings = SupabaseSettingsClient::new(store_url, store_key).into_diagnostic()?;
    let backend = BackendHttpClient::new(&credentials.api_base_url).into_diagnostic()?;
    Ok(App::new(provider, store, identity, settings, backend)
        .with_kaggle_credentials(credentials.kaggle.clone()))
}

fn run_auth(command: AuthCommand, credentials: &Credentials) -> miette::Result<()> {
    let (store_url, store_key) = credentials.store().into_diagnostic()?;
    let identity = SupabaseAuthClient::new(store_url, store_key).into_diagnostic()?;

    match command {
        AuthCommand::Login { email, password } => {
            let session = identity
                .sign_in_with_password(&email, &password)
                .into_diagnostic()?;
            print_session(&session)
        }
        AuthCommand::Register { email, password } => {
            identity.sign_up(&email, &password).into_diagnostic()?;
            JsonOutput::print_value(&serde_json::json!({
                "registered": true,
                "message": "Check your email to verify your account.",
            }))
            .into_diagnostic()
        }
        AuthCommand::OauthUrl { provider } => {
            JsonOutput::print_value(&serde_json::json!({
                "authorize_url": identity.authorize_url(&provider),
            }))
            .into_diagnostic()
        }
        AuthCommand::Refresh { token } => {
            let session = identity.refresh(&token).into_diagnostic()?;
            print_session(&session)
        }
        AuthCommand::Whoami { token } => {
            let user = identity.current_user(&token).into_diagnostic()?;
            JsonOutput::print_value(&serde_json::json!({
                "user_id": user.id.as_str(),
                "email": user.email,
            }))
            .into_diagnostic()
        }
    }
}

fn print_session(session: &AuthSession) -> miette::Result<()> {
    JsonOutput::print_value(&serde_json::json!({
        "user_id": session.user.id.as_str(),
        "email": session.user.email,
        "access_token": session.access_token,
        "refresh_token": session.refresh_token,
    }))
    .into_diagnostic()
}

fn run_data(
    command: DataCommand,
    credentials: &Credentials,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match command {
        DataCommand::Fetch { name, user, force } => {
            let app = build_full_app(credentials)?;
            let dataset: DatasetName = name.parse().into_diagnostic()?;
            let user: UserId = user.parse().into_diagnostic()?;
            let (result, _loaded) = app
                .acquire(&user, &dataset, AcquireOptions { force }, &JsonOutput)
                .into_diagnostic()?;
            match output_mode {
                OutputMode::NonInteractive => {
                    JsonOutput::print_acquire(&result).into_diagnostic()
                }
                OutputMode::Interactive => {
                    print_acquire_summary(&result);
                    Ok(())
                }
            }
        }
        DataCommand::List { user } => {
            let (store_url, store_key) = credentials.store().into_diagnostic()?;
            let store = SupabaseStorageClient::new(store_url, store_key).into_diagnostic()?;
            let app = App::new(NopProvider, store, NopIdentity, NopSettings, NopBackend);
            let user: UserId = user.parse().into_diagnostic()?;
            let datasets = app.list_datasets(&user).into_diagnostic()?;
            match output_mode {
                OutputMode::NonInteractive => {
                    JsonOutput::print_datasets(&datasets).into_diagnostic()
                }
                OutputMode::Interactive => {
                    if datasets.is_empty() {
                        println!("No datasets uploaded yet");
                    }
                    for entry in &datasets {
                        println!("{}\t{}", entry.name, entry.path);
                    }
                    Ok(())
                }
            }
        }
        DataCommand::Load { path, rows } => {
            let (store_url, store_key) = credentials.store().into_diagnostic()?;
            let store = SupabaseStorageClient::new(store_url, store_key).into_diagnostic()?;
            let app = App::new(NopProvider, store, NopIdentity, NopSettings, NopBackend);
            let loaded = app.load_stored(&path, &JsonOutput).into_diagnostic()?;
            JsonOutput::print_table(&loaded, rows).into_diagnostic()
        }
    }
}

fn print_acquire_summary(result: &datavault_explorer::app::AcquireResult) {
    let green = "\x1b[32m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    let (icon, color) = if result.action == "cache" {
        ("*", green)
    } else {
        ("v", cyan)
    };
    println!("{color}{icon} {} ({}){reset}", result.dataset, result.action);
    println!("{color}  path: {}{reset}", result.bucket_path);
    println!(
        "{color}  {} rows, {} columns, {}{reset}",
        result.rows,
        result.columns.len(),
        result.strategy
    );
}

fn run_api(command: ApiCommand, credentials: &Credentials) -> miette::Result<()> {
    let backend = BackendHttpClient::new(&credentials.api_base_url).into_diagnostic()?;

    match command {
        ApiCommand::Summary { path, key } => print_reply(backend.data_summary(&path, &key)),
        ApiCommand::Stats { path, key } => print_reply(backend.data_stats(&path, &key)),
        ApiCommand::Head { path, key, n } => print_reply(backend.data_head(&path, &key, n)),
        ApiCommand::GenerateKey { token } => {
            let grant: ApiKeyGrant = backend.generate_key(&token).into_diagnostic()?;
            JsonOutput::print_value(&serde_json::json!({
                "api_key": grant.api_key,
                "message": grant.message,
            }))
            .into_diagnostic()
        }
        ApiCommand::Docs { user } => {
            let user: UserId = user.parse().into_diagnostic()?;
            let docs = backend.docs(&user).into_diagnostic()?;
            let value = serde_json::json!({
                "base_url": docs.base_url,
                "authentication": {
                    "type": docs.authentication.auth_type,
                    "header": docs.authentication.header,
                    "note": docs.authentication.note,
                },
                "endpoints": docs
                    .endpoints
                    .iter()
                    .map(|(endpoint, details)| {
                        (
                            endpoint.clone(),
                            serde_json::json!({
                                "description": details.description,
                                "parameters": details.parameters,
                                "example": details.example,
                            }),
                        )
                    })
                    .collect::<serde_json::Map<String, Value>>(),
                "available_datasets": docs.available_datasets,
            });
            JsonOutput::print_value(&value).into_diagnostic()
        }
    }
}

fn print_reply(reply: ApiReply) -> miette::Result<()> {
    JsonOutput::print_value(&reply.to_value()).into_diagnostic()
}

fn run_settings(command: SettingsCommand, credentials: &Credentials) -> miette::Result<()> {
    let (store_url, store_key) = credentials.store().into_diagnostic()?;
    let settings = SupabaseSettingsClient::new(store_url, store_key).into_diagnostic()?;
    let app = App::new(NopProvider, NopStore, NopIdentity, settings, NopBackend);

    match command {
        SettingsCommand::KaggleShow { user } => {
            let user: UserId = user.parse().into_diagnostic()?;
            let stored = app.kaggle_settings(&user).into_diagnostic()?;
            let value = match stored {
                Some(settings) => serde_json::json!({
                    "configured": true,
                    "username": settings.username,
                    "updated_at": settings.updated_at,
                }),
                None => serde_json::json!({ "configured": false }),
            };
            JsonOutput::print_value(&value).into_diagnostic()
        }
        SettingsCommand::KaggleSet {
            user,
            username,
            key,
        } => {
            let user: UserId = user.parse().into_diagnostic()?;
            app.save_kaggle_settings(&user, &username, &key)
                .into_diagnostic()?;
            JsonOutput::print_value(&serde_json::json!({ "saved": true })).into_diagnostic()
        }
        SettingsCommand::KaggleDelete { user } => {
            let user: UserId = user.parse().into_diagnostic()?;
            app.delete_setting(&user, SettingType::Kaggle)
                .into_diagnostic()?;
            JsonOutput::print_value(&serde_json::json!({ "deleted": true })).into_diagnostic()
        }
        SettingsCommand::SubdomainShow { user } => {
            let user: UserId = user.parse().into_diagnostic()?;
            let subdomain = app.subdomain(&user).into_diagnostic()?;
            JsonOutput::print_value(&serde_json::json!({ "subdomain": subdomain }))
                .into_diagnostic()
        }
        SettingsCommand::SubdomainSet { user, subdomain } => {
            let user: UserId = user.parse().into_diagnostic()?;
            app.save_subdomain(&user, &subdomain).into_diagnostic()?;
            JsonOutput::print_value(&serde_json::json!({ "saved": true, "subdomain": subdomain }))
                .into_diagnostic()
        }
        SettingsCommand::SubdomainDelete { user } => {
            let user: UserId = user.parse().into_diagnostic()?;
            app.delete_setting(&user, SettingType::ApiConfig)
                .into_diagnostic()?;
            JsonOutput::print_value(&serde_json::json!({ "deleted": true })).into_diagnostic()
        }
    }
}

#[derive(Clone, Copy)]
struct NopProvider;
#[derive(Clone, Copy)]
struct NopStore;
#[derive(Clone, Copy)]
struct NopIdentity;
#[derive(Clone, Copy)]
struct NopSettings;
#[derive(Clone, Copy)]
struct NopBackend;

impl DatasetProvider for NopProvider {
    fn download_dataset(
        &self,
        _credentials: &KaggleCredentials,
        _name: &DatasetName,
        _destination: &Path,
    ) -> Result<Vec<Utf8PathBuf>, VaultError> {
        Err(VaultError::KaggleHttp(
            "dataset provider not configured".to_string(),
        ))
    }
}

impl ObjectStore for NopStore {
    fn list(&self, _prefix: &str) -> Result<Vec<StoreEntry>, VaultError> {
        Err(VaultError::StorageHttp("storage not configured".to_string()))
    }

    fn upload(&self, _path: &str, _bytes: &[u8]) -> Result<String, VaultError> {
        Err(VaultError::StorageHttp("storage not configured".to_string()))
    }

    fn download(&self, _path: &str) -> Result<Vec<u8>, VaultError> {
        Err(VaultError::StorageHttp("storage not configured".to_string()))
    }

    fn remove(&self, _path: &str) -> Result<(), VaultError> {
        Err(VaultError::StorageHttp("storage not configured".to_string()))
    }
}

impl IdentityClient for NopIdentity {
    fn sign_in_with_password(
        &self,
        _email: &str,
        _password: &str,
    ) -> Result<AuthSession, VaultError> {
        Err(VaultError::AuthHttp(
            "identity client not configured".to_string(),
        ))
    }

    fn sign_up(&self, _email: &str, _password: &str) -> Result<(), VaultError> {
        Err(VaultError::AuthHttp(
            "identity client not configured".to_string(),
        ))
    }

    fn authorize_url(&self, _provider: &str) -> String {
        String::new()
    }

    fn current_user(
        &self,
        _access_token: &str,
    ) -> Result<datavault_explorer::auth::AuthUser, VaultError> {
        Err(VaultError::AuthHttp(
            "identity client not configured".to_string(),
        ))
    }

    fn refresh(&self, _refresh_token: &str) -> Result<AuthSession, VaultError> {
        Err(VaultError::AuthHttp(
            "identity client not configured".to_string(),
        ))
    }

    fn sign_out(&self, _access_token: &str) -> Result<(), VaultError> {
        Err(VaultError::AuthHttp(
            "identity client not configured".to_string(),
        ))
    }
}

impl SettingsClient for NopSettings {
    fn get(&self, _user: &UserId, _setting_type: SettingType) -> Result<Option<Value>, VaultError> {
        Err(VaultError::SettingsHttp(
            "settings client not configured".to_string(),
        ))
    }

    fn upsert(
        &self,
        _user: &UserId,
        _setting_type: SettingType,
        _settings: Value,
    ) -> Result<(), VaultError> {
        Err(VaultError::SettingsHttp(
            "settings client not configured".to_string(),
        ))
    }

    fn delete(&self, _user: &UserId, _setting_type: SettingType) -> Result<(), VaultError> {
        Err(VaultError::SettingsHttp(
            "settings client not configured".to_string(),
        ))
    }

    fn subdomain_taken(
        &self,
        _subdomain: &str,
        _requesting_user: &UserId,
    ) -> Result<bool, VaultError> {
        Err(VaultError::SettingsHttp(
            "settings client not configured".to_string(),
        ))
    }
}

impl BackendClient for NopBackend {
    fn data_summary(&self, _bucket_path: &str, _api_key: &str) -> ApiReply {
        ApiReply::Unreachable("backend client not configured".to_string())
    }

    fn data_stats(&self, _bucket_path: &str, _api_key: &str) -> ApiReply {
        ApiReply::Unreachable("backend client not configured".to_string())
    }

    fn data_head(&self, _bucket_path: &str, _api_key: &str, _n: usize) -> ApiReply {
        ApiReply::Unreachable("backend client not configured".to_string())
    }

    fn generate_key(&self, _access_token: &str) -> Result<ApiKeyGrant, VaultError> {
        Err(VaultError::BackendUnreachable(
            "backend client not configured".to_string(),
        ))
    }

    fn docs(&self, _user: &UserId) -> Result<datavault_explorer::backend::ApiDocs, VaultError> {
        Err(VaultError::BackendUnreachable(
            "backend client not configured".to_string(),
        ))
    }
}
