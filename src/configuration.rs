use config::Config;
use config::ConfigError;
use config::Environment;
use config::FileFormat;
use secrecy::Secret;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

/// Top-level server configuration, assembled once at process start and
/// shared read-only for the lifetime of the process.
#[derive(Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub jwt: JwtSettings,
    pub queue: QueueSettings,
    pub worker: WorkerSettings,
    /// Port for the server.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub application_port: u16,
    #[serde(default = "default_application_host")]
    pub application_host: String,
    /// `tracing_subscriber::EnvFilter` directive applied at startup.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_application_host() -> String { "127.0.0.1".to_string() }
fn default_log_filter() -> String { "info".to_string() }

/// Database configuration.
#[derive(Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: Secret<String>,
    /// Port for the postgres database. This will be different from that of
    /// the server.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    /// Connection string including the database name.
    pub fn connection_string(&self) -> Secret<String> {
        Secret::new(format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username,
            secrecy::ExposeSecret::expose_secret(&self.password),
            self.host,
            self.port,
            self.database_name,
        ))
    }

    /// Connection string without a database name, for creating/dropping the
    /// database itself (used by the test harness).
    pub fn connection_string_without_db(&self) -> Secret<String> {
        Secret::new(format!(
            "postgres://{}:{}@{}:{}",
            self.username,
            secrecy::ExposeSecret::expose_secret(&self.password),
            self.host,
            self.port,
        ))
    }
}

/// Object-store (S3-compatible) configuration.
#[derive(Deserialize, Clone)]
pub struct StorageSettings {
    pub s3_endpoint_url: String,
    /// Overrides the signing endpoint for presigned URLs so they resolve
    /// from outside the cluster (e.g. a public load balancer in front of a
    /// private MinIO). Falls back to `s3_endpoint_url` when absent.
    pub s3_public_endpoint_url: Option<String>,
    pub s3_access_key: String,
    pub s3_secret_key: Secret<String>,
    pub s3_bucket: String,
    pub s3_region: String,
    #[serde(default = "default_presign_ttl")]
    pub s3_presign_ttl_seconds: u64,
}

fn default_presign_ttl() -> u64 { 3600 }

/// JWT bearer-token configuration.
#[derive(Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: Secret<String>,
    #[serde(default = "default_jwt_alg")]
    pub alg: String,
    #[serde(default = "default_jwt_ttl")]
    pub access_ttl_seconds: i64,
}

fn default_jwt_alg() -> String { "HS256".to_string() }
fn default_jwt_ttl() -> i64 { 3600 }

impl JwtSettings {
    pub fn algorithm(&self) -> jsonwebtoken::Algorithm {
        match self.alg.as_str() {
            "HS384" => jsonwebtoken::Algorithm::HS384,
            "HS512" => jsonwebtoken::Algorithm::HS512,
            _ => jsonwebtoken::Algorithm::HS256,
        }
    }
}

/// Redis broker configuration.
#[derive(Deserialize, Clone)]
pub struct QueueSettings {
    pub redis_url: Secret<String>,
}

/// Import-worker tuning knobs.
#[derive(Deserialize, Clone)]
pub struct WorkerSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
    #[serde(default)]
    pub import_slow_ms: u64,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_batch_size() -> usize { 500 }
fn default_progress_every() -> usize { 50 }
fn default_max_upload_bytes() -> usize { 50 * 1024 * 1024 }

/// Loads `configuration.yaml` from the current directory, then overlays
/// environment variables prefixed `APP_` (double-underscore separated, e.g.
/// `APP_DATABASE__PASSWORD`) so secrets and deployment-specific values never
/// need to be committed to the base file.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = Config::builder()
        .add_source(config::File::new("configuration.yaml", FileFormat::Yaml).required(false))
        .add_source(Environment::with_prefix("app").separator("__").try_parsing(true))
        .build()?;
    settings.try_deserialize()
}
