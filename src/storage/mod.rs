//! Object store gateway: stages raw CSV uploads, serves them back to the
//! worker, and mints presigned download links for error reports.

use std::time::Duration;

use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use secrecy::ExposeSecret;
use uuid::Uuid;

use crate::configuration::StorageSettings;

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("object not found: {0}")]
    ObjectMissing(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

const NOT_FOUND_CODES: &[&str] = &["404", "NoSuchBucket", "NotFound", "NoSuchKey"];
const IGNORE_CREATE_CODES: &[&str] = &["BucketAlreadyOwnedByYou", "BucketAlreadyExists"];

/// Wraps two S3 clients against the same bucket: one addressed at the
/// internal endpoint (used for `put_bytes`/`get_bytes`/bucket provisioning),
/// one addressed at the public endpoint when configured (used only to sign
/// `presign_get` URLs so they resolve from outside the cluster).
#[derive(Clone)]
pub struct StorageGateway {
    client: Client,
    public_client: Client,
    bucket: String,
    presign_ttl: Duration,
}

fn build_client(endpoint: &str, settings: &StorageSettings) -> Client {
    let credentials = Credentials::new(
        settings.s3_access_key.clone(),
        settings.s3_secret_key.expose_secret().to_string(),
        None,
        None,
        "bulk-import-service",
    );
    let config = aws_sdk_s3::Config::builder()
        .endpoint_url(endpoint)
        .region(aws_sdk_s3::config::Region::new(settings.s3_region.clone()))
        .credentials_provider(credentials)
        .force_path_style(true)
        .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
        .build();
    Client::from_conf(config)
}

impl StorageGateway {
    pub fn new(settings: &StorageSettings) -> Self {
        let public_endpoint = settings.s3_public_endpoint_url.as_deref().unwrap_or(&settings.s3_endpoint_url);
        Self {
            client: build_client(&settings.s3_endpoint_url, settings),
            public_client: build_client(public_endpoint, settings),
            bucket: settings.s3_bucket.clone(),
            presign_ttl: Duration::from_secs(settings.s3_presign_ttl_seconds),
        }
    }

    fn error_code(err: &aws_sdk_s3::error::SdkError<impl aws_smithy_runtime_api::client::result::ProvideErrorMetadata>) -> String {
        err.as_service_error()
            .and_then(|e| aws_smithy_runtime_api::client::result::ProvideErrorMetadata::code(e))
            .unwrap_or_default()
            .to_string()
    }

    /// Idempotently ensures the configured bucket exists. Tolerates "already
    /// owned"/"already exists" on create, and anything but not-found on the
    /// preceding `head_bucket` probe.
    pub async fn ensure_bucket(&self) -> Result<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => return Ok(()),
            Err(e) => {
                let code = Self::error_code(&e);
                if !NOT_FOUND_CODES.contains(&code.as_str()) {
                    return Err(StorageError::StorageUnavailable(e.to_string()));
                }
            }
        }
        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let code = Self::error_code(&e);
                if IGNORE_CREATE_CODES.contains(&code.as_str()) {
                    Ok(())
                } else {
                    Err(StorageError::StorageUnavailable(e.to_string()))
                }
            }
        }
    }

    /// Sanitizes `filename`, generates a unique `imports/<uuid>_<safe-name>`
    /// key, and uploads `data` under it. Returns the key.
    pub async fn put_bytes(&self, data: Vec<u8>, filename: &str) -> Result<String> {
        let safe_name = sanitize_filename(filename);
        let key = format!("imports/{}_{}", Uuid::new_v4(), safe_name);

        self.ensure_bucket().await?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::StorageUnavailable(e.to_string()))?;

        Ok(key)
    }

    /// Fetches exactly the bytes previously stored under `key`.
    pub async fn get_bytes(&self, key: &str) -> Result<Vec<u8>> {
        self.ensure_bucket().await?;

        let output = self.client.get_object().bucket(&self.bucket).key(key).send().await.map_err(|e| {
            let code = Self::error_code(&e);
            if NOT_FOUND_CODES.contains(&code.as_str()) {
                StorageError::ObjectMissing(key.to_string())
            } else {
                StorageError::StorageUnavailable(e.to_string())
            }
        })?;

        let bytes = output.body.collect().await.map_err(|e| StorageError::StorageUnavailable(e.to_string()))?;
        Ok(bytes.into_bytes().to_vec())
    }

    /// Mints a time-bounded URL for `key` that, when fetched, returns the
    /// object with a `Content-Disposition: attachment` header forcing
    /// `download_filename`.
    pub async fn presign_get(&self, key: &str, download_filename: &str) -> Result<String> {
        let presigning = PresigningConfig::expires_in(self.presign_ttl).map_err(|e| StorageError::StorageUnavailable(e.to_string()))?;

        let request = self
            .public_client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .response_content_disposition(format!("attachment; filename=\"{download_filename}\""))
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::StorageUnavailable(e.to_string()))?;

        Ok(request.uri().to_string())
    }
}

/// Replaces path separators so a client-supplied filename can never escape
/// the `imports/` prefix or collide across uploads.
fn sanitize_filename(filename: &str) -> String {
    let name = if filename.trim().is_empty() { "upload.csv" } else { filename };
    name.replace(['/', '\\'], "_")
}
