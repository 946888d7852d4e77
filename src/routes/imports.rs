use actix_multipart::Multipart;
use actix_web::web;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use chrono::DateTime;
use chrono::Utc;
use futures_util::TryStreamExt;
use serde::Deserialize;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::authentication::jwt::CurrentUserId;
use crate::configuration::WorkerSettings;
use crate::domain::ImportMode;
use crate::domain::JobStatus;
use crate::error::AppError;
use crate::queue::Broker;
use crate::repository::ImportJob;
use crate::repository::JobRepoError;
use crate::repository::JobRepository;
use crate::repository::NewImportJob;
use crate::storage::StorageGateway;

#[derive(Serialize)]
pub struct JobDto {
    pub id: Uuid,
    pub status: &'static str,
    pub mode: &'static str,
    pub filename: String,
    pub total_rows: i64,
    pub processed_rows: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ImportJob> for JobDto {
    fn from(job: ImportJob) -> Self {
        Self {
            id: job.id,
            status: job.status.as_str(),
            mode: job.mode.as_str(),
            filename: job.filename,
            total_rows: job.total_rows,
            processed_rows: job.processed_rows,
            error: job.error,
            created_at: job.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct CreateImportQuery {
    pub mode: ImportModeParam,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportModeParam {
    InsertOnly,
    Upsert,
}

impl From<ImportModeParam> for ImportMode {
    fn from(value: ImportModeParam) -> Self {
        match value {
            ImportModeParam::InsertOnly => ImportMode::InsertOnly,
            ImportModeParam::Upsert => ImportMode::Upsert,
        }
    }
}

/// Reads the single uploaded file out of a multipart body. Any field
/// without a filename is ignored; only the first file field is consulted.
async fn read_uploaded_file(mut payload: Multipart) -> Result<(String, Vec<u8>), AppError> {
    while let Some(mut field) = payload.try_next().await.map_err(|e| AppError::BadRequest(e.to_string()))? {
        let filename = field.content_disposition().and_then(|cd| cd.get_filename()).map(str::to_string);
        let Some(filename) = filename else { continue };

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| AppError::BadRequest(e.to_string()))? {
            bytes.extend_from_slice(&chunk);
        }
        return Ok((filename, bytes));
    }
    Err(AppError::BadRequest("no file was uploaded".to_string()))
}

/// `POST /imports?mode={insert_only|upsert}` — stages the upload, creates
/// (or replays) a job, and enqueues it for the worker exactly once per
/// distinct `(user_id, idempotency_key)`.
#[allow(clippy::too_many_arguments)]
#[tracing::instrument(name = "Submitting an import", skip(payload, pool, storage, broker, user_id))]
pub async fn create_import(
    req: HttpRequest,
    query: web::Query<CreateImportQuery>,
    payload: Multipart,
    pool: web::Data<PgPool>,
    storage: web::Data<StorageGateway>,
    broker: web::Data<Broker>,
    worker_settings: web::Data<WorkerSettings>,
    user_id: web::ReqData<CurrentUserId>,
) -> Result<HttpResponse, AppError> {
    let user_id = *user_id.into_inner();
    let mode: ImportMode = query.into_inner().mode.into();

    let idempotency_key = req
        .headers()
        .get("Idempotency-Key")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("missing or empty Idempotency-Key header".to_string()))?
        .to_string();

    let job_repo = JobRepository::new(pool.get_ref().clone());

    if let Some(existing) = job_repo.find_by_user_and_key(user_id, &idempotency_key).await.map_err(|e| AppError::Internal(e.into()))? {
        return Ok(HttpResponse::Ok().json(JobDto::from(existing)));
    }

    let (filename, bytes) = read_uploaded_file(payload).await?;
    if bytes.is_empty() {
        return Err(AppError::BadRequest("uploaded file is empty".to_string()));
    }
    if bytes.len() > worker_settings.max_upload_bytes {
        return Err(AppError::BadRequest("uploaded file exceeds the maximum allowed size".to_string()));
    }

    let s3_key = storage.put_bytes(bytes, &filename).await.map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;

    let new_job = NewImportJob { user_id, idempotency_key: idempotency_key.clone(), mode, filename, s3_key };

    let job = match job_repo.insert(new_job).await {
        Ok(job) => job,
        Err(JobRepoError::Duplicate) => {
            // Lost the race against a concurrent submission with the same key.
            let existing = job_repo
                .find_by_user_and_key(user_id, &idempotency_key)
                .await
                .map_err(|e| AppError::Internal(e.into()))?
                .ok_or_else(|| AppError::Internal(anyhow::anyhow!("duplicate insert but no existing row found")))?;
            return Ok(HttpResponse::Ok().json(JobDto::from(existing)));
        }
        Err(JobRepoError::Other(e)) => return Err(AppError::Internal(e.into())),
    };

    if let Err(e) = broker.enqueue(job.id).await {
        let message = format!("enqueue_failed: {e}");
        job_repo.mark_failed_on_enqueue(job.id, &message).await.map_err(|e| AppError::Internal(e.into()))?;
        return Err(AppError::ServiceUnavailable(message));
    }

    Ok(HttpResponse::Created().json(JobDto::from(job)))
}

/// `GET /imports/{id}` — scoped strictly to the caller's own jobs.
pub async fn get_import(
    path: web::Path<Uuid>,
    pool: web::Data<PgPool>,
    user_id: web::ReqData<CurrentUserId>,
) -> Result<HttpResponse, AppError> {
    let job_repo = JobRepository::new(pool.get_ref().clone());
    let job = job_repo
        .get_for_user(path.into_inner(), *user_id.into_inner())
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .ok_or(AppError::NotFound)?;
    Ok(HttpResponse::Ok().json(JobDto::from(job)))
}

#[derive(Serialize)]
pub struct ErrorsUrlResponse {
    pub url: String,
}

/// `GET /imports/{id}/errors` — 409 while the job hasn't produced a report
/// yet, 404 if it never will (unknown job, or a clean `done`).
pub async fn get_import_errors(
    path: web::Path<Uuid>,
    pool: web::Data<PgPool>,
    storage: web::Data<StorageGateway>,
    user_id: web::ReqData<CurrentUserId>,
) -> Result<HttpResponse, AppError> {
    let job_repo = JobRepository::new(pool.get_ref().clone());
    let job = job_repo
        .get_for_user(path.into_inner(), *user_id.into_inner())
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .ok_or(AppError::NotFound)?;

    match job.error_report_object_key {
        Some(key) => {
            let url = storage
                .presign_get(&key, &format!("errors_{}.csv", job.id))
                .await
                .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;
            Ok(HttpResponse::Ok().json(ErrorsUrlResponse { url }))
        }
        None => match job.status {
            JobStatus::Pending | JobStatus::Processing => Err(AppError::Conflict("error report is not ready yet".to_string())),
            JobStatus::Done | JobStatus::Failed => Err(AppError::NotFound),
        },
    }
}
