//! The import worker: consumes `process_import(job_id)` tasks from the
//! broker, streams the staged CSV through validation/batching, and
//! finalizes the job's terminal status.

pub mod csv_import;
pub mod errors_report;

use apalis::prelude::*;
use apalis_redis::RedisStorage;
use sqlx::PgPool;
use uuid::Uuid;

use crate::configuration::WorkerSettings;
use crate::error::WorkerFatalError;
use crate::queue::ProcessImport;
use crate::repository::JobRepository;
use crate::storage::StorageError;
use crate::storage::StorageGateway;
use crate::worker::csv_import::ImportOutcome;

#[derive(Clone)]
pub struct WorkerContext {
    pub pool: PgPool,
    pub job_repo: JobRepository,
    pub storage: StorageGateway,
    pub settings: WorkerSettings,
}

/// Guards entry (`pending -> processing` only), runs the CSV pipeline, and
/// commits the terminal status. Any starting status other than `pending`
/// means this delivery is a retry of an already-handled task — it is
/// logged and acknowledged without touching the job again.
async fn process_import(task: ProcessImport, ctx: Data<WorkerContext>) -> Result<(), Error> {
    let job_id = task.job_id;

    let started = ctx.job_repo.try_start_processing(job_id).await.map_err(|e| Error::Failed(Box::new(e)))?;
    if !started {
        tracing::warn!(%job_id, "redelivered task for a job that is not pending; skipping");
        return Ok(());
    }

    let job = match ctx.job_repo.get(job_id).await.map_err(|e| Error::Failed(Box::new(e)))? {
        Some(job) => job,
        None => {
            tracing::error!(%job_id, "job vanished after processing guard succeeded");
            return Ok(());
        }
    };

    let result = run_pipeline(&ctx, job_id, job.s3_key.clone(), job.mode).await;
    match result {
        Ok(outcome) => {
            if let Err(fatal) = finalize_success(&ctx, job_id, outcome).await {
                finalize_fatal(&ctx, job_id, fatal).await;
            }
        }
        Err(fatal) => finalize_fatal(&ctx, job_id, fatal).await,
    }

    Ok(())
}

async fn run_pipeline(
    ctx: &WorkerContext,
    job_id: Uuid,
    s3_key: String,
    mode: crate::domain::ImportMode,
) -> Result<ImportOutcome, WorkerFatalError> {
    let raw = ctx.storage.get_bytes(&s3_key).await.map_err(|e| match e {
        StorageError::ObjectMissing(key) => WorkerFatalError::StorageUnavailable(format!("missing object {key}")),
        StorageError::StorageUnavailable(msg) => WorkerFatalError::StorageUnavailable(msg),
    })?;

    csv_import::run(&ctx.pool, &ctx.job_repo, job_id, mode, &raw, &ctx.settings).await
}

async fn finalize_success(ctx: &WorkerContext, job_id: Uuid, outcome: ImportOutcome) -> Result<(), WorkerFatalError> {
    if outcome.errors.is_empty() {
        ctx.job_repo
            .finalize_done(job_id, outcome.total_rows)
            .await
            .map_err(|e| WorkerFatalError::DatabaseUnavailable(e.to_string()))?;
        tracing::info!(%job_id, total_rows = outcome.total_rows, "import completed with no errors");
        return Ok(());
    }

    let error_count = outcome.errors.len() as i64;
    let csv_bytes =
        errors_report::build_csv(&outcome.errors).map_err(|e| WorkerFatalError::BatchError(format!("failed to build error report: {e}")))?;
    let report_key = ctx
        .storage
        .put_bytes(csv_bytes, &format!("errors_{job_id}.csv"))
        .await
        .map_err(|e| match e {
            StorageError::ObjectMissing(key) => WorkerFatalError::StorageUnavailable(format!("missing object {key}")),
            StorageError::StorageUnavailable(msg) => WorkerFatalError::StorageUnavailable(msg),
        })?;
    let summary = errors_report::summarize(&outcome.errors);

    ctx.job_repo
        .finalize_failed(job_id, outcome.total_rows, &summary, Some(&report_key), error_count)
        .await
        .map_err(|e| WorkerFatalError::DatabaseUnavailable(e.to_string()))?;
    tracing::info!(%job_id, error_count, "import finished with row errors");
    Ok(())
}

/// Last-resort path: even the finalize step failed, or the pipeline raised a
/// fatal error earlier. Best-effort marks the job failed; if that commit
/// also fails the job is left `processing` for an operator to investigate.
async fn finalize_fatal(ctx: &WorkerContext, job_id: Uuid, fatal: WorkerFatalError) {
    tracing::error!(%job_id, error = %fatal, "import worker hit a fatal error");
    let processed_rows = ctx.job_repo.get(job_id).await.ok().flatten().map(|j| j.processed_rows).unwrap_or(0);
    if let Err(e) = ctx.job_repo.finalize_failed(job_id, processed_rows, &fatal.summary(), None, 0).await {
        tracing::error!(%job_id, error = %e, "failed to persist fatal job failure");
    }
}

/// Runs the consumer loop: one or more concurrent workers pulling
/// `process_import` tasks off `storage` until the process shuts down.
pub async fn run_consumer(storage: RedisStorage<ProcessImport>, context: WorkerContext) -> std::io::Result<()> {
    Monitor::new()
        .register_with_count(2, WorkerBuilder::new("import-worker").data(context).backend(storage).build_fn(process_import))
        .run()
        .await
}
