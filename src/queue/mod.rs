//! Redis-backed broker carrying `process_import(job_id)` tasks from the
//! submission service to the import worker. Delivery is at-least-once; the
//! worker's status guard (`repository::JobRepository::try_start_processing`)
//! is what keeps redelivery from double-processing a job.

use apalis::prelude::*;
use apalis_redis::RedisStorage;
use secrecy::ExposeSecret;
use secrecy::Secret;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// The only payload a task ever carries — all mutable state lives in
/// Postgres, so a redelivered task reconstructs its starting point by
/// re-reading the job row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessImport {
    pub job_id: Uuid,
}

impl Job for ProcessImport {
    const NAME: &'static str = "bulk_import::process_import";
}

#[derive(thiserror::Error, Debug)]
pub enum QueueError {
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),
}

/// Thin wrapper around `apalis_redis::RedisStorage` exposing just the
/// enqueue operation the submission service needs; the worker side pulls
/// the storage handle directly for its `Monitor`/`WorkerBuilder` setup (see
/// `worker::run_consumer`).
#[derive(Clone)]
pub struct Broker {
    storage: RedisStorage<ProcessImport>,
}

impl Broker {
    pub async fn connect(redis_url: &Secret<String>) -> Result<Self, QueueError> {
        let conn = apalis_redis::connect(redis_url.expose_secret().to_string())
            .await
            .map_err(|e| QueueError::BrokerUnavailable(e.to_string()))?;
        let storage = RedisStorage::new(conn);
        Ok(Self { storage })
    }

    pub async fn enqueue(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut storage = self.storage.clone();
        storage
            .push(ProcessImport { job_id })
            .await
            .map_err(|e| QueueError::BrokerUnavailable(e.to_string()))?;
        Ok(())
    }

    pub fn storage(&self) -> RedisStorage<ProcessImport> { self.storage.clone() }
}
