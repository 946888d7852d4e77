use std::collections::HashSet;
use std::time::Duration;

use csv::ReaderBuilder;
use csv::StringRecord;
use sqlx::PgPool;
use uuid::Uuid;

use crate::configuration::WorkerSettings;
use crate::domain::ImportMode;
use crate::error::WorkerFatalError;
use crate::repository::flush_batch;
use crate::repository::CustomerRow;
use crate::repository::JobRepository;

/// A single row-level failure, kept in detection order (source order, modulo
/// batches: flush-time conflicts surface after every parse-time error in the
/// same batch — see the error-report builder).
#[derive(Debug, Clone)]
pub struct ErrorRow {
    pub row: i64,
    pub error: String,
    pub raw: String,
}

pub struct ImportOutcome {
    pub total_rows: i64,
    pub errors: Vec<ErrorRow>,
}

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

fn decode(raw: &[u8]) -> String {
    let raw = raw.strip_prefix(&UTF8_BOM[..]).unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

fn records(raw: &[u8]) -> Result<Vec<StringRecord>, WorkerFatalError> {
    let decoded = decode(raw);
    let mut reader = ReaderBuilder::new().has_headers(false).flexible(true).from_reader(decoded.as_bytes());
    reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| WorkerFatalError::BatchError(format!("malformed csv: {e}")))
}

fn is_blank(record: &StringRecord) -> bool { record.iter().all(|f| f.trim().is_empty()) }

fn normalize(cell: Option<&str>) -> Option<String> {
    cell.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn validate_email(email: Option<&str>) -> Result<String, String> {
    let email = normalize(email);
    match email {
        None => Err("empty email".to_string()),
        Some(email) => {
            let valid = email
                .rfind('@')
                .map(|at| at > 0 && email[at + 1..].contains('.'))
                .unwrap_or(false);
            if valid {
                Ok(email)
            } else {
                Err(format!("invalid email \"{email}\""))
            }
        }
    }
}

fn join_raw(record: &StringRecord) -> String { record.iter().collect::<Vec<_>>().join(",") }

/// Streams the staged CSV through validation, in-file/in-database
/// deduplication and batched writes, reporting progress every
/// `progress_every` rows and flushing every `batch_size` rows. Returns the
/// accumulated row errors; the caller decides the job's terminal status from
/// whether any were produced.
pub async fn run(
    pool: &PgPool,
    job_repo: &JobRepository,
    job_id: Uuid,
    mode: ImportMode,
    raw_csv: &[u8],
    settings: &WorkerSettings,
) -> Result<ImportOutcome, WorkerFatalError> {
    let all = records(raw_csv)?;

    let header_pos = all.iter().position(|r| !is_blank(r));
    let data_rows: &[StringRecord] = match header_pos {
        Some(pos) => &all[pos + 1..],
        None => &[],
    };

    let total_rows = data_rows.len() as i64;
    job_repo.set_total_rows(job_id, total_rows).await.map_err(|e| WorkerFatalError::DatabaseUnavailable(e.to_string()))?;

    let mut errors = Vec::new();
    let mut seen_emails: HashSet<String> = HashSet::new();
    let mut buffer: Vec<(i64, String, CustomerRow)> = Vec::with_capacity(settings.batch_size);

    for (idx, record) in data_rows.iter().enumerate() {
        let row = (idx + 1) as i64;

        if is_blank(record) {
            errors.push(ErrorRow { row, error: "empty row".to_string(), raw: join_raw(record) });
        } else {
            match validate_email(record.get(0)) {
                Err(reason) => errors.push(ErrorRow { row, error: reason, raw: join_raw(record) }),
                Ok(email) => {
                    if seen_emails.contains(&email) {
                        errors.push(ErrorRow {
                            row,
                            error: format!("duplicate email \"{email}\" in file"),
                            raw: join_raw(record),
                        });
                    } else {
                        seen_emails.insert(email.clone());
                        buffer.push((
                            row,
                            join_raw(record),
                            CustomerRow {
                                email,
                                first_name: normalize(record.get(1)),
                                last_name: normalize(record.get(2)),
                                phone: normalize(record.get(3)),
                                city: normalize(record.get(4)),
                            },
                        ));
                    }
                }
            }
        }

        if buffer.len() >= settings.batch_size {
            let flushed = std::mem::take(&mut buffer);
            let rejected = flush_batch(pool, mode, flushed).await.map_err(|e| WorkerFatalError::BatchError(e.to_string()))?;
            for (row, reason, raw) in rejected {
                errors.push(ErrorRow { row, error: reason, raw });
            }
        }

        if row % settings.progress_every as i64 == 0 {
            job_repo.bump_processed_rows(job_id, row).await.map_err(|e| WorkerFatalError::DatabaseUnavailable(e.to_string()))?;
        }

        if settings.import_slow_ms > 0 {
            tokio::time::sleep(Duration::from_millis(settings.import_slow_ms)).await;
        }
    }

    if !buffer.is_empty() {
        let rejected = flush_batch(pool, mode, buffer).await.map_err(|e| WorkerFatalError::BatchError(e.to_string()))?;
        for (row, reason, raw) in rejected {
            errors.push(ErrorRow { row, error: reason, raw });
        }
    }

    Ok(ImportOutcome { total_rows, errors })
}
