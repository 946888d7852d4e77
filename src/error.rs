use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use actix_web::ResponseError;

/// Errors that can cross the HTTP boundary, per spec §7's `ClientError`
/// taxonomy. Anything that reaches a handler as `Err(AppError)` is rendered
/// straight to the client; the detail string is always safe to show (it is
/// never built from a raw driver/transport error — those are logged and
/// mapped to `Internal` instead).
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("invalid credentials")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let Self::Internal(e) = self {
            tracing::error!(error.cause_chain = ?e, error.message = %e, "unhandled error");
        }
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "detail": self.to_string() }))
    }
}

/// Fatal failures internal to the import worker: object storage, the
/// database, or the broker became unavailable mid-job. These never cross the
/// HTTP boundary directly (see spec §7) — they are caught at the worker's
/// top level, logged, and folded into `ImportJob.error` as `"<Kind>: <msg>"`.
#[derive(thiserror::Error, Debug)]
pub enum WorkerFatalError {
    #[error("StorageUnavailable: {0}")]
    StorageUnavailable(String),

    #[error("DatabaseUnavailable: {0}")]
    DatabaseUnavailable(String),

    #[error("BrokerUnavailable: {0}")]
    BrokerUnavailable(String),

    #[error("BatchError: {0}")]
    BatchError(String),
}

impl WorkerFatalError {
    /// The short `"<Kind>: <detail>"` string persisted into `ImportJob.error`.
    pub fn summary(&self) -> String { self.to_string() }
}
