use serde::{Deserialize, Serialize};

/// `import_jobs.status`. Terminal states (`Done`, `Failed`) are never
/// transitioned out of; see `repository::JobRepository::try_start_processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[sqlx(rename = "pending")]
    Pending,
    #[sqlx(rename = "processing")]
    Processing,
    #[sqlx(rename = "done")]
    Done,
    #[sqlx(rename = "failed")]
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool { matches!(self, Self::Done | Self::Failed) }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// `import_jobs.mode`: selects which flusher the worker uses for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    #[sqlx(rename = "insert_only")]
    InsertOnly,
    #[sqlx(rename = "upsert")]
    Upsert,
}

impl ImportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InsertOnly => "insert_only",
            Self::Upsert => "upsert",
        }
    }
}

impl std::str::FromStr for ImportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert_only" => Ok(Self::InsertOnly),
            "upsert" => Ok(Self::Upsert),
            other => Err(format!("unknown import mode: {other:?}")),
        }
    }
}
