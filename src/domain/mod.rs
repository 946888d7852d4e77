mod email;
mod job;

pub use email::Email;
pub use job::{ImportMode, JobStatus};
