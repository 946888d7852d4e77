mod customers;
mod jobs;
mod users;

pub use customers::CustomerRow;
pub use jobs::ImportJob;
pub use jobs::JobRepoError;
pub use jobs::JobRepository;
pub use jobs::NewImportJob;
pub use customers::flush_batch;
pub use users::UserRepoError;
pub use users::UserRepository;
