mod auth;
mod health_check;
mod imports;

pub use auth::register;
pub use auth::token;
pub use health_check::health_check;
pub use imports::create_import;
pub use imports::get_import;
pub use imports::get_import_errors;
