use std::net::TcpListener;

use actix_web::dev::Server;
use actix_web::web;
use actix_web::App;
use actix_web::HttpServer;
use actix_web_lab::middleware::from_fn;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_actix_web::TracingLogger;

use crate::authentication::jwt::authenticate;
use crate::configuration::DatabaseSettings;
use crate::configuration::JwtSettings;
use crate::configuration::Settings;
use crate::configuration::WorkerSettings;
use crate::queue::Broker;
use crate::routes::create_import;
use crate::routes::get_import;
use crate::routes::get_import_errors;
use crate::routes::health_check;
use crate::routes::register;
use crate::routes::token;
use crate::storage::StorageGateway;

/// Wrapper for actix's `Server` with access to the bound port. Not to be
/// confused with actix's `App`!
pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    pub async fn build(cfg: Settings) -> Result<Self, anyhow::Error> {
        let addr = format!("{}:{}", cfg.application_host, cfg.application_port);
        let listener = TcpListener::bind(addr)?;
        let port = listener.local_addr().unwrap().port();

        let pool = get_connection_pool(&cfg.database);
        let storage = StorageGateway::new(&cfg.storage);
        let broker = Broker::connect(&cfg.queue.redis_url).await?;

        let server = run(listener, pool, storage, broker, cfg.jwt, cfg.worker).await?;

        Ok(Self { port, server })
    }

    pub fn get_port(&self) -> u16 { self.port }

    /// Because this consumes `self`, this should be the final function call
    /// (or passed to `tokio::spawn`).
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> { self.server.await }
}

pub fn get_connection_pool(db_cfg: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new()
        .connect_lazy(secrecy::ExposeSecret::expose_secret(&db_cfg.connection_string()))
        .expect("failed to build lazy postgres pool")
}

/// The server is not responsible for binding to an address, it only listens
/// to an already bound address. Declares all API endpoints.
pub async fn run(
    listener: TcpListener,
    pool: PgPool,
    storage: StorageGateway,
    broker: Broker,
    jwt_settings: JwtSettings,
    worker_settings: WorkerSettings,
) -> Result<Server, anyhow::Error> {
    let pool = web::Data::new(pool);
    let storage = web::Data::new(storage);
    let broker = web::Data::new(broker);
    let jwt_settings = web::Data::new(jwt_settings);
    let worker_settings = web::Data::new(worker_settings);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/health", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/token", web::post().to(token))
            .service(
                web::scope("/imports")
                    .wrap(from_fn(authenticate))
                    .route("", web::post().to(create_import))
                    .route("/{id}", web::get().to(get_import))
                    .route("/{id}/errors", web::get().to(get_import_errors)),
            )
            .app_data(pool.clone())
            .app_data(storage.clone())
            .app_data(broker.clone())
            .app_data(jwt_settings.clone())
            .app_data(worker_settings.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
