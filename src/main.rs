use std::fmt::Debug;
use std::fmt::Display;

use bulk_import_service::configuration::get_configuration;
use bulk_import_service::queue::Broker;
use bulk_import_service::repository::JobRepository;
use bulk_import_service::startup::get_connection_pool;
use bulk_import_service::startup::Application;
use bulk_import_service::storage::StorageGateway;
use bulk_import_service::telemetry::get_subscriber;
use bulk_import_service::telemetry::init_subscriber;
use bulk_import_service::worker;
use bulk_import_service::worker::WorkerContext;
use tokio::task::JoinError;

fn report_exit(name: &str, outcome: Result<Result<(), impl Debug + Display>, JoinError>) {
    match outcome {
        Ok(Ok(())) => tracing::info!("{name} exited gracefully"),
        Ok(Err(e)) => tracing::error!(error.cause_chain=?e, error.message=%e, "{name} failed (inner)"),
        Err(e) => tracing::error!(error.cause_chain=?e, error.message=%e, "{name} failed (outer)"),
    }
}

/// Initialise telemetry, load config, and race the HTTP server against the
/// import-worker consumer. Either future exiting ends the process — in
/// production these are typically split into two deployments, but the
/// consumer loop is structurally identical either way.
#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let _ = dotenvy::dotenv();

    let cfg = get_configuration().expect("failed to read configuration");

    let subscriber = get_subscriber("bulk-import-service", &cfg.log_filter, std::io::stdout);
    init_subscriber(subscriber);

    let server = Application::build(cfg.clone()).await?.run_until_stopped();

    let pool = get_connection_pool(&cfg.database);
    let storage = StorageGateway::new(&cfg.storage);
    let broker = Broker::connect(&cfg.queue.redis_url).await?;
    let worker_context = WorkerContext { pool: pool.clone(), job_repo: JobRepository::new(pool), storage, settings: cfg.worker };
    let worker_future = worker::run_consumer(broker.storage(), worker_context);

    let server_thread = tokio::spawn(server);
    let worker_thread = tokio::spawn(worker_future);

    tokio::select! {
        o = server_thread => { report_exit("API", o) },
        o = worker_thread => { report_exit("Import worker", o) },
    }

    Ok(())
}
