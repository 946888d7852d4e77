use bulk_import_service::authentication::hash_password;
use bulk_import_service::configuration::get_configuration;
use bulk_import_service::configuration::DatabaseSettings;
use bulk_import_service::queue::Broker;
use bulk_import_service::repository::JobRepository;
use bulk_import_service::startup::get_connection_pool;
use bulk_import_service::startup::Application;
use bulk_import_service::storage::StorageGateway;
use bulk_import_service::telemetry::get_subscriber;
use bulk_import_service::telemetry::init_subscriber;
use bulk_import_service::worker;
use bulk_import_service::worker::WorkerContext;
use once_cell::sync::Lazy;
use secrecy::Secret;
use sqlx::Connection;
use sqlx::Executor;
use sqlx::PgConnection;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

static TRACING: Lazy<()> = Lazy::new(|| match std::env::var("TEST_LOG") {
    Ok(_) => init_subscriber(get_subscriber("test", "debug", std::io::stdout)),
    Err(_) => init_subscriber(get_subscriber("test", "debug", std::io::sink)),
});

pub struct TestApp {
    pub addr: String,
    pub port: u16,
    pub pool: PgPool,
    pub test_user: TestUser,
}

/// A registered user, created directly against the users table (bypassing
/// the HTTP registration endpoint) so tests can assume a ready-to-use
/// credential pair.
pub struct TestUser {
    pub user_id: Uuid,
    pub email: String,
    pub password: String,
}

impl TestUser {
    pub fn generate() -> Self {
        Self { user_id: Uuid::new_v4(), email: format!("{}@example.com", Uuid::new_v4()), password: Uuid::new_v4().to_string() }
    }

    async fn store(&self, pool: &PgPool) {
        let hashed = hash_password(Secret::new(self.password.clone())).expect("failed to hash test password");
        sqlx::query!(
            "INSERT INTO users (id, email, hashed_password, created_at) VALUES ($1, $2, $3, now())",
            self.user_id,
            self.email,
            secrecy::ExposeSecret::expose_secret(&hashed),
        )
        .execute(pool)
        .await
        .unwrap();
    }
}

impl TestApp {
    /// Registers a second user through the public HTTP surface (rather than
    /// `TestUser::store`'s direct insert) and returns a bearer token for
    /// them. Used by tests that need to assert cross-user isolation.
    pub async fn register_and_login(&self, user: &TestUser) -> String {
        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{}/auth/register", self.addr))
            .json(&serde_json::json!({ "email": user.email, "password": user.password }))
            .send()
            .await
            .expect("execute request");
        assert!(resp.status().is_success(), "registration failed: {}", resp.status());

        let resp = client
            .post(format!("{}/auth/token", self.addr))
            .json(&serde_json::json!({ "email": user.email, "password": user.password }))
            .send()
            .await
            .expect("execute request");
        assert!(resp.status().is_success());
        let body: serde_json::Value = resp.json().await.unwrap();
        body["access_token"].as_str().unwrap().to_string()
    }

    pub async fn token(&self) -> String {
        let resp = reqwest::Client::new()
            .post(format!("{}/auth/token", self.addr))
            .json(&serde_json::json!({ "email": self.test_user.email, "password": self.test_user.password }))
            .send()
            .await
            .expect("execute request");
        assert!(resp.status().is_success());
        let body: serde_json::Value = resp.json().await.unwrap();
        body["access_token"].as_str().unwrap().to_string()
    }

    pub async fn post_import(&self, token: &str, idempotency_key: &str, mode: &str, filename: &str, csv_body: &str) -> reqwest::Response {
        let part = reqwest::multipart::Part::text(csv_body.to_string()).file_name(filename.to_string()).mime_str("text/csv").unwrap();
        let form = reqwest::multipart::Form::new().part("file", part);

        reqwest::Client::new()
            .post(format!("{}/imports?mode={}", self.addr, mode))
            .bearer_auth(token)
            .header("Idempotency-Key", idempotency_key)
            .multipart(form)
            .send()
            .await
            .expect("execute request")
    }

    pub async fn get_import(&self, token: &str, id: Uuid) -> reqwest::Response {
        reqwest::Client::new().get(format!("{}/imports/{}", self.addr, id)).bearer_auth(token).send().await.expect("execute request")
    }

    pub async fn get_import_errors(&self, token: &str, id: Uuid) -> reqwest::Response {
        reqwest::Client::new()
            .get(format!("{}/imports/{}/errors", self.addr, id))
            .bearer_auth(token)
            .send()
            .await
            .expect("execute request")
    }

    /// Polls `GET /imports/{id}` until the worker moves it out of
    /// `pending`/`processing`, or panics after a few seconds. The worker
    /// consumer runs concurrently in-process (see `spawn_app`), so this is
    /// just waiting out a real (if short) queue round trip.
    pub async fn wait_for_terminal_status(&self, token: &str, id: Uuid) -> serde_json::Value {
        for _ in 0..100 {
            let resp = self.get_import(token, id).await;
            let body: serde_json::Value = resp.json().await.unwrap();
            if matches!(body["status"].as_str(), Some("done") | Some("failed")) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("import job {id} did not reach a terminal status in time");
    }
}

/// Creates a freshly migrated, randomly named Postgres database for one
/// test's exclusive use.
async fn configure_database(cfg: &DatabaseSettings) -> PgPool {
    let mut conn = PgConnection::connect_with(&secrecy::ExposeSecret::expose_secret(&cfg.connection_string_without_db()).parse().unwrap())
        .await
        .expect("postgres must be running");

    conn.execute(format!(r#"CREATE DATABASE "{}";"#, cfg.database_name).as_str()).await.unwrap();

    let pool = PgPool::connect(secrecy::ExposeSecret::expose_secret(&cfg.connection_string())).await.unwrap();
    sqlx::migrate!().run(&pool).await.expect("failed to migrate");
    pool
}

/// Spawns the application against a fresh database and a randomly named
/// storage bucket (the broker is a real local Redis instance, shared across
/// tests — jobs are addressed by unique ids, so no per-test isolation is
/// needed there). Object storage and broker endpoints are read from
/// `configuration.yaml`/environment overrides same as production; CI points
/// them at a local MinIO/Redis.
pub async fn spawn_app() -> TestApp {
    Lazy::force(&TRACING);

    let cfg = {
        let mut cfg = get_configuration().expect("failed to read configuration");
        cfg.database.database_name = Uuid::new_v4().to_string();
        cfg.storage.s3_bucket = format!("test-{}", Uuid::new_v4());
        cfg.application_port = 0;
        cfg
    };

    let _pool = configure_database(&cfg.database).await;

    let app = Application::build(cfg.clone()).await.expect("failed to build application");
    let port = app.get_port();
    let addr = format!("http://127.0.0.1:{port}");

    let pool = get_connection_pool(&cfg.database);
    tokio::spawn(app.run_until_stopped());

    let broker = Broker::connect(&cfg.queue.redis_url).await.expect("redis must be running");
    let worker_context = WorkerContext {
        pool: pool.clone(),
        job_repo: JobRepository::new(pool.clone()),
        storage: StorageGateway::new(&cfg.storage),
        settings: cfg.worker.clone(),
    };
    tokio::spawn(worker::run_consumer(broker.storage(), worker_context));

    let test_user = TestUser::generate();
    test_user.store(&pool).await;

    TestApp { addr, port, pool, test_user }
}
