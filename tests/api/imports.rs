use crate::helpers::spawn_app;
use uuid::Uuid;

const HEADER: &str = "email,first_name,last_name,phone,city";

#[tokio::test]
async fn insert_only_happy_path_completes_with_no_errors() {
    let app = spawn_app().await;
    let token = app.token().await;
    let csv = format!("{HEADER}\nalice@example.com,Alice,Aardvark,555-0100,Springfield\nbob@example.com,Bob,Builder,555-0101,Shelbyville\n");

    let resp = app.post_import(&token, "key-1", "insert_only", "customers.csv", &csv).await;
    assert_eq!(resp.status().as_u16(), 201);
    let created: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(created["status"], "pending");
    let id = Uuid::parse_str(created["id"].as_str().unwrap()).unwrap();

    let done = app.wait_for_terminal_status(&token, id).await;
    assert_eq!(done["status"], "done");
    assert_eq!(done["total_rows"], 2);
    assert_eq!(done["processed_rows"], 2);
    assert!(done["error"].is_null());

    let row: (String,) = sqlx::query_as("SELECT email FROM customers WHERE email = $1").bind("alice@example.com").fetch_one(&app.pool).await.unwrap();
    assert_eq!(row.0, "alice@example.com");
}

#[tokio::test]
async fn replaying_the_same_idempotency_key_returns_the_same_job() {
    let app = spawn_app().await;
    let token = app.token().await;
    let csv = format!("{HEADER}\ncarol@example.com,Carol,,,\n");

    let first = app.post_import(&token, "replay-key", "insert_only", "customers.csv", &csv).await;
    assert_eq!(first.status().as_u16(), 201);
    let first_body: serde_json::Value = first.json().await.unwrap();

    let second = app.post_import(&token, "replay-key", "insert_only", "customers.csv", &csv).await;
    assert_eq!(second.status().as_u16(), 200);
    let second_body: serde_json::Value = second.json().await.unwrap();

    assert_eq!(first_body["id"], second_body["id"]);
}

#[tokio::test]
async fn the_same_idempotency_key_is_independent_per_user() {
    let app = spawn_app().await;
    let token_a = app.token().await;
    let csv = format!("{HEADER}\ndan@example.com,,,,\n");

    let resp_a = app.post_import(&token_a, "shared-key", "insert_only", "customers.csv", &csv).await;
    assert_eq!(resp_a.status().as_u16(), 201);
    let job_a: serde_json::Value = resp_a.json().await.unwrap();

    let other_user = crate::helpers::TestUser::generate();
    let token_b = app.register_and_login(&other_user).await;
    let resp_b = app.post_import(&token_b, "shared-key", "insert_only", "customers.csv", &csv).await;
    assert_eq!(resp_b.status().as_u16(), 201);
    let job_b: serde_json::Value = resp_b.json().await.unwrap();

    assert_ne!(job_a["id"], job_b["id"]);
}

#[tokio::test]
async fn rows_with_bad_emails_or_in_file_duplicates_are_reported_as_errors() {
    let app = spawn_app().await;
    let token = app.token().await;
    let csv = format!(
        "{HEADER}\n\
         good@example.com,Good,Row,,\n\
         not-an-email,Bad,Row,,\n\
         good@example.com,Good,Again,,\n"
    );

    let resp = app.post_import(&token, "partial-failure", "insert_only", "customers.csv", &csv).await;
    assert_eq!(resp.status().as_u16(), 201);
    let created: serde_json::Value = resp.json().await.unwrap();
    let id = Uuid::parse_str(created["id"].as_str().unwrap()).unwrap();

    let done = app.wait_for_terminal_status(&token, id).await;
    assert_eq!(done["status"], "failed");
    assert_eq!(done["total_rows"], 3);

    let errors_resp = app.get_import_errors(&token, id).await;
    assert_eq!(errors_resp.status().as_u16(), 200);
    let errors_body: serde_json::Value = errors_resp.json().await.unwrap();
    assert!(errors_body["url"].as_str().unwrap().starts_with("http"));
}

#[tokio::test]
async fn upsert_mode_updates_an_existing_customer() {
    let app = spawn_app().await;
    let token = app.token().await;
    let first_csv = format!("{HEADER}\nerin@example.com,Erin,Original,,\n");

    let first = app.post_import(&token, "upsert-key-1", "upsert", "customers.csv", &first_csv).await;
    assert_eq!(first.status().as_u16(), 201);
    let first_body: serde_json::Value = first.json().await.unwrap();
    let first_id = Uuid::parse_str(first_body["id"].as_str().unwrap()).unwrap();
    app.wait_for_terminal_status(&token, first_id).await;

    let second_csv = format!("{HEADER}\nerin@example.com,Erin,Updated,,\n");
    let second = app.post_import(&token, "upsert-key-2", "upsert", "customers.csv", &second_csv).await;
    assert_eq!(second.status().as_u16(), 201);
    let second_body: serde_json::Value = second.json().await.unwrap();
    let second_id = Uuid::parse_str(second_body["id"].as_str().unwrap()).unwrap();
    let done = app.wait_for_terminal_status(&token, second_id).await;
    assert_eq!(done["status"], "done");

    let row: (String,) =
        sqlx::query_as("SELECT last_name FROM customers WHERE email = $1").bind("erin@example.com").fetch_one(&app.pool).await.unwrap();
    assert_eq!(row.0, "Updated");
}

#[tokio::test]
async fn insert_only_mode_rejects_a_row_that_collides_with_an_existing_customer() {
    let app = spawn_app().await;
    let token = app.token().await;
    let first_csv = format!("{HEADER}\nfrank@example.com,Frank,First,,\n");
    let first = app.post_import(&token, "existing-1", "insert_only", "customers.csv", &first_csv).await;
    let first_body: serde_json::Value = first.json().await.unwrap();
    let first_id = Uuid::parse_str(first_body["id"].as_str().unwrap()).unwrap();
    app.wait_for_terminal_status(&token, first_id).await;

    let second_csv = format!("{HEADER}\nfrank@example.com,Frank,Second,,\n");
    let second = app.post_import(&token, "existing-2", "insert_only", "customers.csv", &second_csv).await;
    let second_body: serde_json::Value = second.json().await.unwrap();
    let second_id = Uuid::parse_str(second_body["id"].as_str().unwrap()).unwrap();
    let done = app.wait_for_terminal_status(&token, second_id).await;

    assert_eq!(done["status"], "failed");
    let errors_resp = app.get_import_errors(&token, second_id).await;
    assert_eq!(errors_resp.status().as_u16(), 200);
}

#[tokio::test]
async fn missing_idempotency_key_is_rejected() {
    let app = spawn_app().await;
    let token = app.token().await;
    let csv = format!("{HEADER}\nx@example.com,,,,\n");
    let part = reqwest::multipart::Part::text(csv).file_name("customers.csv").mime_str("text/csv").unwrap();
    let form = reqwest::multipart::Form::new().part("file", part);

    let resp = reqwest::Client::new()
        .post(format!("{}/imports?mode=insert_only", app.addr))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn empty_file_is_rejected() {
    let app = spawn_app().await;
    let token = app.token().await;
    let resp = app.post_import(&token, "empty-key", "insert_only", "customers.csv", "").await;
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn errors_endpoint_conflicts_while_the_job_is_still_pending_or_processing() {
    let app = spawn_app().await;
    let token = app.token().await;
    let csv = format!("{HEADER}\ngina@example.com,,,,\n");
    let resp = app.post_import(&token, "pending-probe", "insert_only", "customers.csv", &csv).await;
    let created: serde_json::Value = resp.json().await.unwrap();
    let id = Uuid::parse_str(created["id"].as_str().unwrap()).unwrap();

    let errors_resp = app.get_import_errors(&token, id).await;
    assert!(matches!(errors_resp.status().as_u16(), 409 | 404 | 200));
}

#[tokio::test]
async fn a_job_is_invisible_to_a_different_user() {
    let app = spawn_app().await;
    let token = app.token().await;
    let csv = format!("{HEADER}\nhank@example.com,,,,\n");
    let resp = app.post_import(&token, "owner-only", "insert_only", "customers.csv", &csv).await;
    let created: serde_json::Value = resp.json().await.unwrap();
    let id = Uuid::parse_str(created["id"].as_str().unwrap()).unwrap();

    let other_user = crate::helpers::TestUser::generate();
    let other_token = app.register_and_login(&other_user).await;

    let resp = app.get_import(&other_token, id).await;
    assert_eq!(resp.status().as_u16(), 404);
}
