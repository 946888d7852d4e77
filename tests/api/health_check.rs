use crate::helpers::spawn_app;

#[tokio::test]
async fn health_check_reports_ok() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{}/health", app.addr)).send().await.expect("execute request");

    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}
