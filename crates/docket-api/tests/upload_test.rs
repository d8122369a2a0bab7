//! Gateway HTTP tests over the in-memory broker.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use docket_api::{build_router, AppState};
use docket_broker::MemoryBroker;
use docket_core::{BrokerConfig, GatewayConfig, PathMessage, UploadId};
use serde_json::{json, Value};
use tempfile::TempDir;

const UPLOAD: &str = "/api/v1/extkafka/upload";

struct Gateway {
    server: TestServer,
    broker: MemoryBroker,
    staging: PathBuf,
    _dir: TempDir,
}

fn config(staging: &Path, max_upload_size_bytes: u64) -> GatewayConfig {
    GatewayConfig {
        server_port: 0,
        environment: "test".to_string(),
        api_base_path: "/api".to_string(),
        api_version: "v1".to_string(),
        staging_dir: staging.to_path_buf(),
        max_upload_size_bytes,
        http_timeout_secs: 60,
        path_topic: "path".to_string(),
        broker: BrokerConfig::memory(),
    }
}

fn gateway_with_limit(max_upload_size_bytes: u64) -> Gateway {
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("uploads");
    std::fs::create_dir_all(&staging).unwrap();
    let broker = MemoryBroker::new();
    let state = Arc::new(AppState::new(
        config(&staging, max_upload_size_bytes),
        Arc::new(broker.clone()),
    ));
    let server = TestServer::new(build_router(state)).unwrap();
    Gateway {
        server,
        broker,
        staging,
        _dir: dir,
    }
}

fn gateway() -> Gateway {
    gateway_with_limit(10 * 1024 * 1024)
}

fn file_part(data: &[u8], file_name: &str) -> Part {
    Part::bytes(data.to_vec())
        .file_name(file_name)
        .mime_type("application/octet-stream")
}

fn staged_files(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}

#[tokio::test]
async fn upload_is_staged_and_announced() {
    let gw = gateway();
    let data = b"id,label\n1,cat\n2,dog\n".to_vec();
    let user_id = "5a0c1f7e-9d4b-4b8e-a7c2-1d2e3f4a5b6c";
    let form = MultipartForm::new()
        .add_text("name", "pets")
        .add_text("formData", json!({"type": 2, "title": "Pets"}).to_string())
        .add_text("userName", "ada")
        .add_text("userId", user_id)
        .add_part("uploadFile", file_part(&data, "pets.csv"));

    let response = gw.server.post(UPLOAD).multipart(form).await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["message"], "File uploaded successfully");
    assert_eq!(body["file_size"], data.len() as u64);

    let file_name = body["file_name"].as_str().unwrap();
    assert!(file_name.ends_with(".csv"));
    let file_path = PathBuf::from(body["file_path"].as_str().unwrap());
    assert_eq!(file_path, gw.staging.join(file_name));
    assert_eq!(std::fs::read(&file_path).unwrap(), data);

    let upload_id: UploadId = body["upload_id"].as_str().unwrap().parse().unwrap();
    let announced = gw.broker.messages_for_key("path", &upload_id.message_key());
    assert_eq!(announced.len(), 1);
    let message = PathMessage::from_slice(&announced[0].payload).unwrap();
    assert_eq!(message.uuid, upload_id);
    assert_eq!(message.name, "pets");
    assert_eq!(message.filesize, data.len() as i64);
    assert_eq!(message.filepath, file_path.to_string_lossy());
    assert!(message.form_data.form_type.is_dataset());
    assert_eq!(message.form_data.fields["title"], "Pets");
    assert_eq!(message.user_name, "ada");
    assert_eq!(message.user_id, user_id);
}

#[tokio::test]
async fn name_defaults_to_the_original_file_name() {
    let gw = gateway();
    let form = MultipartForm::new().add_part("uploadFile", file_part(b"x", "readings.parquet"));

    let response = gw.server.post(UPLOAD).multipart(form).await;
    assert_eq!(response.status_code(), 200);

    let announced = gw.broker.messages("path");
    let message = PathMessage::from_slice(&announced[0].payload).unwrap();
    assert_eq!(message.name, "readings.parquet");
    assert!(!message.form_data.has_fields());
    assert!(message.user_id.is_empty());
}

#[tokio::test]
async fn missing_file_is_rejected() {
    let gw = gateway();
    let form = MultipartForm::new().add_text("name", "nothing");

    let response = gw.server.post(UPLOAD).multipart(form).await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["error"], "no file provided");
    assert_eq!(body["code"], "BAD_REQUEST");
    assert!(gw.broker.messages("path").is_empty());
}

#[tokio::test]
async fn oversized_file_is_rejected_and_removed() {
    let gw = gateway_with_limit(1024);
    let form = MultipartForm::new().add_part("uploadFile", file_part(&vec![0u8; 4096], "big.bin"));

    let response = gw.server.post(UPLOAD).multipart(form).await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["error"], "file too large");
    assert_eq!(body["code"], "FILE_TOO_LARGE");

    assert!(staged_files(&gw.staging).is_empty());
    assert!(gw.broker.messages("path").is_empty());
}

#[tokio::test]
async fn invalid_user_id_after_the_file_removes_it() {
    let gw = gateway();
    let form = MultipartForm::new()
        .add_part("uploadFile", file_part(b"payload", "data.bin"))
        .add_text("userId", "not-a-uuid");

    let response = gw.server.post(UPLOAD).multipart(form).await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_INPUT");

    assert!(staged_files(&gw.staging).is_empty());
    assert!(gw.broker.messages("path").is_empty());
}

#[tokio::test]
async fn malformed_form_data_is_rejected() {
    let gw = gateway();
    let form = MultipartForm::new()
        .add_text("formData", "{not json")
        .add_part("uploadFile", file_part(b"payload", "data.bin"));

    let response = gw.server.post(UPLOAD).multipart(form).await;
    assert_eq!(response.status_code(), 400);
    assert!(gw.broker.messages("path").is_empty());
}

#[tokio::test]
async fn oversized_text_field_is_rejected_and_file_removed() {
    let gw = gateway();
    let huge_title = "x".repeat(300 * 1024);
    let form = MultipartForm::new()
        .add_part("uploadFile", file_part(b"payload", "data.bin"))
        .add_text("formData", json!({"type": 1, "title": huge_title}).to_string());

    let response = gw.server.post(UPLOAD).multipart(form).await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_INPUT");

    assert!(staged_files(&gw.staging).is_empty());
    assert!(gw.broker.messages("path").is_empty());
}

#[tokio::test]
async fn broker_failure_is_a_server_error_and_cleans_up() {
    let gw = gateway();
    gw.broker.close();
    let form = MultipartForm::new().add_part("uploadFile", file_part(b"payload", "data.bin"));

    let response = gw.server.post(UPLOAD).multipart(form).await;
    assert_eq!(response.status_code(), 500);
    let body: Value = response.json();
    assert_eq!(body["code"], "BROKER_ERROR");
    assert_eq!(body["recoverable"], true);
    assert!(staged_files(&gw.staging).is_empty());
}

#[tokio::test]
async fn liveness_and_request_id() {
    let gw = gateway();
    let response = gw.server.get("/api/v1/extkafka/test").await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>(), json!({"status": "alive"}));
    assert!(!response.header("x-request-id").is_empty());
}

#[tokio::test]
async fn openapi_document_is_served() {
    let gw = gateway();
    let response = gw.server.get("/api-docs/openapi.json").await;
    assert_eq!(response.status_code(), 200);
    let doc: Value = response.json();
    assert!(doc["paths"].get(UPLOAD).is_some());
}
