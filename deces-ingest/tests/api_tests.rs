//! HTTP API tests
//!
//! Requests go through the full router with `tower::ServiceExt::oneshot`.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use deces_common::events::EventBus;
use deces_ingest::db::runs;
use deces_ingest::models::RunStatus;
use deces_ingest::{build_router, AppState};
use helpers::*;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

async fn test_app(db: &TestDb, trusted_prefix: &str) -> Router {
    let state = AppState::new(
        db.pool.clone(),
        EventBus::new(100),
        test_config(trusted_prefix),
        db.work_dir(),
    )
    .unwrap();
    build_router(state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Poll the run list until no run is live
async fn wait_for_runs(app: &Router) -> Vec<Value> {
    for _ in 0..100 {
        let (_, body) = send(app, "GET", "/import/runs", None).await;
        let runs = body.as_array().cloned().unwrap_or_default();
        let settled = !runs.is_empty()
            && runs
                .iter()
                .all(|r| r["status"] == "completed" || r["status"] == "failed");
        if settled {
            return runs;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("import did not settle");
}

#[tokio::test]
async fn test_health_reports_ok() {
    let db = create_test_db().await.unwrap();
    let app = test_app(&db, "https://www.insee.fr/").await;

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "deces-ingest");
    assert!(body["last_error"].is_null());
}

#[tokio::test]
async fn test_event_stream_is_sse() {
    let db = create_test_db().await.unwrap();
    let app = test_app(&db, "https://www.insee.fr/").await;

    let response = app
        .oneshot(Request::builder().uri("/import/events").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"), "{}", content_type);
}

#[tokio::test]
async fn test_submission_validation() {
    let db = create_test_db().await.unwrap();
    let app = test_app(&db, "https://www.insee.fr/fr/statistiques/fichier/").await;

    let (status, body) = send(
        &app,
        "POST",
        "/import",
        Some(json!({ "url": "https://evil.example.com/fr/statistiques/fichier/a.zip" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, _) = send(
        &app,
        "POST",
        "/import",
        Some(json!({ "url": "https://www.insee.fr/fr/statistiques/fichier/a.csv" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing was started
    assert!(runs::list_runs(&db.pool, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_run_is_404() {
    let db = create_test_db().await.unwrap();
    let app = test_app(&db, "https://www.insee.fr/").await;

    let (status, body) = send(&app, "GET", "/import/4242/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_run_status_fields() {
    let db = create_test_db().await.unwrap();
    let app = test_app(&db, "https://www.insee.fr/").await;

    let mut run = runs::create_run(&db.pool, "https://x/a.zip", "a.zip", Some("a.csv"), RunStatus::Checking)
        .await
        .unwrap();
    runs::set_total_records(&db.pool, run.id, 200).await.unwrap();
    runs::update_progress(&db.pool, run.id, 50).await.unwrap();
    run.transition_to(RunStatus::Processing).unwrap();
    runs::save_status(&db.pool, &run).await.unwrap();

    let (status, body) = send(&app, "GET", &format!("/import/{}/status", run.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run_id"], run.id);
    assert_eq!(body["status"], "processing");
    assert_eq!(body["records_processed"], 50);
    assert_eq!(body["total_records"], 200);
    assert_eq!(body["percentage"], 25.0);
    assert_eq!(body["inner_filename"], "a.csv");
    assert!(body["error_message"].is_null());
}

#[tokio::test]
async fn test_submit_import_end_to_end() {
    let mut lines: Vec<String> = (0..12).map(|i| data_row("LEROY", &i.to_string())).collect();
    lines.push(invalid_row("BERNARD", "99"));
    let zip = build_zip(&[("deces.csv", &extract_csv(&lines))]);
    let server = ArchiveServer::start(vec![("deces-2024.zip", zip)]).await;

    let db = create_test_db().await.unwrap();
    let app = test_app(&db, &server.prefix()).await;

    let (status, body) = send(
        &app,
        "POST",
        "/import",
        Some(json!({ "url": server.url("deces-2024.zip") })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["accepted"], true);
    assert_eq!(body["zip_filename"], "deces-2024.zip");

    let runs = wait_for_runs(&app).await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["status"], "completed");
    assert_eq!(runs[0]["records_processed"], 12);
    assert_eq!(runs[0]["total_records"], 13);

    let (status, stats) = send(&app, "GET", "/import/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["records_processed"], 12);
    assert_eq!(stats["total_records"], 13);

    // Repair the rejected row through the API
    let (_, errors) = send(&app, "GET", "/import/errors?resolved=false", None).await;
    let errors = errors.as_array().unwrap().clone();
    assert_eq!(errors.len(), 1);
    let error_id = errors[0]["id"].as_i64().unwrap();

    let (status, detail) = send(&app, "GET", &format!("/import/errors/{}", error_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["decoded"]["surname"], "BERNARD");
    assert!(!detail["rejections"].as_array().unwrap().is_empty());

    let retry = format!("/import/errors/{}/retry", error_id);
    let (status, body) = send(&app, "POST", &retry, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "UNPROCESSABLE_ENTITY");

    let mut corrections = detail["corrections"].clone();
    corrections["sex"] = json!("1");
    let (status, updated) = send(
        &app,
        "PUT",
        &format!("/import/errors/{}", error_id),
        Some(corrections.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["corrections"]["sex"], "1");

    let (status, body) = send(&app, "POST", &retry, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resolved"], true);
    assert_eq!(body["already_resolved"], false);
    assert_eq!(body["record"]["death_act"], "99");

    let (status, body) = send(&app, "POST", &retry, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["already_resolved"], true);

    // Resolved errors are read-only
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/import/errors/{}", error_id),
        Some(corrections),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    assert_eq!(count_rows(&db.pool, "deces").await, 13);
}

#[tokio::test]
async fn test_failed_background_import_sets_last_error() {
    let server = ArchiveServer::start(vec![]).await;
    let db = create_test_db().await.unwrap();
    let app = test_app(&db, &server.prefix()).await;

    let (status, _) = send(
        &app,
        "POST",
        "/import",
        Some(json!({ "url": server.url("absent.zip") })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let runs = wait_for_runs(&app).await;
    assert_eq!(runs[0]["status"], "failed");

    let mut last_error = Value::Null;
    for _ in 0..50 {
        let (_, health) = send(&app, "GET", "/health", None).await;
        last_error = health["last_error"].clone();
        if !last_error.is_null() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(last_error.as_str().unwrap().contains("absent.zip"));
}

#[tokio::test]
async fn test_unknown_error_is_404() {
    let db = create_test_db().await.unwrap();
    let app = test_app(&db, "https://www.insee.fr/").await;

    let (status, _) = send(&app, "GET", "/import/errors/77", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "POST", "/import/errors/77/retry", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "PUT", "/import/errors/77", Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
