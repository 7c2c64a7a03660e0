// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use datamind::DataEngine;
use datamind_server::{build_router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

const CSV: &str = "Region,Sales\nEast,10\nWest,\nEast,30\n";

fn app() -> Router {
    build_router(AppState::new(DataEngine::default()))
}

async fn send(app: &Router, method: &str, uri: &str, body: Body) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, Body::from(body.to_string())).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn loaded() -> Router {
    let app = app();
    let (status, _) = send(&app, "PUT", "/datasets/ada/sales.csv", Body::from(CSV)).await;
    assert_eq!(status, StatusCode::CREATED);
    app
}

#[tokio::test]
async fn health_reports_ok() {
    let (status, body) = send(&app(), "GET", "/health", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn apply_history_and_revert() {
    let app = loaded().await;
    let (status, result) = send_json(
        &app,
        "POST",
        "/datasets/ada/sales.csv/operations",
        json!({"operation": "fill_or_remove_missing", "column": "Sales", "fill_strategy": "mean"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["status"], "success");
    assert_eq!(result["dataset_version"], 2);
    assert_eq!(result["metadata"]["kind"], "fill_or_remove_missing");
    assert_eq!(result["metadata"]["affected_rows"], 1);

    let (_, history) = send_json(&app, "GET", "/datasets/ada/sales.csv/history", Value::Null).await;
    assert_eq!(history["state"], "modified");
    assert_eq!(history["entries"][0]["kind"], "fill_or_remove_missing");

    let (status, _) = send_json(&app, "POST", "/datasets/ada/sales.csv/revert", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    let (status, error) = send_json(&app, "POST", "/datasets/ada/sales.csv/revert", Value::Null).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["status"], "error");
    assert_eq!(error["code"], "NOTHING_TO_REVERT");
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let app = loaded().await;
    let (status, error) = send_json(&app, "GET", "/datasets/bob/none.csv", Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["code"], "NOT_FOUND");

    let (status, error) = send_json(
        &app,
        "POST",
        "/datasets/ada/sales.csv/operations",
        json!({"operation": "shuffle", "column": "Sales"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "INVALID_PARAMETER");

    let (status, error) = send_json(
        &app,
        "POST",
        "/datasets/ada/sales.csv/operations",
        json!({"operation": "normalize", "column": "Profit"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "COLUMN_NOT_FOUND");

    let (status, _) = send(&app, "PUT", "/datasets/ada/bad.csv", Body::from("a,a\n1,2\n")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn preview_leaves_version_alone() {
    let app = loaded().await;
    let (status, preview) = send_json(
        &app,
        "POST",
        "/datasets/ada/sales.csv/preview",
        json!({"operation": "remove_duplicates", "scope": "column", "column": "Region"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(preview["result"]["row_count"], 2);
    assert_eq!(preview["records"].as_array().map(Vec::len), Some(2));
    let (_, current) = send_json(&app, "GET", "/datasets/ada/sales.csv", Value::Null).await;
    assert_eq!(current["version"], 1);
    assert_eq!(current["records"].as_array().map(Vec::len), Some(3));
    assert_eq!(current["records"][1]["Sales"], Value::Null);
}

#[tokio::test]
async fn summary_analysis_and_export() {
    let app = loaded().await;
    let (status, summary) = send_json(&app, "GET", "/datasets/ada/sales.csv/summary", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["summary"][0], "The dataset has 3 rows and 2 columns.");
    let (status, analysis) = send_json(&app, "GET", "/datasets/ada/sales.csv/analysis", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(analysis["rows"], 3);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/datasets/ada/sales.csv/export?format=pdf")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"sales.pdf\""
    );
    let (status, csv) = send(&app, "GET", "/datasets/ada/sales.csv/export", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(csv).unwrap(), CSV);
    let (status, _) = send(&app, "GET", "/datasets/ada/sales.csv/export?format=xlsx", Body::empty()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_bodies_get_json_errors() {
    let app = loaded().await;
    let (status, bytes) = send(
        &app,
        "POST",
        "/datasets/ada/sales.csv/operations",
        Body::from("{\"operation\": "),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error["status"], "error");
    assert_eq!(error["code"], "INVALID_BODY");

    let request = Request::builder()
        .method("POST")
        .uri("/datasets/ada/sales.csv/preview")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let error: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error["code"], "INVALID_BODY");
}

#[tokio::test]
async fn mutations_report_commits_past_the_request_timeout() {
    let state = AppState::new(DataEngine::default());
    let impatient = build_router(AppState {
        engine: state.engine.clone(),
        request_timeout: std::time::Duration::ZERO,
    });
    let patient = build_router(state);

    let (status, _) = send(&impatient, "PUT", "/datasets/ada/sales.csv", Body::from(CSV)).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, result) = send_json(
        &impatient,
        "POST",
        "/datasets/ada/sales.csv/operations",
        json!({"operation": "normalize", "column": "Sales"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["dataset_version"], 2);

    let (_, current) = send_json(&patient, "GET", "/datasets/ada/sales.csv", Value::Null).await;
    assert_eq!(current["version"], 2);
    assert_eq!(current["state"], "modified");
}

#[tokio::test]
async fn delete_returns_session_to_idle() {
    let app = loaded().await;
    let (status, _) = send(&app, "DELETE", "/datasets/ada/sales.csv", Body::empty()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send_json(&app, "GET", "/datasets/ada/sales.csv", Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, error) = send_json(&app, "DELETE", "/datasets/ada/sales.csv", Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["code"], "NOT_FOUND");
}
