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

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, JsonRejection, QueryRejection},
        DefaultBodyLimit, Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use datamind::{
    DataEngine, DataMindError, ExportFormat, OperationRequest, SessionKey,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DataEngine>,
    pub request_timeout: Duration,
}
impl AppState {
    pub fn new(engine: DataEngine) -> Self {
        let request_timeout = Duration::from_secs(engine.config().server.request_timeout_secs.max(1));
        Self {
            engine: Arc::new(engine),
            request_timeout,
        }
    }
}
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub status: &'static str,
    pub code: String,
    pub message: String,
    pub request_id: String,
    #[serde(skip)]
    http_status: StatusCode,
}
impl ApiError {
    fn new(http_status: StatusCode, code: &str, message: String) -> Self {
        Self {
            status: "error",
            code: code.to_string(),
            message,
            request_id: Uuid::new_v4().to_string(),
            http_status,
        }
    }
    pub fn http_status(&self) -> StatusCode {
        self.http_status
    }
}
impl From<DataMindError> for ApiError {
    fn from(e: DataMindError) -> Self {
        let http_status = match &e {
            DataMindError::NotFound { .. } => StatusCode::NOT_FOUND,
            DataMindError::NothingToRevert { .. } => StatusCode::CONFLICT,
            e if e.is_validation() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if http_status.is_server_error() {
            warn!(code = e.code(), error = %e, "Request failed");
        }
        Self::new(http_status, e.code(), e.to_string())
    }
}
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.http_status;
        (status, Json(self)).into_response()
    }
}
macro_rules! rejection_into_api_error {
    ($($rejection:ty => $code:literal),* $(,)?) => {$(
        impl From<$rejection> for ApiError {
            fn from(rejection: $rejection) -> Self {
                Self::new(rejection.status(), $code, rejection.body_text())
            }
        }
    )*};
}
rejection_into_api_error! {
    JsonRejection => "INVALID_BODY",
    BytesRejection => "INVALID_BODY",
    QueryRejection => "INVALID_QUERY",
}
fn join_failed(join: tokio::task::JoinError) -> ApiError {
    ApiError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "OPERATION_FAILED",
        join.to_string(),
    )
}
/// Runs read-only engine work off the async executor, bounded by the configured request timeout.
async fn run_blocking<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&DataEngine) -> datamind::Result<T> + Send + 'static,
{
    let engine = state.engine.clone();
    let task = tokio::task::spawn_blocking(move || work(&engine));
    match tokio::time::timeout(state.request_timeout, task).await {
        Ok(Ok(result)) => result.map_err(ApiError::from),
        Ok(Err(join)) => Err(join_failed(join)),
        Err(_) => Err(ApiError::new(
            StatusCode::GATEWAY_TIMEOUT,
            "REQUEST_TIMEOUT",
            format!("request exceeded {}s", state.request_timeout.as_secs()),
        )),
    }
}
/// Runs a mutation to completion; the response always reports what was committed.
async fn run_mutation<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&DataEngine) -> datamind::Result<T> + Send + 'static,
{
    let engine = state.engine.clone();
    let started = Instant::now();
    let joined = tokio::task::spawn_blocking(move || work(&engine)).await;
    let elapsed = started.elapsed();
    if elapsed > state.request_timeout {
        warn!(
            elapsed_ms = elapsed.as_millis() as u64,
            timeout_secs = state.request_timeout.as_secs(),
            "Mutation outlived the request timeout"
        );
    }
    joined.map_err(join_failed)?.map_err(ApiError::from)
}
fn session(user: String, file: String) -> SessionKey {
    SessionKey::new(user, file)
}
async fn health(State(state): State<AppState>) -> Result<Json<JsonValue>, ApiError> {
    let sessions = run_blocking(&state, |engine| engine.sessions()).await?;
    Ok(Json(json!({ "status": "ok", "sessions": sessions.len() })))
}
async fn list_sessions(State(state): State<AppState>) -> Result<Json<Vec<SessionKey>>, ApiError> {
    Ok(Json(run_blocking(&state, |engine| engine.sessions()).await?))
}
async fn load_dataset(
    State(state): State<AppState>,
    Path((user, file)): Path<(String, String)>,
    body: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = body?;
    let key = session(user, file);
    let result = run_mutation(&state, move |engine| engine.load_dataset(&key, &body)).await?;
    Ok((StatusCode::CREATED, Json(result)))
}
async fn remove_dataset(
    State(state): State<AppState>,
    Path((user, file)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let key = session(user, file);
    run_mutation(&state, move |engine| engine.remove_dataset(&key)).await?;
    Ok(StatusCode::NO_CONTENT)
}
async fn get_dataset(
    State(state): State<AppState>,
    Path((user, file)): Path<(String, String)>,
) -> Result<Json<JsonValue>, ApiError> {
    let key = session(user, file);
    run_blocking(&state, move |engine| {
        let version = engine.current_version(&key)?;
        let dataset = engine.get_current(&key)?;
        Ok(Json(json!({
            "version": version,
            "state": engine.session_state(&key)?,
            "schema": dataset.schema(),
            "records": dataset.to_records(),
        })))
    })
    .await
}
fn parse_request(body: JsonValue) -> Result<OperationRequest, ApiError> {
    OperationRequest::from_value(body).map_err(ApiError::from)
}
async fn apply_operation(
    State(state): State<AppState>,
    Path((user, file)): Path<(String, String)>,
    payload: Result<Json<JsonValue>, JsonRejection>,
) -> Result<Json<datamind::OperationResult>, ApiError> {
    let Json(body) = payload?;
    let request = parse_request(body)?;
    let key = session(user, file);
    info!(key = %key, op = %request.kind(), "Apply requested");
    let result = run_mutation(&state, move |engine| engine.apply_operation(&key, &request)).await?;
    Ok(Json(result))
}
async fn preview_operation(
    State(state): State<AppState>,
    Path((user, file)): Path<(String, String)>,
    payload: Result<Json<JsonValue>, JsonRejection>,
) -> Result<Json<JsonValue>, ApiError> {
    let Json(body) = payload?;
    let request = parse_request(body)?;
    let key = session(user, file);
    run_blocking(&state, move |engine| {
        let preview = engine.preview_operation(&key, &request)?;
        Ok(Json(json!({
            "result": preview.result,
            "schema": preview.dataset.schema(),
            "records": preview.dataset.to_records(),
        })))
    })
    .await
}
async fn revert(
    State(state): State<AppState>,
    Path((user, file)): Path<(String, String)>,
) -> Result<Json<datamind::OperationResult>, ApiError> {
    let key = session(user, file);
    Ok(Json(run_mutation(&state, move |engine| engine.revert(&key)).await?))
}
async fn history(
    State(state): State<AppState>,
    Path((user, file)): Path<(String, String)>,
) -> Result<Json<JsonValue>, ApiError> {
    let key = session(user, file);
    run_blocking(&state, move |engine| {
        Ok(Json(json!({
            "state": engine.session_state(&key)?,
            "entries": engine.history(&key)?,
        })))
    })
    .await
}
async fn summary(
    State(state): State<AppState>,
    Path((user, file)): Path<(String, String)>,
) -> Result<Json<datamind::Summary>, ApiError> {
    let key = session(user, file);
    Ok(Json(run_blocking(&state, move |engine| engine.summarize(&key)).await?))
}
async fn analysis(
    State(state): State<AppState>,
    Path((user, file)): Path<(String, String)>,
) -> Result<Json<datamind::AnalysisReport>, ApiError> {
    let key = session(user, file);
    Ok(Json(run_blocking(&state, move |engine| engine.analyze(&key)).await?))
}
#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}
async fn export(
    State(state): State<AppState>,
    Path((user, file)): Path<(String, String)>,
    query: Result<Query<ExportQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let format: ExportFormat = query.format.as_deref().unwrap_or("csv").parse()?;
    let stem = std::path::Path::new(&file)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file.clone());
    let key = session(user, file);
    let bytes = run_blocking(&state, move |engine| engine.export(&key, format)).await?;
    let disposition = format!("attachment; filename=\"{stem}.{}\"", format.extension());
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.engine.config().limits.max_upload_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/datasets", get(list_sessions))
        .route(
            "/datasets/{user}/{file}",
            get(get_dataset).put(load_dataset).delete(remove_dataset),
        )
        .route("/datasets/{user}/{file}/operations", post(apply_operation))
        .route("/datasets/{user}/{file}/preview", post(preview_operation))
        .route("/datasets/{user}/{file}/revert", post(revert))
        .route("/datasets/{user}/{file}/history", get(history))
        .route("/datasets/{user}/{file}/summary", get(summary))
        .route("/datasets/{user}/{file}/analysis", get(analysis))
        .route("/datasets/{user}/{file}/export", get(export))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
