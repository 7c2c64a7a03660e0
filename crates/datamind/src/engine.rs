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

use crate::analysis::{self, AnalysisReport};
use crate::config::EngineConfig;
use crate::data_handler::{CsvReader, DataFrame};
use crate::error::{DataMindError, Result};
use crate::export::{self, ExportFormat};
use crate::history::{HistoryEntry, HistoryRecord};
use crate::insights::{self, Summary, TrendReport};
use crate::operations::{self, OperationKind, OperationMetadata, OperationRequest, OperationResult};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error, info, instrument};
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub user: String,
    pub file: String,
}
impl SessionKey {
    pub fn new(user: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            file: file.into(),
        }
    }
}
impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user, self.file)
    }
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Ready,
    Modified,
}
/// The committed state of one session: current dataset plus its undo stack.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub dataset: Arc<DataFrame>,
    pub history: Vec<HistoryRecord>,
    pub version: u64,
}
impl SessionSnapshot {
    pub fn state(&self) -> SessionState {
        if self.history.is_empty() {
            SessionState::Ready
        } else {
            SessionState::Modified
        }
    }
}
/// Storage for session snapshots. `put` replaces the whole snapshot at once.
pub trait DatasetRepository: Send + Sync {
    fn get(&self, key: &SessionKey) -> Result<Option<Arc<SessionSnapshot>>>;
    fn put(&self, key: &SessionKey, snapshot: SessionSnapshot) -> Result<()>;
    /// Drops a session, returning whether one existed.
    fn remove(&self, key: &SessionKey) -> Result<bool>;
    fn keys(&self) -> Result<Vec<SessionKey>>;
}
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    sessions: RwLock<HashMap<SessionKey, Arc<SessionSnapshot>>>,
}
impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}
impl DatasetRepository for InMemoryRepository {
    fn get(&self, key: &SessionKey) -> Result<Option<Arc<SessionSnapshot>>> {
        let sessions = self.sessions.read()?;
        Ok(sessions.get(key).cloned())
    }
    fn put(&self, key: &SessionKey, snapshot: SessionSnapshot) -> Result<()> {
        let mut sessions = self.sessions.write()?;
        sessions.insert(key.clone(), Arc::new(snapshot));
        Ok(())
    }
    fn remove(&self, key: &SessionKey) -> Result<bool> {
        let mut sessions = self.sessions.write()?;
        Ok(sessions.remove(key).is_some())
    }
    fn keys(&self) -> Result<Vec<SessionKey>> {
        let sessions = self.sessions.read()?;
        let mut keys: Vec<SessionKey> = sessions.keys().cloned().collect();
        keys.sort_by(|a, b| (&a.user, &a.file).cmp(&(&b.user, &b.file)));
        Ok(keys)
    }
}
/// Result of a dry run: what the operation would produce, without committing it.
#[derive(Debug, Clone)]
pub struct Preview {
    pub result: OperationResult,
    pub dataset: DataFrame,
}
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
/// Runs `f`, turning a panic into `OperationFailed` so a session is never left half-updated.
fn guarded<T>(kind: OperationKind, f: impl FnOnce() -> Result<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            error!(op = %kind, reason = %reason, "Operation panicked");
            Err(DataMindError::OperationFailed {
                operation: kind.to_string(),
                reason,
            })
        }
    }
}
/// Session controller. Reads are lock-free snapshots; load, apply, revert and removal
/// on the same key are serialized through a per-key mutex.
pub struct DataEngine {
    config: EngineConfig,
    repository: Arc<dyn DatasetRepository>,
    locks: DashMap<SessionKey, Arc<Mutex<()>>>,
    csv_reader: CsvReader,
}
impl fmt::Debug for DataEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataEngine")
            .field("config", &self.config)
            .field("locked_keys", &self.locks.len())
            .finish()
    }
}
impl Default for DataEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
impl DataEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_repository(config, Arc::new(InMemoryRepository::new()))
    }
    pub fn with_repository(config: EngineConfig, repository: Arc<dyn DatasetRepository>) -> Self {
        let csv_reader = CsvReader::from_config(&config);
        Self {
            config,
            repository,
            locks: DashMap::new(),
            csv_reader,
        }
    }
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
    fn key_lock(&self, key: &SessionKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
    fn snapshot(&self, key: &SessionKey) -> Result<Arc<SessionSnapshot>> {
        self.repository
            .get(key)?
            .ok_or_else(|| DataMindError::NotFound {
                key: key.to_string(),
            })
    }
    /// Parses CSV bytes and makes them the current dataset, clearing any history.
    #[instrument(skip(self, bytes), fields(key = %key, bytes = bytes.len()))]
    pub fn load_dataset(&self, key: &SessionKey, bytes: &[u8]) -> Result<OperationResult> {
        let limit = self.config.limits.max_upload_bytes;
        if bytes.len() > limit {
            return Err(DataMindError::Parse(format!(
                "upload of {} bytes exceeds the {limit} byte limit",
                bytes.len()
            )));
        }
        let frame = self.csv_reader.read_bytes(bytes, key.file.clone())?;
        let lock = self.key_lock(key);
        let _guard = lock.lock()?;
        let version = self.repository.get(key)?.map_or(1, |s| s.version + 1);
        let result = OperationResult::success(
            OperationKind::Load,
            version,
            &frame,
            format!(
                "Loaded {} rows and {} columns",
                frame.row_count(),
                frame.column_count()
            ),
            OperationMetadata::Load {
                source: key.file.clone(),
            },
        );
        self.repository.put(
            key,
            SessionSnapshot {
                dataset: Arc::new(frame),
                history: Vec::new(),
                version,
            },
        )?;
        info!(rows = result.row_count, columns = result.column_count, version, "Dataset loaded");
        Ok(result)
    }
    /// Applies one operation and commits the new version with its undo record.
    #[instrument(skip(self, request), fields(key = %key, op = %request.kind()))]
    pub fn apply_operation(&self, key: &SessionKey, request: &OperationRequest) -> Result<OperationResult> {
        let kind = request.kind();
        self.snapshot(key)?;
        let lock = self.key_lock(key);
        let _guard = lock.lock()?;
        let current = self.snapshot(key)?;
        let applied = guarded(kind, || {
            operations::apply(&current.dataset, request, &self.config.parsing)
        })?;
        let version = current.version + 1;
        let mut history = current.history.clone();
        history.push(HistoryRecord::new(kind, version, applied.undo));
        let max_history = self.config.limits.max_history.max(1);
        if history.len() > max_history {
            let excess = history.len() - max_history;
            history.drain(..excess);
            debug!(dropped = excess, "History depth limit reached");
        }
        let result = OperationResult::success(kind, version, &applied.frame, applied.message, applied.metadata);
        self.repository.put(
            key,
            SessionSnapshot {
                dataset: Arc::new(applied.frame),
                history,
                version,
            },
        )?;
        info!(version, rows = result.row_count, columns = result.column_count, "Operation applied");
        Ok(result)
    }
    /// Runs an operation against the current version without storing anything.
    #[instrument(skip(self, request), fields(key = %key, op = %request.kind()))]
    pub fn preview_operation(&self, key: &SessionKey, request: &OperationRequest) -> Result<Preview> {
        let kind = request.kind();
        let current = self.snapshot(key)?;
        let applied = guarded(kind, || {
            operations::apply(&current.dataset, request, &self.config.parsing)
        })?;
        let result = OperationResult::success(
            kind,
            current.version,
            &applied.frame,
            applied.message,
            applied.metadata,
        );
        debug!(rows = result.row_count, "Operation previewed");
        Ok(Preview {
            result,
            dataset: applied.frame,
        })
    }
    /// Undoes the most recent applied operation.
    #[instrument(skip(self), fields(key = %key))]
    pub fn revert(&self, key: &SessionKey) -> Result<OperationResult> {
        self.snapshot(key)?;
        let lock = self.key_lock(key);
        let _guard = lock.lock()?;
        let current = self.snapshot(key)?;
        let mut history = current.history.clone();
        let record = history.pop().ok_or_else(|| DataMindError::NothingToRevert {
            key: key.to_string(),
        })?;
        let restored = guarded(OperationKind::Revert, || record.undo.undo(&current.dataset))?;
        let version = current.version + 1;
        let result = OperationResult::success(
            OperationKind::Revert,
            version,
            &restored,
            format!("Reverted {}", record.kind),
            OperationMetadata::Revert {
                reverted: record.kind,
                reverted_version: record.version,
            },
        );
        self.repository.put(
            key,
            SessionSnapshot {
                dataset: Arc::new(restored),
                history,
                version,
            },
        )?;
        info!(reverted = %record.kind, version, "Operation reverted");
        Ok(result)
    }
    /// Drops the session and its lock; the key returns to `Idle`.
    #[instrument(skip(self), fields(key = %key))]
    pub fn remove_dataset(&self, key: &SessionKey) -> Result<()> {
        self.snapshot(key)?;
        let lock = self.key_lock(key);
        let guard = lock.lock()?;
        let removed = self.repository.remove(key)?;
        drop(guard);
        // An entry another caller still holds is left in place.
        self.locks
            .remove_if(key, |_, entry| Arc::ptr_eq(entry, &lock) && Arc::strong_count(entry) <= 2);
        if !removed {
            return Err(DataMindError::NotFound {
                key: key.to_string(),
            });
        }
        info!("Dataset removed");
        Ok(())
    }
    pub fn get_current(&self, key: &SessionKey) -> Result<Arc<DataFrame>> {
        Ok(self.snapshot(key)?.dataset.clone())
    }
    pub fn current_version(&self, key: &SessionKey) -> Result<u64> {
        Ok(self.snapshot(key)?.version)
    }
    pub fn history(&self, key: &SessionKey) -> Result<Vec<HistoryEntry>> {
        Ok(self.snapshot(key)?.history.iter().map(HistoryRecord::entry).collect())
    }
    pub fn session_state(&self, key: &SessionKey) -> Result<SessionState> {
        Ok(self
            .repository
            .get(key)?
            .map_or(SessionState::Idle, |s| s.state()))
    }
    pub fn sessions(&self) -> Result<Vec<SessionKey>> {
        self.repository.keys()
    }
    #[instrument(skip(self), fields(key = %key))]
    pub fn summarize(&self, key: &SessionKey) -> Result<Summary> {
        let dataset = self.get_current(key)?;
        Ok(insights::summarize(&dataset, &self.config.parsing.datetime_formats))
    }
    pub fn trends(&self, key: &SessionKey, time_column: &str, value_column: &str) -> Result<TrendReport> {
        let dataset = self.get_current(key)?;
        insights::detect_trends(
            &dataset,
            time_column,
            value_column,
            &self.config.parsing.datetime_formats,
        )
    }
    #[instrument(skip(self), fields(key = %key))]
    pub fn analyze(&self, key: &SessionKey) -> Result<AnalysisReport> {
        let dataset = self.get_current(key)?;
        analysis::analyze(&dataset)
    }
    #[instrument(skip(self), fields(key = %key, format = ?format))]
    pub fn export(&self, key: &SessionKey, format: ExportFormat) -> Result<Vec<u8>> {
        let dataset = self.get_current(key)?;
        let summary = match format {
            ExportFormat::Pdf => insights::summarize(&dataset, &self.config.parsing.datetime_formats),
            ExportFormat::Csv => Summary::default(),
        };
        let bytes = export::export(&dataset, format, &summary)?;
        debug!(bytes = bytes.len(), "Dataset exported");
        Ok(bytes)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::Status;
    fn key() -> SessionKey {
        SessionKey::new("ada", "sales.csv")
    }
    fn normalize() -> OperationRequest {
        OperationRequest::from_json(r#"{"operation":"normalize","column":"Weight"}"#).unwrap()
    }
    #[test]
    fn state_transitions() {
        let engine = DataEngine::default();
        assert_eq!(engine.session_state(&key()).unwrap(), SessionState::Idle);
        assert!(matches!(engine.get_current(&key()), Err(DataMindError::NotFound { .. })));
        let loaded = engine.load_dataset(&key(), b"Weight\n5\n10\n15\n").unwrap();
        assert_eq!((loaded.dataset_version, loaded.row_count), (1, 3));
        assert_eq!(engine.session_state(&key()).unwrap(), SessionState::Ready);
        assert!(matches!(engine.revert(&key()), Err(DataMindError::NothingToRevert { .. })));
        let applied = engine.apply_operation(&key(), &normalize()).unwrap();
        assert_eq!(applied.status, Status::Success);
        assert_eq!(applied.dataset_version, 2);
        assert_eq!(engine.session_state(&key()).unwrap(), SessionState::Modified);
        assert_eq!(engine.history(&key()).unwrap()[0].kind, OperationKind::Normalize);
        let reverted = engine.revert(&key()).unwrap();
        assert_eq!(reverted.dataset_version, 3);
        assert_eq!(engine.session_state(&key()).unwrap(), SessionState::Ready);
    }
    #[test]
    fn failed_apply_leaves_session_untouched() {
        let engine = DataEngine::default();
        engine.load_dataset(&key(), b"Weight,Name\n5,a\n").unwrap();
        let bad = OperationRequest::from_json(r#"{"operation":"normalize","column":"Name"}"#).unwrap();
        assert!(engine.apply_operation(&key(), &bad).is_err());
        assert_eq!(engine.current_version(&key()).unwrap(), 1);
        assert_eq!(engine.session_state(&key()).unwrap(), SessionState::Ready);
    }
    #[test]
    fn preview_does_not_commit() {
        let engine = DataEngine::default();
        engine.load_dataset(&key(), b"Weight\n5\n10\n").unwrap();
        let preview = engine.preview_operation(&key(), &normalize()).unwrap();
        assert_eq!(preview.result.dataset_version, 1);
        assert_eq!(preview.dataset.value("Weight", 1), 1.0.into());
        assert_eq!(engine.get_current(&key()).unwrap().value("Weight", 1), 10i64.into());
        assert!(engine.history(&key()).unwrap().is_empty());
    }
    #[test]
    fn history_depth_is_bounded() {
        let mut config = EngineConfig::default();
        config.limits.max_history = 2;
        let engine = DataEngine::new(config);
        engine.load_dataset(&key(), b"Weight\n5\n10\n").unwrap();
        for _ in 0..3 {
            engine.apply_operation(&key(), &normalize()).unwrap();
        }
        let versions: Vec<u64> = engine.history(&key()).unwrap().iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![3, 4]);
    }
    #[test]
    fn upload_limit_is_enforced() {
        let mut config = EngineConfig::default();
        config.limits.max_upload_bytes = 4;
        let engine = DataEngine::new(config);
        assert!(matches!(
            engine.load_dataset(&key(), b"Weight\n5\n"),
            Err(DataMindError::Parse(_))
        ));
    }
    #[test]
    fn removal_releases_the_session_lock() {
        let engine = DataEngine::default();
        assert!(engine.apply_operation(&key(), &normalize()).is_err());
        assert!(engine.revert(&key()).is_err());
        assert_eq!(engine.locks.len(), 0);
        engine.load_dataset(&key(), b"Weight\n5\n10\n").unwrap();
        engine.apply_operation(&key(), &normalize()).unwrap();
        assert_eq!(engine.locks.len(), 1);
        engine.remove_dataset(&key()).unwrap();
        assert_eq!(engine.locks.len(), 0);
        assert_eq!(engine.session_state(&key()).unwrap(), SessionState::Idle);
        assert!(engine.sessions().unwrap().is_empty());
        assert!(matches!(
            engine.remove_dataset(&key()),
            Err(DataMindError::NotFound { .. })
        ));
        let reloaded = engine.load_dataset(&key(), b"Weight\n1\n").unwrap();
        assert_eq!(reloaded.dataset_version, 1);
    }
    #[test]
    fn panics_become_operation_failures() {
        let err = guarded::<()>(OperationKind::Normalize, || panic!("boom")).unwrap_err();
        assert_eq!(
            err,
            DataMindError::OperationFailed {
                operation: "normalize".into(),
                reason: "boom".into()
            }
        );
    }
}
