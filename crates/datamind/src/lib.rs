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

pub mod analysis;
pub mod config;
pub mod data_handler;
pub mod engine;
pub mod error;
pub mod export;
pub mod history;
pub mod insights;
pub mod operations;
pub mod stats;

pub use analysis::{analyze, AnalysisReport, RegressionReport};
pub use config::{EngineConfig, LimitsConfig, LogFormat, ParsingConfig, ServerConfig};
pub use data_handler::{Column, ColumnData, CsvReader, CsvWriter, DataFrame, DataType, Value};
pub use engine::{
    DataEngine, DatasetRepository, InMemoryRepository, Preview, SessionKey, SessionSnapshot,
    SessionState,
};
pub use error::{DataMindError, ErrorCategory, Result};
pub use export::ExportFormat;
pub use history::{HistoryEntry, HistoryRecord, UndoRecord};
pub use insights::{detect_trends, generate_insights, summarize_findings, Summary, TrendReport};
pub use operations::{
    OperationKind, OperationMetadata, OperationRequest, OperationResult, Status,
};
