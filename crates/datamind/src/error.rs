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

use thiserror::Error;
pub type Result<T> = std::result::Result<T, DataMindError>;
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataMindError {
    #[error("Column '{column}' not found in dataset")]
    ColumnNotFound { column: String },
    #[error("Column '{column}' is not numeric (found {found})")]
    NonNumericColumn { column: String, found: String },
    #[error("Column '{column}' is not a text column (found {found})")]
    NonTextColumn { column: String, found: String },
    #[error("Column '{column}' contains only missing values")]
    AllMissing { column: String },
    #[error("No mode available for column '{column}'")]
    NoMode { column: String },
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter { parameter: String, reason: String },
    #[error("Invalid custom value '{value}' for numerical column '{column}'")]
    InvalidCustomValue { column: String, value: String },
    #[error("Invalid expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },
    #[error("Column '{column}' contains no parseable dates")]
    InvalidDateColumn { column: String },
    #[error("No changes to revert for '{key}'")]
    NothingToRevert { key: String },
    #[error("Failed to parse dataset: {0}")]
    Parse(String),
    #[error("No dataset loaded for '{key}'")]
    NotFound { key: String },
    #[error("Operation '{operation}' failed: {reason}")]
    OperationFailed { operation: String, reason: String },
    #[error("IO error: {0}")]
    Io(String),
    #[error("Thread safety error: {0}")]
    ThreadSafety(String),
}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Data,
    State,
    Io,
    Internal,
}
impl DataMindError {
    pub fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }
    pub fn column_not_found(column: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            column: column.into(),
        }
    }
    pub fn code(&self) -> &'static str {
        match self {
            Self::ColumnNotFound { .. } => "COLUMN_NOT_FOUND",
            Self::NonNumericColumn { .. } => "NON_NUMERIC_COLUMN",
            Self::NonTextColumn { .. } => "NON_TEXT_COLUMN",
            Self::AllMissing { .. } => "ALL_MISSING",
            Self::NoMode { .. } => "NO_MODE",
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",
            Self::InvalidCustomValue { .. } => "INVALID_CUSTOM_VALUE",
            Self::InvalidExpression { .. } => "INVALID_EXPRESSION",
            Self::InvalidDateColumn { .. } => "INVALID_DATE_COLUMN",
            Self::NothingToRevert { .. } => "NOTHING_TO_REVERT",
            Self::Parse(_) => "PARSE_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::OperationFailed { .. } => "OPERATION_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::ThreadSafety(_) => "THREAD_SAFETY",
        }
    }
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidParameter { .. }
            | Self::InvalidCustomValue { .. }
            | Self::InvalidExpression { .. } => ErrorCategory::Validation,
            Self::ColumnNotFound { .. }
            | Self::NonNumericColumn { .. }
            | Self::NonTextColumn { .. }
            | Self::AllMissing { .. }
            | Self::NoMode { .. }
            | Self::InvalidDateColumn { .. }
            | Self::Parse(_) => ErrorCategory::Data,
            Self::NothingToRevert { .. } | Self::NotFound { .. } => ErrorCategory::State,
            Self::Io(_) => ErrorCategory::Io,
            Self::OperationFailed { .. } | Self::ThreadSafety(_) => ErrorCategory::Internal,
        }
    }
    /// Caller mistakes: the request can be corrected and retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Validation | ErrorCategory::Data
        )
    }
}
impl From<std::io::Error> for DataMindError {
    fn from(err: std::io::Error) -> Self {
        DataMindError::Io(err.to_string())
    }
}
impl From<csv::Error> for DataMindError {
    fn from(err: csv::Error) -> Self {
        match err.kind() {
            csv::ErrorKind::Io(_) => DataMindError::Io(err.to_string()),
            _ => DataMindError::Parse(err.to_string()),
        }
    }
}
impl From<serde_json::Error> for DataMindError {
    fn from(err: serde_json::Error) -> Self {
        DataMindError::invalid_parameter("request", err.to_string())
    }
}
impl<T> From<std::sync::PoisonError<T>> for DataMindError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        DataMindError::ThreadSafety("Failed to acquire lock".to_string())
    }
}
