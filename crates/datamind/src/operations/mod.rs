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

pub mod cleaning;
pub mod request;
pub mod transformation;
use crate::config::ParsingConfig;
use crate::data_handler::{DataFrame, DataType, Value};
use crate::error::Result;
use crate::history::UndoRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
pub use request::{
    AggregateMethod, DuplicateScope, EncodingMethod, FillStrategy, OperationRequest, OutlierFill,
    OutlierMethod, RemovalScope, StatisticMethod, TargetType, TextMode, UnitRule,
};
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    FillOrRemoveMissing,
    DetectOutliers,
    RemoveDuplicates,
    FixDatatype,
    CorrectText,
    ConvertUnits,
    RemoveRowsOrColumns,
    FilterRows,
    BinColumn,
    SplitColumn,
    TransformColumns,
    Aggregate,
    EncodeCategorical,
    Normalize,
    DescriptiveStatistics,
    Load,
    Revert,
}
impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        write!(f, "{name}")
    }
}
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Error,
}
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutlierStats {
    pub mean: f64,
    pub std: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Quartiles {
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
}
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationMetadata {
    FillOrRemoveMissing {
        column: String,
        affected_rows: usize,
        affected_columns: usize,
        fill_value: Option<Value>,
        removed_row: Option<String>,
        removed_rows: usize,
        removed_column: Option<String>,
    },
    DetectOutliers {
        column: String,
        flag_column: String,
        outliers: Vec<f64>,
        z_scores: Option<Vec<f64>>,
        stats: OutlierStats,
        outlier_indices: Vec<usize>,
    },
    RemoveDuplicates {
        removed_count: usize,
    },
    FixDatatype {
        column: String,
        from: DataType,
        to: DataType,
        coerced_to_missing: usize,
    },
    CorrectText {
        column: String,
        changed_cells: usize,
    },
    ConvertUnits {
        column: String,
        factor: f64,
        converted: usize,
    },
    RemoveRowsOrColumns {
        removed_columns: Vec<String>,
        removed_rows: Vec<usize>,
    },
    FilterRows {
        expression: String,
        matched_rows: usize,
        removed_rows: usize,
    },
    BinColumn {
        new_column: String,
        labels: Vec<String>,
        out_of_range: usize,
    },
    SplitColumn {
        new_columns: Vec<String>,
    },
    TransformColumns {
        new_column: String,
        left: String,
        operator: char,
        right: String,
        missing_results: usize,
    },
    Aggregate {
        group_by: String,
        value_column: String,
        method: AggregateMethod,
        group_count: usize,
    },
    EncodeCategorical {
        column: String,
        method: EncodingMethod,
        categories: Vec<String>,
        new_columns: Vec<String>,
    },
    Normalize {
        column: String,
        min: f64,
        max: f64,
    },
    DescriptiveStatistics {
        added_columns: Vec<String>,
        value_counts: BTreeMap<String, Vec<(String, usize)>>,
        quartiles: BTreeMap<String, Quartiles>,
    },
    Load {
        source: String,
    },
    Revert {
        reverted: OperationKind,
        reverted_version: u64,
    },
}
/// Caller-facing outcome of apply, preview, load or revert.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OperationResult {
    pub status: Status,
    pub kind: OperationKind,
    pub dataset_version: u64,
    pub row_count: usize,
    pub column_count: usize,
    pub message: String,
    pub metadata: OperationMetadata,
}
impl OperationResult {
    pub fn success(
        kind: OperationKind,
        dataset_version: u64,
        frame: &DataFrame,
        message: String,
        metadata: OperationMetadata,
    ) -> Self {
        Self {
            status: Status::Success,
            kind,
            dataset_version,
            row_count: frame.row_count(),
            column_count: frame.column_count(),
            message,
            metadata,
        }
    }
}
/// A successfully computed operation, not yet committed to any session.
#[derive(Debug, Clone)]
pub struct Applied {
    pub frame: DataFrame,
    pub metadata: OperationMetadata,
    pub undo: UndoRecord,
    pub message: String,
}
/// Runs one operation against `df`, returning the new dataset. `df` is never modified.
pub fn apply(df: &DataFrame, request: &OperationRequest, parsing: &ParsingConfig) -> Result<Applied> {
    request.validate()?;
    match request {
        OperationRequest::FillOrRemoveMissing {
            column,
            fill_strategy,
            removal_scope,
            custom_value,
        } => cleaning::fill_or_remove_missing(
            df,
            column,
            *fill_strategy,
            *removal_scope,
            custom_value.as_ref(),
            parsing,
        ),
        OperationRequest::DetectOutliers {
            column,
            fill_strategy,
            method,
        } => cleaning::detect_outliers(df, column, *fill_strategy, *method),
        OperationRequest::RemoveDuplicates { scope, column } => {
            cleaning::remove_duplicates(df, *scope, column.as_deref())
        }
        OperationRequest::FixDatatype {
            column,
            target_type,
        } => cleaning::fix_datatype(df, column, *target_type, parsing),
        OperationRequest::CorrectText {
            column,
            mode,
            custom_mapping,
        } => cleaning::correct_text(df, column, *mode, custom_mapping),
        OperationRequest::ConvertUnits { column, rule } => {
            cleaning::convert_units(df, column, *rule)
        }
        OperationRequest::RemoveRowsOrColumns {
            columns,
            row_indices,
        } => cleaning::remove_rows_or_columns(df, columns, row_indices),
        OperationRequest::FilterRows { column, expression } => {
            transformation::filter_rows(df, column.as_deref(), expression)
        }
        OperationRequest::BinColumn {
            column,
            boundaries,
            new_column,
        } => transformation::bin_column(df, column, boundaries, new_column.as_deref()),
        OperationRequest::SplitColumn { column, parts } => {
            transformation::split_column(df, column, *parts)
        }
        OperationRequest::TransformColumns {
            new_column,
            formula,
        } => transformation::transform_columns(df, new_column, formula),
        OperationRequest::Aggregate {
            group_by,
            value_column,
            method,
        } => transformation::aggregate(df, group_by, value_column, *method),
        OperationRequest::EncodeCategorical { column, method } => {
            transformation::encode_categorical(df, column, *method)
        }
        OperationRequest::Normalize { column } => transformation::normalize(df, column),
        OperationRequest::DescriptiveStatistics { columns, method } => {
            transformation::descriptive_statistics(df, columns, *method)
        }
    }
}
