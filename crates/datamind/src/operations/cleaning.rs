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

use crate::config::ParsingConfig;
use crate::data_handler::column::{parse_bool, parse_datetime, parse_finite_f64};
use crate::data_handler::{Column, ColumnData, DataFrame, DataType, Value};
use crate::error::{DataMindError, Result};
use crate::history::{undo_for_columns, UndoRecord};
use crate::operations::{
    Applied, DuplicateScope, FillStrategy, OperationMetadata, OutlierFill, OutlierMethod,
    OutlierStats, RemovalScope, TargetType, TextMode, UnitRule,
};
use crate::stats::{self, Ddof};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;
const OUTLIER_THRESHOLD: f64 = 2.0;
fn custom_fill_value(
    column: &Column,
    name: &str,
    raw: Option<&serde_json::Value>,
    parsing: &ParsingConfig,
) -> Result<Value> {
    let text = match raw {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => {
            return Err(DataMindError::invalid_parameter(
                "custom_value",
                "custom fill requires a value",
            ))
        }
        Some(other) => other.to_string(),
    };
    let invalid = || DataMindError::InvalidCustomValue {
        column: name.to_string(),
        value: text.clone(),
    };
    Ok(match column.data_type() {
        DataType::Int64 => match text.trim().parse::<i64>() {
            Ok(v) => Value::Int64(v),
            Err(_) => Value::Float64(parse_finite_f64(&text).ok_or_else(invalid)?),
        },
        DataType::Float64 => Value::Float64(parse_finite_f64(&text).ok_or_else(invalid)?),
        DataType::Boolean => parse_bool(&text).map(Value::Boolean).unwrap_or(Value::String(text.clone())),
        DataType::DateTime => parse_datetime(&text, &parsing.datetime_formats)
            .map(Value::DateTime)
            .unwrap_or(Value::String(text.clone())),
        DataType::String => Value::String(text.clone()),
    })
}
/// Undo for a fill at `positions`; a widened column keeps the original cells instead.
fn fill_undo(
    df: &DataFrame,
    column: &str,
    original: &Arc<Column>,
    filled: &Column,
    positions: &[usize],
) -> UndoRecord {
    if filled.data_type() == original.data_type() {
        UndoRecord::RestoreMissing {
            column: column.to_string(),
            positions: positions.to_vec(),
            original_type: original.data_type(),
        }
    } else {
        UndoRecord::RestoreColumn {
            name: column.to_string(),
            position: df.column_position(column).unwrap_or_default(),
            column: Arc::clone(original),
        }
    }
}
pub fn fill_or_remove_missing(
    df: &DataFrame,
    column: &str,
    fill: FillStrategy,
    removal: RemovalScope,
    custom_value: Option<&serde_json::Value>,
    parsing: &ParsingConfig,
) -> Result<Applied> {
    let col = df.column(column)?.clone();
    let mask = col.missing_positions();
    let affected_rows = mask.len();
    let fill_value = match fill {
        FillStrategy::None => None,
        FillStrategy::Mean => Some(Value::from(stats::mean(df, column)?)),
        FillStrategy::Median => Some(Value::from(stats::median(df, column)?)),
        FillStrategy::Mode => Some(stats::mode(df, column)?),
        FillStrategy::Custom => Some(custom_fill_value(&col, column, custom_value, parsing)?),
    };
    let mut frame = df.clone();
    let mut steps = Vec::new();
    if let Some(value) = fill_value.as_ref().filter(|_| !mask.is_empty()) {
        let filled = col.set_positions(&mask, value)?;
        steps.push(fill_undo(df, column, &col, &filled, &mask));
        frame.add_column(column.to_string(), filled)?;
    }
    let (mut removed_row, mut removed_rows, mut removed_column, mut affected_columns) =
        (None, 0, None, 0);
    match removal {
        RemovalScope::None => {}
        RemovalScope::Row => {
            let (kept, removed) = frame.remove_rows(&mask)?;
            steps.push(UndoRecord::RestoreRows {
                positions: mask.clone(),
                rows: removed,
            });
            frame = kept;
            removed_row = Some(format!("Rows with NaN in {column}"));
            removed_rows = mask.len();
        }
        RemovalScope::Column => {
            let (position, data) = frame.drop_column(column)?;
            steps.push(UndoRecord::RestoreColumn {
                name: column.to_string(),
                position,
                column: data,
            });
            removed_column = Some(column.to_string());
            affected_columns = 1;
        }
    }
    let message = match (&fill_value, removal) {
        (Some(value), RemovalScope::None) => {
            format!("Filled {affected_rows} missing value(s) in '{column}' with {value}")
        }
        (_, RemovalScope::Row) => format!("Removed {removed_rows} row(s) with missing '{column}'"),
        (_, RemovalScope::Column) => format!("Removed column '{column}'"),
        (None, RemovalScope::None) => format!("No changes to '{column}'"),
    };
    debug!(column, affected_rows, removed_rows, "Handled missing values");
    Ok(Applied {
        frame,
        metadata: OperationMetadata::FillOrRemoveMissing {
            column: column.to_string(),
            affected_rows,
            affected_columns,
            fill_value,
            removed_row,
            removed_rows,
            removed_column,
        },
        undo: UndoRecord::sequence(steps),
        message,
    })
}
pub fn detect_outliers(
    df: &DataFrame,
    column: &str,
    fill: OutlierFill,
    method: OutlierMethod,
) -> Result<Applied> {
    stats::numeric_values(df, column)?;
    let col = df.column(column)?.clone();
    let mut frame = df.clone();
    let mut steps = Vec::new();
    let fill_value = match fill {
        OutlierFill::Mean => Some(stats::mean(df, column)?),
        OutlierFill::Median => Some(stats::median(df, column)?),
        OutlierFill::None => None,
    };
    let mask = col.missing_positions();
    if let Some(value) = fill_value.filter(|_| !mask.is_empty()) {
        let filled = col.set_positions(&mask, &Value::Float64(value))?;
        steps.push(fill_undo(df, column, &col, &filled, &mask));
        frame.add_column(column.to_string(), filled)?;
    }
    let clean: Vec<(usize, f64)> = frame
        .column(column)?
        .f64_values()
        .into_iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|x| (i, x)))
        .collect();
    let values: Vec<f64> = clean.iter().map(|(_, x)| *x).collect();
    let mean = stats::mean_of(&values).unwrap_or(0.0);
    let std = stats::std_dev_of(&values, Ddof::Population).unwrap_or(0.0);
    let (lower_bound, upper_bound) = (mean - OUTLIER_THRESHOLD * std, mean + OUTLIER_THRESHOLD * std);
    let z_scores: Option<Vec<f64>> = match method {
        OutlierMethod::ZScore => Some(
            values
                .iter()
                .map(|x| if std == 0.0 { 0.0 } else { (x - mean) / std })
                .collect(),
        ),
        OutlierMethod::StdDev => None,
    };
    let flagged: Vec<bool> = values
        .iter()
        .enumerate()
        .map(|(k, &x)| match &z_scores {
            Some(z) => z[k].abs() > OUTLIER_THRESHOLD,
            None => std > 0.0 && (x < lower_bound || x > upper_bound),
        })
        .collect();
    let mut full_mask = vec![Some(false); frame.row_count()];
    let mut outliers = Vec::new();
    let mut outlier_indices = Vec::new();
    for ((row, x), is_outlier) in clean.iter().zip(&flagged) {
        if *is_outlier {
            full_mask[*row] = Some(true);
            outliers.push(*x);
            outlier_indices.push(*row);
        }
    }
    let flag_column = format!("{column}_Is_Outlier");
    steps.push(undo_for_columns(&frame, std::slice::from_ref(&flag_column)));
    frame.add_column(flag_column.clone(), Column::from_bool(full_mask))?;
    debug!(column, outliers = outliers.len(), mean, std, "Detected outliers");
    Ok(Applied {
        frame,
        message: format!("Flagged {} outlier(s) in '{column}'", outliers.len()),
        metadata: OperationMetadata::DetectOutliers {
            column: column.to_string(),
            flag_column,
            outliers,
            z_scores,
            stats: OutlierStats {
                mean,
                std,
                lower_bound,
                upper_bound,
            },
            outlier_indices,
        },
        undo: UndoRecord::sequence(steps),
    })
}
/// Drops repeated rows, keeping the first occurrence.
pub fn remove_duplicates(df: &DataFrame, scope: DuplicateScope, column: Option<&str>) -> Result<Applied> {
    let key_columns: Vec<String> = match (scope, column) {
        (DuplicateScope::All, _) => df.column_names().to_vec(),
        (DuplicateScope::Column, Some(name)) => {
            df.column(name)?;
            vec![name.to_string()]
        }
        (DuplicateScope::Column, None) => {
            return Err(DataMindError::invalid_parameter(
                "column",
                "column scope requires a column name",
            ))
        }
    };
    let mut seen = HashSet::new();
    let duplicates: Vec<usize> = (0..df.row_count())
        .filter(|&row| !seen.insert(df.row_key(row, &key_columns)))
        .collect();
    let (frame, removed) = df.remove_rows(&duplicates)?;
    Ok(Applied {
        frame,
        message: format!("Removed {} duplicate row(s)", duplicates.len()),
        metadata: OperationMetadata::RemoveDuplicates {
            removed_count: duplicates.len(),
        },
        undo: UndoRecord::RestoreRows {
            positions: duplicates,
            rows: removed,
        },
    })
}
pub fn fix_datatype(
    df: &DataFrame,
    column: &str,
    target: TargetType,
    parsing: &ParsingConfig,
) -> Result<Applied> {
    let col = df.column(column)?;
    let to = match target {
        TargetType::Datetime => DataType::DateTime,
        TargetType::Int => DataType::Int64,
        TargetType::Float => DataType::Float64,
    };
    let converted = col.cast(to, &parsing.datetime_formats);
    let coerced_to_missing = converted.null_count().saturating_sub(col.null_count());
    let mut frame = df.clone();
    frame.add_column(column.to_string(), converted)?;
    Ok(Applied {
        frame,
        message: format!(
            "Converted '{column}' from {} to {to}; {coerced_to_missing} value(s) could not be parsed",
            col.data_type()
        ),
        metadata: OperationMetadata::FixDatatype {
            column: column.to_string(),
            from: col.data_type(),
            to,
            coerced_to_missing,
        },
        undo: undo_for_columns(df, &[column.to_string()]),
    })
}
pub fn correct_text(
    df: &DataFrame,
    column: &str,
    mode: TextMode,
    mapping: &BTreeMap<String, String>,
) -> Result<Applied> {
    let col = df.column(column)?;
    if col.data_type() != DataType::String {
        return Err(DataMindError::NonTextColumn {
            column: column.to_string(),
            found: col.data_type().to_string(),
        });
    }
    let mut changed_cells = 0;
    let corrected: Vec<Option<String>> = (0..col.len())
        .map(|i| {
            col.str_at(i).map(|s| {
                let next = match mode {
                    TextMode::Upper => s.to_uppercase(),
                    TextMode::Lower => s.to_lowercase(),
                    TextMode::Custom => mapping.get(s).cloned().unwrap_or_else(|| s.to_string()),
                };
                if next != s {
                    changed_cells += 1;
                }
                next
            })
        })
        .collect();
    let mut frame = df.clone();
    frame.add_column(column.to_string(), Column::from_text(corrected))?;
    Ok(Applied {
        frame,
        message: format!("Corrected {changed_cells} value(s) in '{column}'"),
        metadata: OperationMetadata::CorrectText {
            column: column.to_string(),
            changed_cells,
        },
        undo: undo_for_columns(df, &[column.to_string()]),
    })
}
pub fn convert_units(df: &DataFrame, column: &str, rule: UnitRule) -> Result<Applied> {
    let col = df.column(column)?;
    if !col.data_type().is_numeric() {
        return Err(DataMindError::NonNumericColumn {
            column: column.to_string(),
            found: col.data_type().to_string(),
        });
    }
    let factor = rule.factor();
    let converted: Vec<Option<f64>> = col
        .f64_values()
        .into_iter()
        .map(|v| v.map(|x| x * factor))
        .collect();
    let count = converted.iter().flatten().count();
    let mut frame = df.clone();
    frame.add_column(column.to_string(), Column::from_f64(converted))?;
    Ok(Applied {
        frame,
        message: format!("Converted {count} value(s) in '{column}' by a factor of {factor}"),
        metadata: OperationMetadata::ConvertUnits {
            column: column.to_string(),
            factor,
            converted: count,
        },
        undo: undo_for_columns(df, &[column.to_string()]),
    })
}
/// Drops rows by position first, then columns by name.
pub fn remove_rows_or_columns(df: &DataFrame, columns: &[String], row_indices: &[usize]) -> Result<Applied> {
    let mut names: Vec<String> = Vec::new();
    for name in columns {
        df.column(name)?;
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    if let Some(bad) = row_indices.iter().find(|&&i| i >= df.row_count()) {
        return Err(DataMindError::invalid_parameter(
            "row_indices",
            format!("row {bad} is out of range for {} rows", df.row_count()),
        ));
    }
    let mut rows: Vec<usize> = row_indices.to_vec();
    rows.sort_unstable();
    rows.dedup();
    let mut steps = Vec::new();
    let (mut frame, removed) = df.remove_rows(&rows)?;
    if !rows.is_empty() {
        steps.push(UndoRecord::RestoreRows {
            positions: rows.clone(),
            rows: removed,
        });
    }
    for name in &names {
        let (position, column) = frame.drop_column(name)?;
        steps.push(UndoRecord::RestoreColumn {
            name: name.clone(),
            position,
            column,
        });
    }
    Ok(Applied {
        frame,
        message: format!("Removed {} column(s) and {} row(s)", names.len(), rows.len()),
        metadata: OperationMetadata::RemoveRowsOrColumns {
            removed_columns: names,
            removed_rows: rows,
        },
        undo: UndoRecord::sequence(steps),
    })
}
