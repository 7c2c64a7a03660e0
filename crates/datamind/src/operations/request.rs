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

use crate::error::{DataMindError, Result};
use crate::operations::OperationKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FillStrategy {
    #[default]
    None,
    Mean,
    Median,
    Mode,
    Custom,
}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RemovalScope {
    #[default]
    None,
    Row,
    Column,
}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutlierFill {
    Mean,
    Median,
    #[default]
    None,
}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMethod {
    ZScore,
    #[default]
    StdDev,
}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateScope {
    All,
    Column,
}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Datetime,
    Int,
    Float,
}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TextMode {
    Upper,
    Lower,
    Custom,
}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnitRule {
    ToKg,
    ToMeter,
}
impl UnitRule {
    pub fn factor(&self) -> f64 {
        match self {
            UnitRule::ToKg => 0.453592,
            UnitRule::ToMeter => 0.3048,
        }
    }
}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AggregateMethod {
    Sum,
    Mean,
    Count,
}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EncodingMethod {
    OneHot,
    Label,
}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatisticMethod {
    Mean,
    Median,
    Mode,
    Min,
    Max,
    StdDev,
    All,
}
impl StatisticMethod {
    pub fn suffix(&self) -> &'static str {
        match self {
            StatisticMethod::Mean => "mean",
            StatisticMethod::Median => "median",
            StatisticMethod::Mode => "mode",
            StatisticMethod::Min => "min",
            StatisticMethod::Max => "max",
            StatisticMethod::StdDev => "std_dev",
            StatisticMethod::All => "all",
        }
    }
    /// The single statistics `all` expands to.
    pub fn expand(&self) -> Vec<StatisticMethod> {
        match self {
            StatisticMethod::All => vec![
                StatisticMethod::Mean,
                StatisticMethod::Median,
                StatisticMethod::Mode,
                StatisticMethod::Min,
                StatisticMethod::Max,
                StatisticMethod::StdDev,
            ],
            single => vec![*single],
        }
    }
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum OperationRequest {
    FillOrRemoveMissing {
        column: String,
        #[serde(default)]
        fill_strategy: FillStrategy,
        #[serde(default)]
        removal_scope: RemovalScope,
        #[serde(default)]
        custom_value: Option<serde_json::Value>,
    },
    DetectOutliers {
        column: String,
        #[serde(default)]
        fill_strategy: OutlierFill,
        #[serde(default)]
        method: OutlierMethod,
    },
    RemoveDuplicates {
        scope: DuplicateScope,
        #[serde(default)]
        column: Option<String>,
    },
    FixDatatype {
        column: String,
        target_type: TargetType,
    },
    CorrectText {
        column: String,
        mode: TextMode,
        #[serde(default)]
        custom_mapping: BTreeMap<String, String>,
    },
    ConvertUnits {
        column: String,
        rule: UnitRule,
    },
    RemoveRowsOrColumns {
        #[serde(default)]
        columns: Vec<String>,
        #[serde(default)]
        row_indices: Vec<usize>,
    },
    FilterRows {
        #[serde(default)]
        column: Option<String>,
        expression: String,
    },
    BinColumn {
        column: String,
        boundaries: Vec<f64>,
        #[serde(default)]
        new_column: Option<String>,
    },
    SplitColumn {
        column: String,
        parts: usize,
    },
    TransformColumns {
        new_column: String,
        formula: String,
    },
    Aggregate {
        group_by: String,
        value_column: String,
        method: AggregateMethod,
    },
    EncodeCategorical {
        column: String,
        method: EncodingMethod,
    },
    Normalize {
        column: String,
    },
    DescriptiveStatistics {
        columns: Vec<String>,
        method: StatisticMethod,
    },
}
impl OperationRequest {
    /// Parses a tagged JSON request; unknown operations and enum values are parameter errors.
    pub fn from_json(input: &str) -> Result<Self> {
        let request: OperationRequest = serde_json::from_str(input)?;
        request.validate()?;
        Ok(request)
    }
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let request: OperationRequest = serde_json::from_value(value)?;
        request.validate()?;
        Ok(request)
    }
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::FillOrRemoveMissing { .. } => OperationKind::FillOrRemoveMissing,
            OperationRequest::DetectOutliers { .. } => OperationKind::DetectOutliers,
            OperationRequest::RemoveDuplicates { .. } => OperationKind::RemoveDuplicates,
            OperationRequest::FixDatatype { .. } => OperationKind::FixDatatype,
            OperationRequest::CorrectText { .. } => OperationKind::CorrectText,
            OperationRequest::ConvertUnits { .. } => OperationKind::ConvertUnits,
            OperationRequest::RemoveRowsOrColumns { .. } => OperationKind::RemoveRowsOrColumns,
            OperationRequest::FilterRows { .. } => OperationKind::FilterRows,
            OperationRequest::BinColumn { .. } => OperationKind::BinColumn,
            OperationRequest::SplitColumn { .. } => OperationKind::SplitColumn,
            OperationRequest::TransformColumns { .. } => OperationKind::TransformColumns,
            OperationRequest::Aggregate { .. } => OperationKind::Aggregate,
            OperationRequest::EncodeCategorical { .. } => OperationKind::EncodeCategorical,
            OperationRequest::Normalize { .. } => OperationKind::Normalize,
            OperationRequest::DescriptiveStatistics { .. } => OperationKind::DescriptiveStatistics,
        }
    }
    /// Dataset-independent parameter checks.
    pub fn validate(&self) -> Result<()> {
        match self {
            OperationRequest::FillOrRemoveMissing {
                fill_strategy,
                removal_scope,
                custom_value,
                ..
            } => {
                if *fill_strategy == FillStrategy::None && *removal_scope == RemovalScope::None {
                    return Err(DataMindError::invalid_parameter(
                        "fill_strategy",
                        "either a fill strategy or a removal scope is required",
                    ));
                }
                if *fill_strategy == FillStrategy::Custom
                    && !matches!(custom_value, Some(v) if !v.is_null())
                {
                    return Err(DataMindError::invalid_parameter(
                        "custom_value",
                        "custom fill requires a value",
                    ));
                }
            }
            OperationRequest::CorrectText {
                mode: TextMode::Custom,
                custom_mapping,
                ..
            } if custom_mapping.is_empty() => {
                return Err(DataMindError::invalid_parameter(
                    "custom_mapping",
                    "custom mode requires a non-empty mapping",
                ));
            }
            OperationRequest::RemoveDuplicates { scope, column } => {
                if *scope == DuplicateScope::Column && column.is_none() {
                    return Err(DataMindError::invalid_parameter(
                        "column",
                        "column scope requires a column name",
                    ));
                }
            }
            OperationRequest::FilterRows { expression, .. } => {
                if expression.trim().is_empty() {
                    return Err(DataMindError::InvalidExpression {
                        expression: expression.clone(),
                        reason: "expression is empty".to_string(),
                    });
                }
            }
            OperationRequest::BinColumn { boundaries, .. } => {
                if boundaries.len() < 2 {
                    return Err(DataMindError::invalid_parameter(
                        "boundaries",
                        format!("at least 2 boundaries required, got {}", boundaries.len()),
                    ));
                }
                if boundaries.iter().any(|b| !b.is_finite())
                    || boundaries.windows(2).any(|w| w[0] >= w[1])
                {
                    return Err(DataMindError::invalid_parameter(
                        "boundaries",
                        "boundaries must be finite and strictly ascending",
                    ));
                }
            }
            OperationRequest::SplitColumn { parts, .. } => {
                if *parts == 0 {
                    return Err(DataMindError::invalid_parameter(
                        "parts",
                        "parts must be at least 1",
                    ));
                }
            }
            OperationRequest::TransformColumns {
                new_column,
                formula,
            } => {
                if new_column.trim().is_empty() {
                    return Err(DataMindError::invalid_parameter(
                        "new_column",
                        "new column name is empty",
                    ));
                }
                if formula.trim().is_empty() {
                    return Err(DataMindError::invalid_parameter("formula", "formula is empty"));
                }
            }
            OperationRequest::DescriptiveStatistics { columns, .. } => {
                if columns.is_empty() {
                    return Err(DataMindError::invalid_parameter(
                        "columns",
                        "at least one column is required",
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }
}
