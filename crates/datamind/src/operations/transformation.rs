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

use crate::data_handler::{Column, ColumnData, DataFrame, DataType, Value};
use crate::error::{DataMindError, Result};
use crate::history::{undo_for_columns, UndoRecord};
use crate::operations::{
    AggregateMethod, Applied, EncodingMethod, OperationMetadata, Quartiles, StatisticMethod,
};
use crate::stats::{self, Ddof};
use evalexpr::{
    build_operator_tree, ContextWithMutableVariables, DefaultNumericTypes, HashMapContext, Node,
    Operator,
};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;
fn regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| DataMindError::OperationFailed {
        operation: "compile_pattern".to_string(),
        reason: e.to_string(),
    })
}
/// A compiled row predicate over named columns.
struct RowPredicate {
    node: Node<DefaultNumericTypes>,
    variables: Vec<String>,
    expression: String,
}
impl RowPredicate {
    fn compile(df: &DataFrame, column: Option<&str>, expression: &str) -> Result<Self> {
        let invalid = |reason: String| DataMindError::InvalidExpression {
            expression: expression.to_string(),
            reason,
        };
        let mut source = expression.trim().to_string();
        if let Some(name) = column {
            df.column(name)?;
            if source.starts_with(['<', '>', '=', '!']) {
                source = format!("{name} {source}");
            }
        }
        let source = normalize_operators(&source)?;
        let node = build_operator_tree::<DefaultNumericTypes>(&source)
            .map_err(|e| invalid(e.to_string()))?;
        let mut variables: Vec<String> = Vec::new();
        for identifier in node.iter_variable_identifiers() {
            if !df.has_column(identifier) {
                return Err(invalid(format!("unknown column '{identifier}'")));
            }
            if !variables.iter().any(|v| v == identifier) {
                variables.push(identifier.to_string());
            }
        }
        Ok(Self {
            node,
            variables,
            expression: expression.to_string(),
        })
    }
    fn to_expr_value(value: Value) -> evalexpr::Value<DefaultNumericTypes> {
        match value {
            Value::Null => evalexpr::Value::Empty,
            Value::Int64(v) => evalexpr::Value::Int(v),
            Value::Float64(v) => evalexpr::Value::Float(v),
            Value::Boolean(v) => evalexpr::Value::Boolean(v),
            other => evalexpr::Value::String(other.to_text().unwrap_or_default()),
        }
    }
    /// A comparison on a missing value is false; other evaluation failures are errors.
    fn matches(&self, df: &DataFrame, row: usize) -> Result<bool> {
        let mut context = HashMapContext::<DefaultNumericTypes>::new();
        let mut missing: Vec<&str> = Vec::new();
        for name in &self.variables {
            let value = df.value(name, row);
            if value.is_null() {
                missing.push(name);
            }
            context
                .set_value(name.clone(), Self::to_expr_value(value))
                .map_err(|e| DataMindError::InvalidExpression {
                    expression: self.expression.clone(),
                    reason: e.to_string(),
                })?;
        }
        self.evaluate(&self.node, &context, &missing)
    }
    fn evaluate(
        &self,
        node: &Node<DefaultNumericTypes>,
        context: &HashMapContext<DefaultNumericTypes>,
        missing: &[&str],
    ) -> Result<bool> {
        match (node.operator(), node.children()) {
            (Operator::RootNode, [inner]) => self.evaluate(inner, context, missing),
            (Operator::Not, [inner]) => Ok(!self.evaluate(inner, context, missing)?),
            (Operator::And, children) => {
                for child in children {
                    if !self.evaluate(child, context, missing)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (Operator::Or, children) => {
                for child in children {
                    if self.evaluate(child, context, missing)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            _ => match node.eval_boolean_with_context(context) {
                Ok(result) => Ok(result),
                Err(_)
                    if node
                        .iter_variable_identifiers()
                        .any(|identifier| missing.contains(&identifier)) =>
                {
                    Ok(false)
                }
                Err(e) => Err(DataMindError::InvalidExpression {
                    expression: self.expression.clone(),
                    reason: e.to_string(),
                }),
            },
        }
    }
}
/// Rewrites `and`, `or` and a bare `=` into evalexpr operators outside double-quoted literals.
fn normalize_operators(source: &str) -> Result<String> {
    let and = regex(r"(?i)\band\b")?;
    let or = regex(r"(?i)\bor\b")?;
    let assign = regex(r"(^|[^=!<>])=([^=]|$)")?;
    let rewrite = |code: &str| -> String {
        let code = and.replace_all(code, "&&");
        let code = or.replace_all(&code, "||");
        assign.replace_all(&code, "$1==$2").into_owned()
    };
    let mut out = String::with_capacity(source.len() + 8);
    let mut code = String::new();
    let mut chars = source.chars();
    while let Some(c) = chars.next() {
        if c != '"' {
            code.push(c);
            continue;
        }
        out.push_str(&rewrite(&code));
        code.clear();
        out.push(c);
        let mut escaped = false;
        for c in chars.by_ref() {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                break;
            }
        }
    }
    out.push_str(&rewrite(&code));
    Ok(out)
}
pub fn filter_rows(df: &DataFrame, column: Option<&str>, expression: &str) -> Result<Applied> {
    let predicate = RowPredicate::compile(df, column, expression)?;
    let mut removed = Vec::new();
    for row in 0..df.row_count() {
        if !predicate.matches(df, row)? {
            removed.push(row);
        }
    }
    let (frame, removed_rows) = df.remove_rows(&removed)?;
    debug!(expression, matched = frame.row_count(), "Filtered rows");
    Ok(Applied {
        message: format!("{} row(s) matched '{expression}'", frame.row_count()),
        metadata: OperationMetadata::FilterRows {
            expression: expression.to_string(),
            matched_rows: frame.row_count(),
            removed_rows: removed.len(),
        },
        frame,
        undo: UndoRecord::RestoreRows {
            positions: removed,
            rows: removed_rows,
        },
    })
}
fn edge(value: f64) -> String {
    format!("{value}")
}
/// Half-open `[a, b)` intervals; the last interval also includes its upper edge.
pub fn bin_column(
    df: &DataFrame,
    column: &str,
    boundaries: &[f64],
    new_column: Option<&str>,
) -> Result<Applied> {
    if boundaries.len() < 2 {
        return Err(DataMindError::invalid_parameter(
            "boundaries",
            format!("at least 2 boundaries required, got {}", boundaries.len()),
        ));
    }
    let col = df.column(column)?;
    if !col.data_type().is_numeric() {
        return Err(DataMindError::NonNumericColumn {
            column: column.to_string(),
            found: col.data_type().to_string(),
        });
    }
    let last = boundaries.len() - 2;
    let labels: Vec<String> = boundaries
        .windows(2)
        .enumerate()
        .map(|(i, w)| {
            let close = if i == last { "]" } else { ")" };
            format!("[{}, {}{close}", edge(w[0]), edge(w[1]))
        })
        .collect();
    let mut out_of_range = 0;
    let binned: Vec<Option<&str>> = col
        .f64_values()
        .into_iter()
        .map(|value| {
            let x = value?;
            let bin = boundaries.windows(2).enumerate().position(|(i, w)| {
                x >= w[0] && (x < w[1] || (i == last && x == w[1]))
            });
            if bin.is_none() {
                out_of_range += 1;
            }
            bin.map(|i| labels[i].as_str())
        })
        .collect();
    let target = new_column
        .map(str::to_string)
        .unwrap_or_else(|| format!("{column}_binned"));
    let undo = undo_for_columns(df, std::slice::from_ref(&target));
    let mut frame = df.clone();
    frame.add_column(target.clone(), Column::from_text(binned))?;
    Ok(Applied {
        frame,
        message: format!("Binned '{column}' into {} interval(s) as '{target}'", labels.len()),
        metadata: OperationMetadata::BinColumn {
            new_column: target,
            labels,
            out_of_range,
        },
        undo,
    })
}
/// Splits on whitespace into `<column>_1..=<column>_parts`; the last part keeps the remainder.
pub fn split_column(df: &DataFrame, column: &str, parts: usize) -> Result<Applied> {
    let col = df.column(column)?;
    if col.data_type() != DataType::String {
        return Err(DataMindError::NonTextColumn {
            column: column.to_string(),
            found: col.data_type().to_string(),
        });
    }
    if parts == 0 {
        return Err(DataMindError::invalid_parameter("parts", "parts must be at least 1"));
    }
    let names: Vec<String> = (1..=parts).map(|i| format!("{column}_{i}")).collect();
    if let Some(existing) = names.iter().find(|n| df.has_column(n)) {
        return Err(DataMindError::invalid_parameter(
            "column",
            format!("column '{existing}' already exists"),
        ));
    }
    let mut split: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(col.len()); parts];
    for row in 0..col.len() {
        let Some(text) = col.str_at(row) else {
            split.iter_mut().for_each(|part| part.push(None));
            continue;
        };
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.len() < parts {
            return Err(DataMindError::invalid_parameter(
                "parts",
                format!("row {row} has {} token(s), fewer than {parts}", tokens.len()),
            ));
        }
        for (i, part) in split.iter_mut().enumerate() {
            let piece = if i + 1 == parts {
                tokens[i..].join(" ")
            } else {
                tokens[i].to_string()
            };
            part.push(Some(piece));
        }
    }
    let mut frame = df.clone();
    let position = frame.column_position(column).unwrap_or(frame.column_count());
    for (offset, (name, values)) in names.iter().zip(split).enumerate() {
        frame.insert_column(position + 1 + offset, name.clone(), Column::from_text(values))?;
    }
    Ok(Applied {
        frame,
        message: format!("Split '{column}' into {parts} column(s)"),
        metadata: OperationMetadata::SplitColumn {
            new_columns: names.clone(),
        },
        undo: UndoRecord::DropColumns { names },
    })
}
enum Operand {
    Column(String, Arc<Column>),
    Scalar(f64),
}
impl Operand {
    fn resolve(df: &DataFrame, token: &str) -> Result<Self> {
        let token = token.trim();
        match df.get_column(token) {
            Some(column) if column.data_type().is_numeric() => {
                Ok(Operand::Column(token.to_string(), column.clone()))
            }
            Some(column) => Err(DataMindError::NonNumericColumn {
                column: token.to_string(),
                found: column.data_type().to_string(),
            }),
            None => token
                .parse::<f64>()
                .map(Operand::Scalar)
                .map_err(|_| DataMindError::column_not_found(token)),
        }
    }
    fn label(&self) -> String {
        match self {
            Operand::Column(name, _) => name.clone(),
            Operand::Scalar(v) => v.to_string(),
        }
    }
    fn f64_at(&self, row: usize) -> Option<f64> {
        match self {
            Operand::Column(_, column) => column.to_f64(row),
            Operand::Scalar(v) => Some(*v),
        }
    }
    fn i64_at(&self, row: usize) -> Option<Option<i64>> {
        match self {
            Operand::Column(_, column) => match &**column {
                Column::Int64(data) => Some(data.get(row).copied().flatten()),
                _ => None,
            },
            Operand::Scalar(_) => None,
        }
    }
    fn is_integer(&self) -> bool {
        matches!(self, Operand::Column(_, c) if c.data_type() == DataType::Int64)
    }
}
fn parse_formula(formula: &str) -> Result<(String, char, String)> {
    let spaced = regex(r"^\s*(.+?)\s+([+\-*/])\s+(.+?)\s*$")?;
    let compact = regex(r"^\s*([^+\-*/]+?)\s*([+\-*/])\s*([^+\-*/]+?)\s*$")?;
    let captures = spaced
        .captures(formula)
        .or_else(|| compact.captures(formula))
        .ok_or_else(|| {
            DataMindError::invalid_parameter(
                "formula",
                format!("'{formula}' has no recognized operator (+, -, *, /)"),
            )
        })?;
    let operator = captures[2].chars().next().unwrap_or('+');
    Ok((captures[1].to_string(), operator, captures[3].to_string()))
}
/// Elementwise `<left> <op> <right>` into `new_column`. Division by zero yields a missing value.
pub fn transform_columns(df: &DataFrame, new_column: &str, formula: &str) -> Result<Applied> {
    let (left_token, operator, right_token) = parse_formula(formula)?;
    let left = Operand::resolve(df, &left_token)?;
    let right = Operand::resolve(df, &right_token)?;
    let rows = df.row_count();
    let column = if left.is_integer() && right.is_integer() && operator != '/' {
        let mut values = Vec::with_capacity(rows);
        for row in 0..rows {
            let (a, b) = (left.i64_at(row).flatten(), right.i64_at(row).flatten());
            let result = match (a, b) {
                (Some(a), Some(b)) => {
                    let computed = match operator {
                        '+' => a.checked_add(b),
                        '-' => a.checked_sub(b),
                        _ => a.checked_mul(b),
                    };
                    Some(computed.ok_or_else(|| DataMindError::OperationFailed {
                        operation: "transform_columns".to_string(),
                        reason: format!("integer overflow at row {row}"),
                    })?)
                }
                _ => None,
            };
            values.push(result);
        }
        Column::from_i64(values)
    } else {
        Column::from_f64(
            (0..rows)
                .map(|row| {
                    let (a, b) = (left.f64_at(row)?, right.f64_at(row)?);
                    let result = match operator {
                        '+' => a + b,
                        '-' => a - b,
                        '*' => a * b,
                        _ if b == 0.0 => return None,
                        _ => a / b,
                    };
                    Some(result).filter(|v| v.is_finite())
                })
                .collect(),
        )
    };
    let missing_results = column.null_count();
    let undo = undo_for_columns(df, &[new_column.to_string()]);
    let mut frame = df.clone();
    frame.add_column(new_column.to_string(), column)?;
    Ok(Applied {
        frame,
        message: format!("Created '{new_column}' from '{formula}'"),
        metadata: OperationMetadata::TransformColumns {
            new_column: new_column.to_string(),
            left: left.label(),
            operator,
            right: right.label(),
            missing_results,
        },
        undo,
    })
}
/// Group-by rollup; groups are sorted by key and missing keys are dropped.
pub fn aggregate(
    df: &DataFrame,
    group_by: &str,
    value_column: &str,
    method: AggregateMethod,
) -> Result<Applied> {
    let keys = df.column(group_by)?;
    let values = df.column(value_column)?;
    if method != AggregateMethod::Count && !values.data_type().is_numeric() {
        return Err(DataMindError::NonNumericColumn {
            column: value_column.to_string(),
            found: values.data_type().to_string(),
        });
    }
    let mut groups: HashMap<String, (Value, Vec<usize>)> = HashMap::new();
    for row in 0..df.row_count() {
        let key = keys.get(row);
        if let Some(text) = key.to_text() {
            groups.entry(text).or_insert_with(|| (key, Vec::new())).1.push(row);
        }
    }
    let mut ordered: Vec<(Value, Vec<usize>)> = groups.into_values().collect();
    ordered.sort_by(|a, b| a.0.total_cmp(&b.0));
    let group_values: Vec<Value> = ordered.iter().map(|(k, _)| k.clone()).collect();
    let aggregated = match (method, values.data_type()) {
        (AggregateMethod::Count, _) => Column::from_i64(
            ordered
                .iter()
                .map(|(_, rows)| Some(rows.iter().filter(|&&r| !values.is_null(r)).count() as i64))
                .collect(),
        ),
        (AggregateMethod::Sum, DataType::Int64) => {
            let mut sums = Vec::with_capacity(ordered.len());
            for (key, rows) in &ordered {
                let mut total = 0i64;
                for &row in rows {
                    if let Value::Int64(v) = values.get(row) {
                        total = total.checked_add(v).ok_or_else(|| {
                            DataMindError::OperationFailed {
                                operation: "aggregate".to_string(),
                                reason: format!(
                                    "sum of '{value_column}' overflows Int64 in group '{}'",
                                    key.to_text().unwrap_or_default()
                                ),
                            }
                        })?;
                    }
                }
                sums.push(Some(total));
            }
            Column::from_i64(sums)
        }
        (AggregateMethod::Sum, _) => Column::from_f64(
            ordered
                .iter()
                .map(|(_, rows)| Some(rows.iter().filter_map(|&r| values.to_f64(r)).sum()))
                .collect(),
        ),
        (AggregateMethod::Mean, _) => Column::from_f64(
            ordered
                .iter()
                .map(|(_, rows)| {
                    let present: Vec<f64> = rows.iter().filter_map(|&r| values.to_f64(r)).collect();
                    stats::mean_of(&present)
                })
                .collect(),
        ),
    };
    let value_name = if value_column == group_by {
        format!("{value_column}_{}", method_name(method))
    } else {
        value_column.to_string()
    };
    let mut frame = DataFrame::new(df.metadata.clone());
    frame.add_column(
        group_by.to_string(),
        Column::from_values(&group_values, keys.data_type())?,
    )?;
    frame.add_column(value_name, aggregated)?;
    Ok(Applied {
        message: format!(
            "Aggregated '{value_column}' by '{group_by}' into {} group(s)",
            frame.row_count()
        ),
        metadata: OperationMetadata::Aggregate {
            group_by: group_by.to_string(),
            value_column: value_column.to_string(),
            method,
            group_count: frame.row_count(),
        },
        frame,
        undo: UndoRecord::Snapshot(df.clone()),
    })
}
fn method_name(method: AggregateMethod) -> &'static str {
    match method {
        AggregateMethod::Sum => "sum",
        AggregateMethod::Mean => "mean",
        AggregateMethod::Count => "count",
    }
}
/// Distinct non-missing values in ascending order.
fn categories(column: &Column) -> Vec<Value> {
    let mut seen: HashMap<String, Value> = HashMap::new();
    for value in column.iter() {
        if let Some(text) = value.to_text() {
            seen.entry(text).or_insert(value);
        }
    }
    let mut distinct: Vec<Value> = seen.into_values().collect();
    distinct.sort_by(|a, b| a.total_cmp(b));
    distinct
}
pub fn encode_categorical(df: &DataFrame, column: &str, method: EncodingMethod) -> Result<Applied> {
    let col = df.column(column)?.clone();
    let distinct = categories(&col);
    if distinct.is_empty() {
        return Err(DataMindError::AllMissing {
            column: column.to_string(),
        });
    }
    let labels: Vec<String> = distinct.iter().filter_map(Value::to_text).collect();
    let codes: HashMap<&str, usize> = labels.iter().enumerate().map(|(i, l)| (l.as_str(), i)).collect();
    let mut frame = df.clone();
    let (new_columns, undo) = match method {
        EncodingMethod::Label => {
            let encoded: Vec<Option<i64>> = (0..col.len())
                .map(|row| {
                    col.get_string(row)
                        .and_then(|text| codes.get(text.as_str()).map(|&c| c as i64))
                })
                .collect();
            frame.add_column(column.to_string(), Column::from_i64(encoded))?;
            (
                vec![column.to_string()],
                undo_for_columns(df, &[column.to_string()]),
            )
        }
        EncodingMethod::OneHot => {
            let names: Vec<String> = labels.iter().map(|l| format!("{column}_{l}")).collect();
            if let Some(existing) = names.iter().find(|n| n.as_str() != column && df.has_column(n)) {
                return Err(DataMindError::invalid_parameter(
                    "column",
                    format!("column '{existing}' already exists"),
                ));
            }
            let (position, original) = frame.drop_column(column)?;
            for (offset, label) in labels.iter().enumerate() {
                let indicator: Vec<Option<bool>> = (0..col.len())
                    .map(|row| Some(col.get_string(row).as_deref() == Some(label.as_str())))
                    .collect();
                frame.insert_column(position + offset, names[offset].clone(), Column::from_bool(indicator))?;
            }
            let undo = UndoRecord::Sequence(vec![
                UndoRecord::RestoreColumn {
                    name: column.to_string(),
                    position,
                    column: original,
                },
                UndoRecord::DropColumns {
                    names: names.clone(),
                },
            ]);
            (names, undo)
        }
    };
    Ok(Applied {
        frame,
        message: format!("Encoded '{column}' with {} categories", labels.len()),
        metadata: OperationMetadata::EncodeCategorical {
            column: column.to_string(),
            method,
            categories: labels,
            new_columns,
        },
        undo,
    })
}
/// Min-max scaling to [0, 1]; a constant column scales to all zeros.
pub fn normalize(df: &DataFrame, column: &str) -> Result<Applied> {
    let present = stats::numeric_values(df, column)?;
    let min = present.iter().copied().fold(f64::INFINITY, f64::min);
    let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    let scaled: Vec<Option<f64>> = df
        .column(column)?
        .f64_values()
        .into_iter()
        .map(|v| {
            v.map(|x| {
                if range == 0.0 {
                    0.0
                } else {
                    ((x - min) / range).clamp(0.0, 1.0)
                }
            })
        })
        .collect();
    let mut frame = df.clone();
    frame.add_column(column.to_string(), Column::from_f64(scaled))?;
    Ok(Applied {
        frame,
        message: format!("Normalized '{column}' to [0, 1]"),
        metadata: OperationMetadata::Normalize {
            column: column.to_string(),
            min,
            max,
        },
        undo: undo_for_columns(df, &[column.to_string()]),
    })
}
fn single_statistic(df: &DataFrame, column: &str, method: StatisticMethod) -> Result<Value> {
    Ok(match method {
        StatisticMethod::Mean => Value::from(stats::mean(df, column)?),
        StatisticMethod::Median => Value::from(stats::median(df, column)?),
        StatisticMethod::Mode => stats::mode(df, column)?,
        StatisticMethod::Min => Value::from(stats::min(df, column)?),
        StatisticMethod::Max => Value::from(stats::max(df, column)?),
        StatisticMethod::StdDev => Value::from(stats::std_dev(df, column, Ddof::Sample)?),
        StatisticMethod::All => {
            return Err(DataMindError::invalid_parameter(
                "method",
                "'all' must be expanded before computing",
            ))
        }
    })
}
fn value_counts(column: &Column) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for row in 0..column.len() {
        if let Some(text) = column.get_string(row) {
            *counts.entry(text).or_default() += 1;
        }
    }
    let mut ordered: Vec<(String, usize)> = counts.into_iter().collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ordered
}
/// Appends `<column>_<statistic>` columns holding each whole-column statistic on every row.
pub fn descriptive_statistics(
    df: &DataFrame,
    columns: &[String],
    method: StatisticMethod,
) -> Result<Applied> {
    for name in columns {
        df.column(name)?;
    }
    let mut frame = df.clone();
    let mut added = Vec::new();
    let mut counts = BTreeMap::new();
    let mut quartiles = BTreeMap::new();
    for name in columns {
        let numeric = df.column(name)?.data_type().is_numeric();
        for statistic in method.expand() {
            if !numeric && statistic != StatisticMethod::Mode && method == StatisticMethod::All {
                continue;
            }
            let value = single_statistic(df, name, statistic)?;
            let data_type = value.data_type().unwrap_or(DataType::Float64);
            let broadcast = Column::from_values(&vec![value; df.row_count()], data_type)?;
            let target = format!("{name}_{}", statistic.suffix());
            frame.add_column(target.clone(), broadcast)?;
            added.push(target);
        }
        if method == StatisticMethod::All {
            if numeric {
                quartiles.insert(
                    name.clone(),
                    Quartiles {
                        q25: stats::quantile(df, name, 0.25)?,
                        q50: stats::quantile(df, name, 0.5)?,
                        q75: stats::quantile(df, name, 0.75)?,
                    },
                );
            } else {
                counts.insert(name.clone(), value_counts(df.column(name)?));
            }
        }
    }
    Ok(Applied {
        frame,
        message: format!("Added {} statistic column(s)", added.len()),
        undo: undo_for_columns(df, &added),
        metadata: OperationMetadata::DescriptiveStatistics {
            added_columns: added,
            value_counts: counts,
            quartiles,
        },
    })
}
#[cfg(test)]
mod tests {
    use super::*;
    fn frame() -> DataFrame {
        DataFrame::from_columns(
            "t",
            vec![
                ("Region", Column::from_text(vec![Some("W"), Some("E"), Some("E"), None])),
                ("Sales", Column::from_i64(vec![Some(10), Some(20), Some(30), Some(40)])),
                ("Price", Column::from_f64(vec![Some(1.5), None, Some(2.0), Some(4.0)])),
                ("Name", Column::from_text(vec![Some("Ada Lovelace"), Some("Alan M Turing"), None, Some("Grace Hopper")])),
            ],
        )
        .unwrap()
    }
    #[test]
    fn filter_expression_over_columns() {
        let df = frame();
        let applied = filter_rows(&df, None, "Sales > 15 and Region == \"E\"").unwrap();
        assert_eq!(applied.frame.row_count(), 2);
        let shorthand = filter_rows(&df, Some("Price"), ">= 2").unwrap();
        assert_eq!(shorthand.frame.row_count(), 2);
        assert_eq!(shorthand.undo.undo(&shorthand.frame).unwrap(), df);
        assert!(matches!(
            filter_rows(&df, None, "Sales >"),
            Err(DataMindError::InvalidExpression { .. })
        ));
        assert!(matches!(
            filter_rows(&df, None, "Unknown > 1"),
            Err(DataMindError::InvalidExpression { .. })
        ));
    }
    #[test]
    fn filter_leaves_quoted_literals_untouched() {
        let df = DataFrame::from_columns(
            "t",
            vec![
                ("Genre", Column::from_text(vec![Some("rock and roll"), Some("jazz")])),
                ("Tag", Column::from_text(vec![Some("a=b"), Some("c")])),
            ],
        )
        .unwrap();
        let genre = filter_rows(&df, None, "Genre == \"rock and roll\"").unwrap();
        assert_eq!(genre.frame.row_count(), 1);
        assert_eq!(genre.frame.value("Genre", 0), Value::from("rock and roll"));
        let tag = filter_rows(&df, None, "Tag = \"a=b\" or Genre = \"x or y\"").unwrap();
        assert_eq!(tag.frame.row_count(), 1);
        assert_eq!(tag.frame.value("Tag", 0), Value::from("a=b"));
        let shorthand = filter_rows(&df, Some("Tag"), "=\"c\"").unwrap();
        assert_eq!(shorthand.frame.value("Tag", 0), Value::from("c"));
        assert_eq!(
            normalize_operators("a = \"x \\\" and y\" and b<=2").unwrap(),
            "a == \"x \\\" and y\" && b<=2"
        );
    }
    #[test]
    fn missing_operand_fails_only_its_comparison() {
        let df = DataFrame::from_columns(
            "t",
            vec![
                ("a", Column::from_i64(vec![Some(20), Some(5), None])),
                ("b", Column::from_i64(vec![None, Some(2), None])),
            ],
        )
        .unwrap();
        let either = filter_rows(&df, None, "a > 15 or b > 1").unwrap();
        assert_eq!(either.frame.row_count(), 2);
        assert_eq!(either.frame.value("a", 0), Value::Int64(20));
        let both = filter_rows(&df, None, "a > 15 and b > 1").unwrap();
        assert_eq!(both.frame.row_count(), 0);
        let negated = filter_rows(&df, None, "!(a > 15)").unwrap();
        assert_eq!(negated.frame.row_count(), 2);
    }
    #[test]
    fn bins_are_half_open_with_closed_last_interval() {
        let df = frame();
        let applied = bin_column(&df, "Sales", &[0.0, 20.0, 40.0], None).unwrap();
        let binned = applied.frame.column("Sales_binned").unwrap();
        assert_eq!(binned.get(0), Value::from("[0, 20)"));
        assert_eq!(binned.get(1), Value::from("[20, 40]"));
        assert_eq!(binned.get(3), Value::from("[20, 40]"));
        assert!(bin_column(&df, "Sales", &[1.0], None).is_err());
        let narrow = bin_column(&df, "Sales", &[0.0, 25.0], Some("band")).unwrap();
        assert_eq!(narrow.frame.value("band", 3), Value::Null);
    }
    #[test]
    fn split_keeps_remainder_in_last_part() {
        let df = frame();
        let applied = split_column(&df, "Name", 2).unwrap();
        assert_eq!(applied.frame.value("Name_2", 1), Value::from("M Turing"));
        assert_eq!(applied.frame.value("Name_1", 2), Value::Null);
        assert_eq!(applied.frame.column_position("Name_1"), Some(4));
        assert!(split_column(&df, "Name", 3).is_err());
        assert!(split_column(&df, "Sales", 2).is_err());
    }
    #[test]
    fn transform_with_integer_and_float_operands() {
        let df = frame();
        let sum = transform_columns(&df, "Total", "Sales + Sales").unwrap();
        assert_eq!(sum.frame.value("Total", 1), Value::Int64(40));
        let ratio = transform_columns(&df, "Unit", "Sales/Price").unwrap();
        assert_eq!(ratio.frame.value("Unit", 2), Value::Float64(15.0));
        assert_eq!(ratio.frame.value("Unit", 1), Value::Null);
        let scaled = transform_columns(&df, "Double", "Price * 2").unwrap();
        assert_eq!(scaled.frame.value("Double", 3), Value::Float64(8.0));
        assert!(matches!(
            transform_columns(&df, "X", "Sales % Price"),
            Err(DataMindError::InvalidParameter { .. })
        ));
        assert!(matches!(
            transform_columns(&df, "X", "Sales + Missing"),
            Err(DataMindError::ColumnNotFound { .. })
        ));
        assert_eq!(ratio.undo.undo(&ratio.frame).unwrap(), df);
    }
    #[test]
    fn aggregate_groups_sorted_by_key() {
        let df = frame();
        let applied = aggregate(&df, "Region", "Sales", AggregateMethod::Sum).unwrap();
        assert_eq!(applied.frame.row_count(), 2);
        assert_eq!(applied.frame.value("Region", 0), Value::from("E"));
        assert_eq!(applied.frame.value("Sales", 0), Value::Int64(50));
        let mean = aggregate(&df, "Region", "Price", AggregateMethod::Mean).unwrap();
        assert_eq!(mean.frame.value("Price", 0), Value::Float64(2.0));
        let count = aggregate(&df, "Region", "Region", AggregateMethod::Count).unwrap();
        assert_eq!(count.frame.value("Region_count", 0), Value::Int64(2));
        assert!(aggregate(&df, "Region", "Name", AggregateMethod::Sum).is_err());
        assert_eq!(applied.undo.undo(&applied.frame).unwrap(), df);
    }
    #[test]
    fn integer_sum_is_exact_and_reports_overflow() {
        let large = DataFrame::from_columns(
            "t",
            vec![
                ("k", Column::from_text(vec![Some("a"), Some("a"), Some("b")])),
                ("v", Column::from_i64(vec![Some(9_007_199_254_740_993), Some(2), None])),
            ],
        )
        .unwrap();
        let applied = aggregate(&large, "k", "v", AggregateMethod::Sum).unwrap();
        assert_eq!(applied.frame.value("v", 0), Value::Int64(9_007_199_254_740_995));
        assert_eq!(applied.frame.value("v", 1), Value::Int64(0));
        let overflowing = DataFrame::from_columns(
            "t",
            vec![
                ("k", Column::from_text(vec![Some("a"), Some("a")])),
                ("v", Column::from_i64(vec![Some(i64::MAX), Some(1)])),
            ],
        )
        .unwrap();
        assert!(matches!(
            aggregate(&overflowing, "k", "v", AggregateMethod::Sum),
            Err(DataMindError::OperationFailed { .. })
        ));
    }
    #[test]
    fn encodings_replace_the_column() {
        let df = frame();
        let label = encode_categorical(&df, "Region", EncodingMethod::Label).unwrap();
        assert_eq!(label.frame.value("Region", 0), Value::Int64(1));
        assert_eq!(label.frame.value("Region", 3), Value::Null);
        let one_hot = encode_categorical(&df, "Region", EncodingMethod::OneHot).unwrap();
        assert_eq!(
            &one_hot.frame.column_names()[..2],
            ["Region_E".to_string(), "Region_W".to_string()]
        );
        assert_eq!(one_hot.frame.value("Region_W", 0), Value::Boolean(true));
        assert_eq!(one_hot.frame.value("Region_E", 3), Value::Boolean(false));
        assert_eq!(one_hot.undo.undo(&one_hot.frame).unwrap(), df);
    }
    #[test]
    fn normalize_constant_column_is_zero() {
        let df = DataFrame::from_columns(
            "w",
            vec![("Weight", Column::from_i64(vec![Some(5), Some(5), Some(5)]))],
        )
        .unwrap();
        let applied = normalize(&df, "Weight").unwrap();
        assert_eq!(
            applied.frame.column("Weight").unwrap().f64_values(),
            vec![Some(0.0); 3]
        );
    }
    #[test]
    fn descriptive_statistics_broadcast_columns() {
        let df = frame();
        let applied =
            descriptive_statistics(&df, &["Sales".to_string()], StatisticMethod::Mean).unwrap();
        assert_eq!(applied.frame.value("Sales_mean", 3), Value::Float64(25.0));
        let all = descriptive_statistics(
            &df,
            &["Sales".to_string(), "Region".to_string()],
            StatisticMethod::All,
        )
        .unwrap();
        assert!(all.frame.has_column("Sales_std_dev"));
        assert!(all.frame.has_column("Region_mode"));
        assert!(!all.frame.has_column("Region_mean"));
        match &all.metadata {
            OperationMetadata::DescriptiveStatistics { value_counts, quartiles, .. } => {
                assert_eq!(value_counts["Region"][0], ("E".to_string(), 2));
                assert_eq!(quartiles["Sales"].q50, 25.0);
            }
            other => panic!("unexpected metadata {other:?}"),
        }
        assert!(descriptive_statistics(&df, &["Region".to_string()], StatisticMethod::Max).is_err());
        assert_eq!(all.undo.undo(&all.frame).unwrap(), df);
    }
}
