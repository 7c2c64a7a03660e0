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

use crate::data_handler::common::{DataMindError, DataType, Result, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rayon::prelude::*;
use std::sync::Arc;
const PARALLEL_THRESHOLD: usize = 50_000;
const MISSING_TOKENS: [&str; 6] = ["", "na", "n/a", "nan", "null", "none"];
pub trait ColumnData: Send + Sync + std::fmt::Debug {
    fn len(&self) -> usize;
    fn data_type(&self) -> DataType;
    fn null_count(&self) -> usize;
    fn get_string(&self, index: usize) -> Option<String>;
    fn to_f64(&self, index: usize) -> Option<f64>;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Int64(Arc<[Option<i64>]>),
    Float64(Arc<[Option<f64>]>),
    String(Arc<[Option<Arc<str>>]>),
    Boolean(Arc<[Option<bool>]>),
    DateTime(Arc<[Option<NaiveDateTime>]>),
}
macro_rules! take_positions {
    ($data:expr, $indices:expr, $variant:path) => {{
        let mut taken = Vec::with_capacity($indices.len());
        for &i in $indices {
            let value = $data.get(i).cloned().ok_or_else(|| DataMindError::OperationFailed {
                operation: "select_rows".to_string(),
                reason: format!("row index {i} out of bounds"),
            })?;
            taken.push(value);
        }
        $variant(taken.into())
    }};
}
impl ColumnData for Column {
    fn len(&self) -> usize {
        match self {
            Column::Int64(data) => data.len(),
            Column::Float64(data) => data.len(),
            Column::String(data) => data.len(),
            Column::Boolean(data) => data.len(),
            Column::DateTime(data) => data.len(),
        }
    }
    fn data_type(&self) -> DataType {
        match self {
            Column::Int64(_) => DataType::Int64,
            Column::Float64(_) => DataType::Float64,
            Column::String(_) => DataType::String,
            Column::Boolean(_) => DataType::Boolean,
            Column::DateTime(_) => DataType::DateTime,
        }
    }
    fn null_count(&self) -> usize {
        match self {
            Column::Int64(data) => data.iter().filter(|v| v.is_none()).count(),
            Column::Float64(data) if data.len() > PARALLEL_THRESHOLD => {
                data.par_iter().filter(|v| v.is_none()).count()
            }
            Column::Float64(data) => data.iter().filter(|v| v.is_none()).count(),
            Column::String(data) => data.iter().filter(|v| v.is_none()).count(),
            Column::Boolean(data) => data.iter().filter(|v| v.is_none()).count(),
            Column::DateTime(data) => data.iter().filter(|v| v.is_none()).count(),
        }
    }
    fn get_string(&self, index: usize) -> Option<String> {
        self.get(index).to_text()
    }
    fn to_f64(&self, index: usize) -> Option<f64> {
        match self {
            Column::Int64(data) => data.get(index).and_then(|opt| opt.map(|v| v as f64)),
            Column::Float64(data) => data.get(index).copied()?,
            _ => None,
        }
    }
}
impl Column {
    pub fn get(&self, index: usize) -> Value {
        match self {
            Column::Int64(data) => data.get(index).copied().flatten().into(),
            Column::Float64(data) => data.get(index).copied().flatten().into(),
            Column::String(data) => match data.get(index).cloned().flatten() {
                Some(s) => Value::String(s.to_string()),
                None => Value::Null,
            },
            Column::Boolean(data) => data.get(index).copied().flatten().into(),
            Column::DateTime(data) => match data.get(index).copied().flatten() {
                Some(dt) => Value::DateTime(dt),
                None => Value::Null,
            },
        }
    }
    pub fn is_null(&self, index: usize) -> bool {
        self.get(index).is_null()
    }
    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }
    pub fn missing_positions(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.is_null(i)).collect()
    }
    /// Numeric view with missing cells as `None`. Empty for non-numeric columns.
    pub fn f64_values(&self) -> Vec<Option<f64>> {
        match self {
            Column::Int64(data) => data.iter().map(|v| v.map(|x| x as f64)).collect(),
            Column::Float64(data) => data.to_vec(),
            _ => Vec::new(),
        }
    }
    pub fn str_at(&self, index: usize) -> Option<&str> {
        match self {
            Column::String(data) => data.get(index).and_then(|v| v.as_deref()),
            _ => None,
        }
    }
    pub fn from_f64(values: Vec<Option<f64>>) -> Self {
        let cleaned: Vec<Option<f64>> = values
            .into_iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect();
        Column::Float64(cleaned.into())
    }
    pub fn from_i64(values: Vec<Option<i64>>) -> Self {
        Column::Int64(values.into())
    }
    pub fn from_bool(values: Vec<Option<bool>>) -> Self {
        Column::Boolean(values.into())
    }
    pub fn from_datetime(values: Vec<Option<NaiveDateTime>>) -> Self {
        Column::DateTime(values.into())
    }
    pub fn from_text<S: AsRef<str>>(values: Vec<Option<S>>) -> Self {
        let strings: Vec<Option<Arc<str>>> = values
            .into_iter()
            .map(|v| v.map(|s| Arc::from(s.as_ref())))
            .collect();
        Column::String(strings.into())
    }
    /// Builds a column of `data_type` from cells; cells of another kind are converted or fail.
    pub fn from_values(values: &[Value], data_type: DataType) -> Result<Self> {
        let mismatch = |v: &Value| DataMindError::OperationFailed {
            operation: "build_column".to_string(),
            reason: format!("value {v} does not fit a {data_type} column"),
        };
        Ok(match data_type {
            DataType::Int64 => Column::from_i64(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::Int64(x) => Ok(Some(*x)),
                        Value::Float64(x) if x.fract() == 0.0 => Ok(Some(*x as i64)),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<_>>()?,
            ),
            DataType::Float64 => Column::from_f64(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        other => other.as_f64().map(Some).ok_or_else(|| mismatch(other)),
                    })
                    .collect::<Result<_>>()?,
            ),
            DataType::Boolean => Column::from_bool(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::Boolean(b) => Ok(Some(*b)),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<_>>()?,
            ),
            DataType::DateTime => Column::from_datetime(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::DateTime(dt) => Ok(Some(*dt)),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<_>>()?,
            ),
            DataType::String => Column::from_text(values.iter().map(|v| v.to_text()).collect()),
        })
    }
    pub fn select_rows(&self, indices: &[usize]) -> Result<Column> {
        Ok(match self {
            Column::Int64(data) => take_positions!(data, indices, Column::Int64),
            Column::Float64(data) => take_positions!(data, indices, Column::Float64),
            Column::String(data) => take_positions!(data, indices, Column::String),
            Column::Boolean(data) => take_positions!(data, indices, Column::Boolean),
            Column::DateTime(data) => take_positions!(data, indices, Column::DateTime),
        })
    }
    /// The type a column must take on to hold `value` alongside its current cells.
    pub fn widened_type(&self, value: &Value) -> DataType {
        match (self.data_type(), value) {
            (current, Value::Null) => current,
            (DataType::Int64, Value::Int64(_)) => DataType::Int64,
            (DataType::Int64 | DataType::Float64, Value::Float64(_) | Value::Int64(_)) => {
                DataType::Float64
            }
            (DataType::Boolean, Value::Boolean(_)) => DataType::Boolean,
            (DataType::DateTime, Value::DateTime(_)) => DataType::DateTime,
            _ => DataType::String,
        }
    }
    /// Writes `value` at every position in `positions`, widening the column type if needed.
    pub fn set_positions(&self, positions: &[usize], value: &Value) -> Result<Column> {
        let target = self.widened_type(value);
        let mut cells: Vec<Value> = self.iter().collect();
        for &i in positions {
            match cells.get_mut(i) {
                Some(cell) => *cell = value.clone(),
                None => {
                    return Err(DataMindError::OperationFailed {
                        operation: "set_positions".to_string(),
                        reason: format!("row index {i} out of bounds"),
                    })
                }
            }
        }
        Column::from_values(&cells, target)
    }
    /// Coerce-on-error conversion: cells that cannot be converted become missing.
    pub fn cast(&self, target: DataType, datetime_formats: &[String]) -> Column {
        match target {
            DataType::Int64 => Column::from_i64(
                self.iter()
                    .map(|v| match v {
                        Value::Int64(x) => Some(x),
                        Value::Float64(x) => truncate_f64(x),
                        Value::Boolean(b) => Some(b as i64),
                        Value::String(s) => parse_integer_lenient(&s),
                        _ => None,
                    })
                    .collect(),
            ),
            DataType::Float64 => Column::from_f64(
                self.iter()
                    .map(|v| match v {
                        Value::Int64(x) => Some(x as f64),
                        Value::Float64(x) => Some(x),
                        Value::Boolean(b) => Some(if b { 1.0 } else { 0.0 }),
                        Value::String(s) => parse_finite_f64(&s),
                        _ => None,
                    })
                    .collect(),
            ),
            DataType::Boolean => Column::from_bool(
                self.iter()
                    .map(|v| match v {
                        Value::Boolean(b) => Some(b),
                        Value::Int64(x) => Some(x != 0),
                        Value::Float64(x) => Some(x != 0.0),
                        Value::String(s) => parse_bool(&s),
                        _ => None,
                    })
                    .collect(),
            ),
            DataType::DateTime => Column::from_datetime(
                self.iter()
                    .map(|v| match v {
                        Value::DateTime(dt) => Some(dt),
                        other => other
                            .to_text()
                            .and_then(|s| parse_datetime(&s, datetime_formats)),
                    })
                    .collect(),
            ),
            DataType::String => Column::from_text(self.iter().map(|v| v.to_text()).collect()),
        }
    }
}
pub fn is_missing_token(raw: &str) -> bool {
    let trimmed = raw.trim();
    MISSING_TOKENS
        .iter()
        .any(|token| trimmed.eq_ignore_ascii_case(token))
}
pub fn parse_finite_f64(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
fn truncate_f64(v: f64) -> Option<i64> {
    if v.is_finite() && v.abs() < i64::MAX as f64 {
        Some(v.trunc() as i64)
    } else {
        None
    }
}
fn parse_integer_lenient(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| parse_finite_f64(trimmed).and_then(truncate_f64))
}
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}
pub fn parse_datetime(raw: &str, formats: &[String]) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.naive_utc())
}
#[derive(Debug)]
pub struct ColumnBuilder {
    values: Vec<Option<String>>,
    datetime_formats: Vec<String>,
    inference_sample: usize,
}
impl ColumnBuilder {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            datetime_formats: crate::config::ParsingConfig::default().datetime_formats,
            inference_sample: 1000,
        }
    }
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            ..Self::new()
        }
    }
    pub fn with_datetime_formats(mut self, formats: &[String]) -> Self {
        self.datetime_formats = formats.to_vec();
        self
    }
    pub fn with_inference_sample(mut self, sample: usize) -> Self {
        self.inference_sample = sample.max(1);
        self
    }
    pub fn push(&mut self, raw: Option<&str>) {
        let value = raw
            .filter(|s| !is_missing_token(s))
            .map(|s| s.trim().to_string());
        self.values.push(value);
    }
    pub fn build(self) -> Column {
        let present = || self.values.iter().flatten();
        let sampled = self.infer_type(present().take(self.inference_sample));
        let data_type = if self.parses_all(present(), sampled) {
            sampled
        } else {
            self.infer_type(present())
        };
        let as_text = Column::from_text(self.values.clone());
        match data_type {
            DataType::String => as_text,
            other => as_text.cast(other, &self.datetime_formats),
        }
    }
    fn parses_as(&self, value: &str, data_type: DataType) -> bool {
        match data_type {
            DataType::Int64 => value.parse::<i64>().is_ok(),
            DataType::Float64 => parse_finite_f64(value).is_some(),
            DataType::Boolean => parse_bool(value).is_some(),
            DataType::DateTime => parse_datetime(value, &self.datetime_formats).is_some(),
            DataType::String => true,
        }
    }
    fn parses_all<'a>(&self, mut values: impl Iterator<Item = &'a String>, data_type: DataType) -> bool {
        values.all(|v| self.parses_as(v, data_type))
    }
    /// Narrowest of Int64, Float64, Boolean, DateTime that every value parses as.
    fn infer_type<'a>(&self, values: impl Iterator<Item = &'a String> + Clone) -> DataType {
        let candidates = [
            DataType::Int64,
            DataType::Float64,
            DataType::Boolean,
            DataType::DateTime,
        ];
        if values.clone().next().is_none() {
            return DataType::String;
        }
        candidates
            .into_iter()
            .find(|&candidate| self.parses_all(values.clone(), candidate))
            .unwrap_or(DataType::String)
    }
}
impl Default for ColumnBuilder {
    fn default() -> Self {
        Self::new()
    }
}
