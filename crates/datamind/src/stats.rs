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

//! Column-level statistical primitives.
//!
//! The slice helpers operate on already-cleaned values. The column functions resolve a
//! column by name, reject non-numeric or all-missing columns and then delegate.
use crate::data_handler::{ColumnData, DataFrame, LogicalType, Value};
use crate::error::{DataMindError, Result};
use std::collections::HashMap;
/// Degrees-of-freedom correction for variance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ddof {
    Population,
    Sample,
}
impl Ddof {
    fn value(self) -> usize {
        match self {
            Ddof::Population => 0,
            Ddof::Sample => 1,
        }
    }
}
pub fn mean_of(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}
pub fn variance_of(data: &[f64], ddof: Ddof) -> Option<f64> {
    let n = data.len();
    if n <= ddof.value() {
        return None;
    }
    let m = mean_of(data)?;
    let ss: f64 = data.iter().map(|&x| (x - m).powi(2)).sum();
    Some(ss / (n - ddof.value()) as f64)
}
pub fn std_dev_of(data: &[f64], ddof: Ddof) -> Option<f64> {
    variance_of(data, ddof).map(f64::sqrt)
}
pub fn sorted(data: &[f64]) -> Vec<f64> {
    let mut values = data.to_vec();
    values.sort_by(|a, b| a.total_cmp(b));
    values
}
/// Linear interpolation between closest ranks.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n == 1 {
        return Some(sorted[0]);
    }
    let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = lo + 1;
    let frac = pos - lo as f64;
    if hi >= n {
        Some(sorted[n - 1])
    } else {
        Some(sorted[lo] * (1.0 - frac) + sorted[hi] * frac)
    }
}
pub fn median_of(data: &[f64]) -> Option<f64> {
    quantile_sorted(&sorted(data), 0.5)
}
/// Bias-adjusted Fisher-Pearson skewness. Needs at least three values.
pub fn skewness_of(data: &[f64]) -> Option<f64> {
    let n = data.len();
    if n < 3 {
        return None;
    }
    let m = mean_of(data)?;
    let nf = n as f64;
    let m2 = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / nf;
    let m3 = data.iter().map(|x| (x - m).powi(3)).sum::<f64>() / nf;
    if m2 == 0.0 {
        return Some(0.0);
    }
    Some((nf * (nf - 1.0)).sqrt() / (nf - 2.0) * m3 / m2.powf(1.5))
}
/// Excess kurtosis with the unbiased estimator. Needs at least four values.
pub fn kurtosis_of(data: &[f64]) -> Option<f64> {
    let n = data.len();
    if n < 4 {
        return None;
    }
    let m = mean_of(data)?;
    let nf = n as f64;
    let m2 = data.iter().map(|x| (x - m).powi(2)).sum::<f64>();
    let m4 = data.iter().map(|x| (x - m).powi(4)).sum::<f64>();
    let denominator = (nf - 2.0) * (nf - 3.0) * m2 * m2;
    if denominator == 0.0 {
        return Some(0.0);
    }
    let adjustment = 3.0 * (nf - 1.0).powi(2) / ((nf - 2.0) * (nf - 3.0));
    Some(nf * (nf + 1.0) * (nf - 1.0) * m4 / denominator - adjustment)
}
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let (mx, my) = (mean_of(x)?, mean_of(y)?);
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        vx += (a - mx).powi(2);
        vy += (b - my).powi(2);
    }
    if vx == 0.0 || vy == 0.0 {
        return None;
    }
    Some(cov / (vx * vy).sqrt())
}
/// Most frequent value; ties resolve to the smallest value.
pub fn mode_of<I: IntoIterator<Item = Value>>(values: I) -> Option<Value> {
    let mut counts: HashMap<String, (Value, usize)> = HashMap::new();
    for value in values {
        if let Some(key) = value.to_text() {
            counts.entry(key).or_insert((value, 0)).1 += 1;
        }
    }
    counts
        .into_values()
        .max_by(|(va, ca), (vb, cb)| ca.cmp(cb).then_with(|| vb.total_cmp(va)))
        .map(|(value, _)| value)
}
pub fn column_kind(df: &DataFrame, column: &str) -> Result<LogicalType> {
    Ok(df.column(column)?.data_type().logical())
}
pub fn is_numeric(df: &DataFrame, column: &str) -> Result<bool> {
    Ok(column_kind(df, column)? == LogicalType::Numeric)
}
pub fn missing_count(df: &DataFrame, column: &str) -> Result<usize> {
    Ok(df.column(column)?.null_count())
}
/// Non-missing values of a numeric column.
pub fn numeric_values(df: &DataFrame, column: &str) -> Result<Vec<f64>> {
    let col = df.column(column)?;
    if !col.data_type().is_numeric() {
        return Err(DataMindError::NonNumericColumn {
            column: column.to_string(),
            found: col.data_type().to_string(),
        });
    }
    let values: Vec<f64> = col.f64_values().into_iter().flatten().collect();
    if values.is_empty() {
        return Err(DataMindError::AllMissing {
            column: column.to_string(),
        });
    }
    Ok(values)
}
fn with_values<F: FnOnce(&[f64]) -> Option<f64>>(df: &DataFrame, column: &str, f: F) -> Result<f64> {
    let values = numeric_values(df, column)?;
    f(&values).ok_or_else(|| DataMindError::OperationFailed {
        operation: "statistics".to_string(),
        reason: format!("not enough values in '{column}'"),
    })
}
pub fn mean(df: &DataFrame, column: &str) -> Result<f64> {
    with_values(df, column, mean_of)
}
pub fn median(df: &DataFrame, column: &str) -> Result<f64> {
    with_values(df, column, median_of)
}
/// Standard deviation; the sample estimator of a single value is reported as 0.
pub fn std_dev(df: &DataFrame, column: &str, ddof: Ddof) -> Result<f64> {
    with_values(df, column, |v| std_dev_of(v, ddof).or(Some(0.0)))
}
pub fn min(df: &DataFrame, column: &str) -> Result<f64> {
    with_values(df, column, |v| v.iter().copied().reduce(f64::min))
}
pub fn max(df: &DataFrame, column: &str) -> Result<f64> {
    with_values(df, column, |v| v.iter().copied().reduce(f64::max))
}
pub fn quantile(df: &DataFrame, column: &str, p: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&p) {
        return Err(DataMindError::invalid_parameter(
            "quantile",
            format!("{p} is outside [0, 1]"),
        ));
    }
    with_values(df, column, |v| quantile_sorted(&sorted(v), p))
}
pub fn skewness(df: &DataFrame, column: &str) -> Result<Option<f64>> {
    Ok(skewness_of(&numeric_values(df, column)?))
}
pub fn kurtosis(df: &DataFrame, column: &str) -> Result<Option<f64>> {
    Ok(kurtosis_of(&numeric_values(df, column)?))
}
/// Mode of any column type.
pub fn mode(df: &DataFrame, column: &str) -> Result<Value> {
    let col = df.column(column)?;
    mode_of(col.iter()).ok_or_else(|| DataMindError::NoMode {
        column: column.to_string(),
    })
}
