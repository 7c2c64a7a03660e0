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

//! Exploratory report over a dataset: shape, per-column statistics,
//! correlations and a baseline linear regression.

use crate::data_handler::{Column, ColumnData, ColumnMetadata, DataFrame, DataType, Value};
use crate::error::Result;
use crate::stats::{self, Ddof};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
const TOP_CATEGORIES: usize = 5;
const REGRESSION_SAMPLES: usize = 5;
/// Every fifth complete row is held out for evaluation.
const TEST_STRIDE: usize = 5;
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NumericSummary {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
    pub max: f64,
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
}
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryCount {
    pub value: String,
    pub count: usize,
}
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoricalSummary {
    pub column: String,
    pub unique: usize,
    pub top: Vec<CategoryCount>,
}
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Prediction {
    pub actual: f64,
    pub predicted: f64,
}
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RegressionReport {
    pub target: String,
    pub features: Vec<String>,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub r_squared: Option<f64>,
    pub samples: Vec<Prediction>,
}
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnalysisReport {
    pub rows: usize,
    pub columns: usize,
    pub schema: Vec<ColumnMetadata>,
    pub numeric: Vec<NumericSummary>,
    pub categorical: Vec<CategoricalSummary>,
    pub correlation: CorrelationMatrix,
    pub regression: Option<RegressionReport>,
}
pub fn analyze(df: &DataFrame) -> Result<AnalysisReport> {
    let numeric_names: Vec<String> = df
        .columns_in_order()
        .filter(|(_, c)| c.data_type().is_numeric())
        .map(|(n, _)| n.clone())
        .collect();
    let mut numeric = Vec::new();
    for name in &numeric_names {
        if let Some(summary) = describe(df, name)? {
            numeric.push(summary);
        }
    }
    let categorical = df
        .columns_in_order()
        .filter(|(_, c)| c.data_type() == DataType::String)
        .map(|(name, column)| categorical_summary(name, column))
        .collect();
    Ok(AnalysisReport {
        rows: df.row_count(),
        columns: df.column_count(),
        schema: df.schema(),
        numeric,
        categorical,
        correlation: correlation(df),
        regression: regression(df, &numeric_names),
    })
}
pub fn describe(df: &DataFrame, column: &str) -> Result<Option<NumericSummary>> {
    let col = df.column(column)?;
    if col.null_count() == col.len() {
        return Ok(None);
    }
    let values = stats::numeric_values(df, column)?;
    let sorted = stats::sorted(&values);
    let q = |p: f64| stats::quantile_sorted(&sorted, p).unwrap_or(f64::NAN);
    Ok(Some(NumericSummary {
        column: column.to_string(),
        count: values.len(),
        mean: stats::mean_of(&values).unwrap_or(f64::NAN),
        std: stats::std_dev_of(&values, Ddof::Sample).unwrap_or(0.0),
        min: q(0.0),
        q25: q(0.25),
        q50: q(0.5),
        q75: q(0.75),
        max: q(1.0),
        skewness: stats::skewness_of(&values),
        kurtosis: stats::kurtosis_of(&values),
    }))
}
fn categorical_summary(name: &str, column: &Column) -> CategoricalSummary {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for row in 0..column.len() {
        if let Some(value) = column.get_string(row) {
            *counts.entry(value).or_default() += 1;
        }
    }
    let unique = counts.len();
    let mut ranked: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(value, count)| CategoryCount { value, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    ranked.truncate(TOP_CATEGORIES);
    CategoricalSummary {
        column: name.to_string(),
        unique,
        top: ranked,
    }
}
/// Numeric view of a column; text is label encoded by sorted distinct value.
fn encoded(column: &Column) -> Option<Vec<Option<f64>>> {
    match column.data_type() {
        DataType::Int64 | DataType::Float64 => Some(column.f64_values()),
        DataType::Boolean => Some(
            column
                .iter()
                .map(|v| match v {
                    Value::Boolean(b) => Some(f64::from(u8::from(b))),
                    _ => None,
                })
                .collect(),
        ),
        DataType::String => {
            let labels: BTreeSet<&str> = (0..column.len()).filter_map(|i| column.str_at(i)).collect();
            let codes: HashMap<&str, f64> = labels
                .into_iter()
                .enumerate()
                .map(|(code, label)| (label, code as f64))
                .collect();
            Some(
                (0..column.len())
                    .map(|i| column.str_at(i).and_then(|s| codes.get(s).copied()))
                    .collect(),
            )
        }
        DataType::DateTime => None,
    }
}
/// Pairwise Pearson correlation over rows where both values are present.
pub fn correlation(df: &DataFrame) -> CorrelationMatrix {
    let (columns, series): (Vec<String>, Vec<Vec<Option<f64>>>) = df
        .columns_in_order()
        .filter_map(|(name, column)| encoded(column).map(|values| (name.clone(), values)))
        .unzip();
    let values = series
        .iter()
        .map(|a| {
            series
                .iter()
                .map(|b| {
                    let (x, y): (Vec<f64>, Vec<f64>) = a
                        .iter()
                        .zip(b)
                        .filter_map(|pair| match pair {
                            (Some(x), Some(y)) => Some((*x, *y)),
                            _ => None,
                        })
                        .unzip();
                    stats::pearson(&x, &y)
                })
                .collect()
        })
        .collect();
    CorrelationMatrix { columns, values }
}
/// Ordinary least squares of the first numeric column on the remaining numeric columns.
pub fn regression(df: &DataFrame, numeric: &[String]) -> Option<RegressionReport> {
    let (target, features) = numeric.split_first()?;
    if features.is_empty() {
        return None;
    }
    let target_values = df.get_column(target)?.f64_values();
    let feature_values: Vec<Vec<Option<f64>>> = features
        .iter()
        .map(|f| df.get_column(f).map(|c| c.f64_values()))
        .collect::<Option<_>>()?;
    let complete: Vec<(Vec<f64>, f64)> = (0..df.row_count())
        .filter_map(|row| {
            let y = target_values[row]?;
            let x = feature_values
                .iter()
                .map(|f| f[row])
                .collect::<Option<Vec<f64>>>()?;
            Some((x, y))
        })
        .collect();
    let (test, train): (Vec<_>, Vec<_>) = complete
        .into_iter()
        .enumerate()
        .partition(|(i, _)| i % TEST_STRIDE == TEST_STRIDE - 1);
    let train: Vec<(Vec<f64>, f64)> = train.into_iter().map(|(_, r)| r).collect();
    let test: Vec<(Vec<f64>, f64)> = test.into_iter().map(|(_, r)| r).collect();
    if train.len() <= features.len() {
        return None;
    }
    let beta = fit_least_squares(&train)?;
    let predict = |x: &[f64]| beta[0] + x.iter().zip(&beta[1..]).map(|(a, b)| a * b).sum::<f64>();
    let predictions: Vec<Prediction> = test
        .iter()
        .map(|(x, y)| Prediction {
            actual: *y,
            predicted: predict(x),
        })
        .collect();
    Some(RegressionReport {
        target: target.clone(),
        features: features.to_vec(),
        intercept: beta[0],
        coefficients: beta[1..].to_vec(),
        train_rows: train.len(),
        test_rows: test.len(),
        r_squared: r_squared(&predictions),
        samples: predictions.into_iter().take(REGRESSION_SAMPLES).collect(),
    })
}
fn r_squared(predictions: &[Prediction]) -> Option<f64> {
    if predictions.len() < 2 {
        return None;
    }
    let actual: Vec<f64> = predictions.iter().map(|p| p.actual).collect();
    let mean = stats::mean_of(&actual)?;
    let ss_tot: f64 = actual.iter().map(|y| (y - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return None;
    }
    let ss_res: f64 = predictions
        .iter()
        .map(|p| (p.actual - p.predicted).powi(2))
        .sum();
    Some(1.0 - ss_res / ss_tot)
}
/// Solves the normal equations with an intercept term. Returns `None` when singular.
fn fit_least_squares(rows: &[(Vec<f64>, f64)]) -> Option<Vec<f64>> {
    let width = rows.first()?.0.len() + 1;
    let mut xtx = vec![vec![0.0; width]; width];
    let mut xty = vec![0.0; width];
    for (x, y) in rows {
        let design: Vec<f64> = std::iter::once(1.0).chain(x.iter().copied()).collect();
        for i in 0..width {
            xty[i] += design[i] * y;
            for j in 0..width {
                xtx[i][j] += design[i] * design[j];
            }
        }
    }
    solve(xtx, xty)
}
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-10 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut solution = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * solution[k]).sum();
        solution[row] = (b[row] - tail) / a[row][row];
    }
    Some(solution)
}
#[cfg(test)]
mod tests {
    use super::*;
    fn frame() -> DataFrame {
        let xs: Vec<Option<f64>> = (1..=10).map(|i| Some(i as f64)).collect();
        let zs: Vec<Option<f64>> = (1..=10).map(|i| Some(((i * 7) % 5) as f64)).collect();
        let ys: Vec<Option<f64>> = xs
            .iter()
            .zip(&zs)
            .map(|(x, z)| Some(3.0 + 2.0 * x.unwrap_or(0.0) - z.unwrap_or(0.0)))
            .collect();
        let city: Vec<Option<&str>> = (0..10)
            .map(|i| Some(["b", "a", "a"][i % 3]))
            .collect();
        DataFrame::from_columns(
            "analysis",
            vec![
                ("y", Column::from_f64(ys)),
                ("x", Column::from_f64(xs)),
                ("z", Column::from_f64(zs)),
                ("city", Column::from_text(city)),
            ],
        )
        .unwrap()
    }
    #[test]
    fn regression_recovers_exact_linear_model() {
        let report = analyze(&frame()).unwrap();
        let regression = report.regression.unwrap();
        assert_eq!(regression.features, vec!["x", "z"]);
        assert_eq!(regression.train_rows, 8);
        assert_eq!(regression.test_rows, 2);
        assert!((regression.intercept - 3.0).abs() < 1e-6);
        assert!((regression.coefficients[0] - 2.0).abs() < 1e-6);
        assert!((regression.coefficients[1] + 1.0).abs() < 1e-6);
        assert!((regression.r_squared.unwrap() - 1.0).abs() < 1e-9);
    }
    #[test]
    fn describe_and_categories() {
        let report = analyze(&frame()).unwrap();
        assert_eq!((report.rows, report.columns), (10, 4));
        let x = report.numeric.iter().find(|s| s.column == "x").unwrap();
        assert_eq!((x.min, x.q50, x.max), (1.0, 5.5, 10.0));
        assert_eq!(x.count, 10);
        let city = &report.categorical[0];
        assert_eq!(city.unique, 2);
        assert_eq!(city.top[0], CategoryCount { value: "a".into(), count: 6 });
    }
    #[test]
    fn correlation_includes_encoded_text() {
        let matrix = correlation(&frame());
        assert_eq!(matrix.columns, vec!["y", "x", "z", "city"]);
        assert!((matrix.values[1][1].unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(matrix.values[0][1], matrix.values[1][0]);
    }
    #[test]
    fn single_numeric_column_has_no_regression() {
        let df = DataFrame::from_columns(
            "one",
            vec![("x", Column::from_i64(vec![Some(1), Some(2), Some(3)]))],
        )
        .unwrap();
        assert!(analyze(&df).unwrap().regression.is_none());
    }
}
