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

use crate::data_handler::{Column, ColumnData, DataFrame, DataType};
use crate::error::{DataMindError, Result};
use crate::stats;
use chrono::{Datelike, Month, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PeriodTotal {
    pub period: String,
    pub total: f64,
}
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrendReport {
    pub sentences: Vec<String>,
    pub yearly: Vec<PeriodTotal>,
    pub monthly: Vec<PeriodTotal>,
}
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct Summary {
    pub insights: Vec<String>,
    pub trends: Vec<String>,
    pub summary: Vec<String>,
}
fn month_name(month: u32) -> String {
    u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map(|m| m.name().to_string())
        .unwrap_or_else(|| format!("month {month}"))
}
fn change_sentence(subject: &str, from_label: &str, to_label: &str, from: f64, to: f64) -> String {
    if from == 0.0 {
        return format!("{subject} changed from 0 to {to:.2} between {from_label} and {to_label}.");
    }
    let pct = (to - from) / from.abs() * 100.0;
    if pct == 0.0 {
        format!("{subject} remained unchanged from {from_label} to {to_label}.")
    } else {
        let direction = if pct > 0.0 { "increased" } else { "decreased" };
        format!(
            "{subject} {direction} by {:.2}% from {from_label} to {to_label}.",
            pct.abs()
        )
    }
}
/// Dates of `column`, parsing text cells when the column is not already typed as datetimes.
fn date_values(df: &DataFrame, column: &str, formats: &[String]) -> Result<Vec<Option<NaiveDateTime>>> {
    let col = df.column(column)?;
    let dates = match &**col {
        Column::DateTime(data) => data.to_vec(),
        other => match other.cast(DataType::DateTime, formats) {
            Column::DateTime(data) => data.to_vec(),
            _ => Vec::new(),
        },
    };
    if dates.iter().all(Option::is_none) {
        return Err(DataMindError::InvalidDateColumn {
            column: column.to_string(),
        });
    }
    Ok(dates)
}
/// Year-over-year change, and month-over-month change within the latest year.
pub fn detect_trends(
    df: &DataFrame,
    time_column: &str,
    value_column: &str,
    formats: &[String],
) -> Result<TrendReport> {
    let dates = date_values(df, time_column, formats)?;
    let values = df.column(value_column)?;
    if !values.data_type().is_numeric() {
        return Err(DataMindError::NonNumericColumn {
            column: value_column.to_string(),
            found: values.data_type().to_string(),
        });
    }
    let amounts: Vec<f64> = values
        .f64_values()
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect();
    let mut yearly: BTreeMap<i32, f64> = BTreeMap::new();
    for (date, amount) in dates.iter().zip(&amounts) {
        if let Some(date) = date {
            *yearly.entry(date.year()).or_default() += amount;
        }
    }
    let latest = yearly.keys().next_back().copied();
    let mut monthly: BTreeMap<u32, f64> = BTreeMap::new();
    for (date, amount) in dates.iter().zip(&amounts) {
        if let Some(date) = date.filter(|d| Some(d.year()) == latest) {
            *monthly.entry(date.month()).or_default() += amount;
        }
    }
    let mut sentences = Vec::new();
    let subject = format!("Total {value_column}");
    let years: Vec<(&i32, &f64)> = yearly.iter().collect();
    for pair in years.windows(2) {
        let ((y0, v0), (y1, v1)) = (pair[0], pair[1]);
        sentences.push(change_sentence(&subject, &y0.to_string(), &y1.to_string(), *v0, *v1));
    }
    let months: Vec<(&u32, &f64)> = monthly.iter().collect();
    for pair in months.windows(2) {
        let ((m0, v0), (m1, v1)) = (pair[0], pair[1]);
        let year = latest.unwrap_or_default();
        sentences.push(format!(
            "In {year}, {}",
            change_sentence(
                &value_column.to_lowercase(),
                &month_name(*m0),
                &month_name(*m1),
                *v0,
                *v1
            )
        ));
    }
    if sentences.is_empty() {
        sentences.push(format!(
            "Not enough periods in '{time_column}' to detect a trend in '{value_column}'."
        ));
    }
    Ok(TrendReport {
        sentences,
        yearly: yearly
            .into_iter()
            .map(|(year, total)| PeriodTotal {
                period: year.to_string(),
                total,
            })
            .collect(),
        monthly: monthly
            .into_iter()
            .map(|(month, total)| PeriodTotal {
                period: format!("{}-{month:02}", latest.unwrap_or_default()),
                total,
            })
            .collect(),
    })
}
fn first_of(df: &DataFrame, data_type: DataType) -> Option<String> {
    df.columns_in_order()
        .find(|(_, c)| c.data_type() == data_type)
        .map(|(name, _)| name.clone())
}
fn first_numeric(df: &DataFrame) -> Option<String> {
    df.columns_in_order()
        .find(|(_, c)| c.data_type().is_numeric())
        .map(|(name, _)| name.clone())
}
fn category_insight(df: &DataFrame) -> Result<Vec<String>> {
    let (Some(numeric), Some(categorical)) = (first_numeric(df), first_of(df, DataType::String)) else {
        return Ok(vec![
            "No numeric and categorical column pair is available for category insights.".to_string(),
        ]);
    };
    let values = df.column(&numeric)?;
    let categories = df.column(&categorical)?;
    let mut totals: HashMap<String, f64> = HashMap::new();
    for row in 0..df.row_count() {
        if let (Some(category), Some(value)) = (categories.get_string(row), values.to_f64(row)) {
            *totals.entry(category).or_default() += value;
        }
    }
    let top = totals
        .into_iter()
        .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(&a.0)));
    Ok(match top {
        Some((category, total)) => vec![format!(
            "'{category}' has the highest total {numeric} ({total:.2}) among {categorical} values."
        )],
        None => vec![format!("No complete '{categorical}'/'{numeric}' pairs were found.")],
    })
}
fn outlier_insight(df: &DataFrame) -> Result<Vec<String>> {
    let mut total = 0usize;
    let mut outliers = 0usize;
    for (name, column) in df.columns_in_order() {
        if !column.data_type().is_numeric() || column.null_count() == column.len() {
            continue;
        }
        let values = stats::numeric_values(df, name)?;
        let sorted = stats::sorted(&values);
        let (Some(q1), Some(q3)) = (
            stats::quantile_sorted(&sorted, 0.25),
            stats::quantile_sorted(&sorted, 0.75),
        ) else {
            continue;
        };
        let iqr = q3 - q1;
        let (low, high) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
        total += values.len();
        outliers += values.iter().filter(|&&v| v < low || v > high).count();
    }
    if total == 0 {
        return Ok(vec!["No numeric values are available for outlier analysis.".to_string()]);
    }
    let share = outliers as f64 / total as f64 * 100.0;
    Ok(vec![format!(
        "{share:.2}% of numeric values ({outliers} of {total}) are outliers by the IQR rule."
    )])
}
fn missing_insight(df: &DataFrame) -> Result<Vec<String>> {
    let total = df.total_missing();
    if total == 0 {
        return Ok(vec!["No missing values were found.".to_string()]);
    }
    let mut sentences = vec![format!("The dataset has {total} missing values.")];
    let rows = df.row_count().max(1) as f64;
    for (name, column) in df.columns_in_order() {
        let missing = column.null_count();
        if missing > 0 {
            let pct = missing as f64 / rows * 100.0;
            sentences.push(format!("'{name}' is {pct:.2}% missing."));
        }
    }
    Ok(sentences)
}
/// Plain-language observations. A metric that cannot be computed yields a warning sentence.
pub fn generate_insights(df: &DataFrame) -> Vec<String> {
    let metrics: [(&str, fn(&DataFrame) -> Result<Vec<String>>); 3] = [
        ("category", category_insight),
        ("outlier", outlier_insight),
        ("missing value", missing_insight),
    ];
    let mut sentences = Vec::new();
    for (label, metric) in metrics {
        match metric(df) {
            Ok(found) => sentences.extend(found),
            Err(e) => {
                warn!(metric = label, error = %e, "Insight metric failed");
                sentences.push(format!("Could not compute {label} insights: {e}"));
            }
        }
    }
    sentences
}
pub fn duplicate_rows(df: &DataFrame) -> usize {
    let columns = df.column_names().to_vec();
    let mut seen = HashSet::new();
    (0..df.row_count())
        .filter(|&row| !seen.insert(df.row_key(row, &columns)))
        .count()
}
pub fn summarize_findings(df: &DataFrame) -> Vec<String> {
    let mut sentences = vec![
        format!(
            "The dataset has {} rows and {} columns.",
            df.row_count(),
            df.column_count()
        ),
        format!("There are {} duplicate rows.", duplicate_rows(df)),
    ];
    for (name, column) in df.columns_in_order() {
        if !column.data_type().is_numeric() {
            continue;
        }
        match (stats::mean(df, name), stats::median(df, name)) {
            (Ok(mean), Ok(median)) => sentences.push(format!(
                "'{name}' has a mean of {mean:.2} and a median of {median:.2}."
            )),
            _ => sentences.push(format!("'{name}' has no values.")),
        }
    }
    sentences.push(format!(
        "There are {} missing values in total.",
        df.total_missing()
    ));
    sentences
}
/// First datetime column, or else the first text column whose values all parse as dates.
pub fn find_date_column(df: &DataFrame, formats: &[String]) -> Option<String> {
    first_of(df, DataType::DateTime).or_else(|| {
        df.columns_in_order()
            .find(|(_, c)| {
                c.data_type() == DataType::String
                    && c.null_count() < c.len()
                    && c.cast(DataType::DateTime, formats).null_count() == c.null_count()
            })
            .map(|(name, _)| name.clone())
    })
}
pub fn summarize(df: &DataFrame, formats: &[String]) -> Summary {
    let trends = match (find_date_column(df, formats), first_numeric(df)) {
        (Some(time), Some(value)) => match detect_trends(df, &time, &value, formats) {
            Ok(report) => report.sentences,
            Err(e) => vec![format!("Trends could not be computed: {e}")],
        },
        _ => vec!["Trend detection needs a date column and a numeric column.".to_string()],
    };
    Summary {
        insights: generate_insights(df),
        trends,
        summary: summarize_findings(df),
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParsingConfig;
    use crate::data_handler::CsvReader;
    fn formats() -> Vec<String> {
        ParsingConfig::default().datetime_formats
    }
    fn sales() -> DataFrame {
        let csv = "Date,Region,Sales\n\
                   2022-01-10,E,100\n\
                   2022-06-01,W,100\n\
                   2023-01-05,E,150\n\
                   2023-02-07,W,\n\
                   2023-02-20,E,300\n\
                   2023-02-20,E,300\n";
        CsvReader::new().read_bytes(csv.as_bytes(), "sales".into()).unwrap()
    }
    #[test]
    fn yearly_and_monthly_changes() {
        let report = detect_trends(&sales(), "Date", "Sales", &formats()).unwrap();
        assert_eq!(report.yearly[0], PeriodTotal { period: "2022".into(), total: 200.0 });
        assert_eq!(report.yearly[1].total, 750.0);
        assert_eq!(report.monthly.len(), 2);
        assert_eq!(report.sentences[0], "Total Sales increased by 275.00% from 2022 to 2023.");
        assert_eq!(
            report.sentences[1],
            "In 2023, sales increased by 300.00% from January to February."
        );
    }
    #[test]
    fn unparseable_dates_fail() {
        let df = sales();
        assert!(matches!(
            detect_trends(&df, "Region", "Sales", &formats()),
            Err(DataMindError::InvalidDateColumn { .. })
        ));
        assert!(matches!(
            detect_trends(&df, "Date", "Region", &formats()),
            Err(DataMindError::NonNumericColumn { .. })
        ));
    }
    #[test]
    fn insights_and_summary_sentences() {
        let df = sales();
        let insights = generate_insights(&df);
        assert!(insights[0].starts_with("'E' has the highest total Sales"));
        assert!(insights.iter().any(|s| s == "'Sales' is 16.67% missing."));
        let summary = summarize_findings(&df);
        assert_eq!(summary[0], "The dataset has 6 rows and 3 columns.");
        assert_eq!(summary[1], "There are 1 duplicate rows.");
        assert_eq!(summary.last().unwrap(), "There are 1 missing values in total.");
    }
    #[test]
    fn summary_without_dates_explains_missing_trends() {
        let df = DataFrame::from_columns(
            "plain",
            vec![("x", Column::from_i64(vec![Some(1), Some(2)]))],
        )
        .unwrap();
        let summary = summarize(&df, &formats());
        assert_eq!(summary.trends.len(), 1);
        assert!(summary.trends[0].contains("date column"));
        assert!(summary.insights.iter().any(|s| s.contains("No numeric and categorical")));
    }
}
