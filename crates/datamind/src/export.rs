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

use crate::data_handler::{CsvWriter, DataFrame};
use crate::error::{DataMindError, Result};
use crate::insights::Summary;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
pub const PREVIEW_ROWS: usize = 40;
const LINES_PER_PAGE: usize = 60;
const LINE_WIDTH: usize = 95;
const CELL_WIDTH: usize = 14;
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Pdf,
}
impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Pdf => "application/pdf",
        }
    }
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Pdf => "pdf",
        }
    }
}
impl FromStr for ExportFormat {
    type Err = DataMindError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(DataMindError::invalid_parameter(
                "format",
                format!("unsupported export format '{other}', expected csv or pdf"),
            )),
        }
    }
}
pub fn export(df: &DataFrame, format: ExportFormat, summary: &Summary) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Csv => CsvWriter::new().to_bytes(df),
        ExportFormat::Pdf => Ok(render_pdf(df, summary)),
    }
}
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
fn cell(text: &str) -> String {
    let truncated: String = text.chars().take(CELL_WIDTH - 1).collect();
    format!("{truncated:<CELL_WIDTH$}")
}
fn section(lines: &mut Vec<String>, title: &str, sentences: &[String]) {
    lines.push(String::new());
    lines.push(title.to_string());
    for sentence in sentences {
        for (i, line) in wrap(sentence, LINE_WIDTH - 2).into_iter().enumerate() {
            let bullet = if i == 0 { "- " } else { "  " };
            lines.push(format!("{bullet}{line}"));
        }
    }
}
/// Text lines of the report, before pagination.
pub fn report_lines(df: &DataFrame, summary: &Summary) -> Vec<String> {
    let mut lines = vec![format!("Data Mind report: {}", df.metadata.name)];
    section(&mut lines, "Summary", &summary.summary);
    section(&mut lines, "Insights", &summary.insights);
    section(&mut lines, "Trends", &summary.trends);
    lines.push(String::new());
    let shown = df.row_count().min(PREVIEW_ROWS);
    lines.push(format!("Data (first {shown} of {} rows)", df.row_count()));
    lines.push(df.column_names().iter().map(|n| cell(n)).collect());
    for row in 0..shown {
        lines.push(
            df.row_values(row)
                .iter()
                .map(|v| cell(&v.to_text().unwrap_or_default()))
                .collect(),
        );
    }
    lines
}
fn escape(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    for c in line.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}
fn page_stream(lines: &[String]) -> String {
    let mut stream = String::from("BT\n/F1 9 Tf\n12 TL\n40 800 Td\n");
    for line in lines {
        stream.push_str(&format!("({}) Tj T*\n", escape(line.trim_end())));
    }
    stream.push_str("ET\n");
    stream
}
/// Minimal PDF 1.4 document with one Courier text page per chunk of lines.
pub fn render_pdf(df: &DataFrame, summary: &Summary) -> Vec<u8> {
    let lines = report_lines(df, summary);
    let pages: Vec<&[String]> = lines.chunks(LINES_PER_PAGE).collect();
    // 1 catalog, 2 page tree, 3 font, then a page and content object per page
    let page_ids: Vec<usize> = (0..pages.len()).map(|i| 4 + 2 * i).collect();
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            page_ids
                .iter()
                .map(|id| format!("{id} 0 R"))
                .collect::<Vec<_>>()
                .join(" "),
            pages.len()
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Courier >>".to_string(),
    ];
    for (page, id) in pages.iter().zip(&page_ids) {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            id + 1
        ));
        let stream = page_stream(page);
        objects.push(format!(
            "<< /Length {} >>\nstream\n{stream}endstream",
            stream.len()
        ));
    }
    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.push_str(&format!("{} 0 obj\n{body}\nendobj\n", i + 1));
    }
    let xref = out.len();
    out.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        out.push_str(&format!("{offset:010} 00000 n \n"));
    }
    out.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
        objects.len() + 1
    ));
    out.into_bytes()
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handler::Column;
    fn frame(rows: usize) -> DataFrame {
        DataFrame::from_columns(
            "report",
            vec![
                ("Region", Column::from_text((0..rows).map(|i| Some(format!("R({i})"))).collect())),
                ("Sales", Column::from_i64((0..rows).map(|i| Some(i as i64)).collect())),
            ],
        )
        .unwrap()
    }
    #[test]
    fn format_parsing() {
        assert_eq!("PDF".parse::<ExportFormat>().unwrap(), ExportFormat::Pdf);
        assert!(matches!(
            "xlsx".parse::<ExportFormat>(),
            Err(DataMindError::InvalidParameter { .. })
        ));
    }
    #[test]
    fn pdf_structure_and_escaping() {
        let summary = Summary {
            summary: vec!["The dataset has 100 rows and 2 columns.".into()],
            ..Summary::default()
        };
        let bytes = render_pdf(&frame(100), &summary);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("%PDF-1.4\n"));
        assert!(text.ends_with("%%EOF\n"));
        assert!(text.contains("/Count 1"));
        assert!(text.contains("(R\\(0\\)"));
        assert!(text.contains("Data (first 40 of 100 rows)"));
        let startxref: usize = text
            .rsplit("startxref\n")
            .next()
            .and_then(|t| t.lines().next())
            .and_then(|n| n.parse().ok())
            .unwrap();
        assert!(text[startxref..].starts_with("xref"));
    }
    #[test]
    fn xref_offsets_point_at_objects() {
        let text = String::from_utf8(render_pdf(&frame(3), &Summary::default())).unwrap();
        let table = text.split("xref\n").nth(1).unwrap();
        let offsets: Vec<usize> = table
            .lines()
            .skip(2)
            .take_while(|line| line.ends_with(" n "))
            .map(|line| line[..10].parse().unwrap())
            .collect();
        assert_eq!(offsets.len(), 5);
        for (i, offset) in offsets.iter().enumerate() {
            assert!(text[*offset..].starts_with(&format!("{} 0 obj\n", i + 1)));
        }
    }
    #[test]
    fn long_reports_paginate() {
        let summary = Summary {
            insights: (0..80).map(|i| format!("insight number {i}")).collect(),
            ..Summary::default()
        };
        let text = String::from_utf8(render_pdf(&frame(40), &summary)).unwrap();
        assert!(text.contains("/Count 3"));
    }
    #[test]
    fn csv_export_uses_writer() {
        let bytes = export(&frame(2), ExportFormat::Csv, &Summary::default()).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "Region,Sales\nR(0),0\nR(1),1\n");
    }
}
