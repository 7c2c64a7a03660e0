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

use crate::config::EngineConfig;
use crate::data_handler::column::ColumnBuilder;
use crate::data_handler::common::{DataMindError, Result};
use crate::data_handler::dataframe::DataFrame;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use tracing::debug;
#[derive(Debug, Clone)]
pub struct CsvReader {
    delimiter: u8,
    max_rows: usize,
    max_columns: usize,
    max_bytes: usize,
    datetime_formats: Vec<String>,
    inference_sample: usize,
}
impl CsvReader {
    pub fn new() -> Self {
        Self::from_config(&EngineConfig::default())
    }
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            delimiter: config.parsing.delimiter_byte(),
            max_rows: config.limits.max_rows,
            max_columns: config.limits.max_columns,
            max_bytes: config.limits.max_upload_bytes,
            datetime_formats: config.parsing.datetime_formats.clone(),
            inference_sample: config.parsing.type_inference_sample,
        }
    }
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
    pub fn with_limits(mut self, max_rows: usize, max_columns: usize) -> Self {
        self.max_rows = max_rows;
        self.max_columns = max_columns;
        self
    }
    pub fn read_file(&self, path: &Path, dataset_name: String) -> Result<DataFrame> {
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        self.read_bytes(&bytes, dataset_name)
    }
    pub fn read_bytes(&self, bytes: &[u8], dataset_name: String) -> Result<DataFrame> {
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(DataMindError::Parse("input is empty".to_string()));
        }
        if bytes.len() > self.max_bytes {
            return Err(DataMindError::Parse(format!(
                "input of {} bytes exceeds limit {}",
                bytes.len(),
                self.max_bytes
            )));
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .flexible(true)
            .from_reader(bytes);
        let headers = self.parse_headers(reader.headers()?)?;
        let mut builders: Vec<ColumnBuilder> = headers
            .iter()
            .map(|_| {
                ColumnBuilder::new()
                    .with_datetime_formats(&self.datetime_formats)
                    .with_inference_sample(self.inference_sample)
            })
            .collect();
        let mut row_count = 0usize;
        for record in reader.records() {
            let record = record?;
            row_count += 1;
            if row_count > self.max_rows {
                return Err(DataMindError::Parse(format!(
                    "row count exceeds limit {}",
                    self.max_rows
                )));
            }
            if record.len() > headers.len() {
                return Err(DataMindError::Parse(format!(
                    "row {row_count} has {} fields, expected {}",
                    record.len(),
                    headers.len()
                )));
            }
            for (i, builder) in builders.iter_mut().enumerate() {
                builder.push(record.get(i));
            }
        }
        let columns = headers
            .into_iter()
            .zip(builders)
            .map(|(name, builder)| (name, builder.build()));
        let df = DataFrame::from_columns(dataset_name, columns)?;
        debug!(
            rows = df.row_count(),
            columns = df.column_count(),
            "Parsed CSV dataset"
        );
        Ok(df)
    }
    fn parse_headers(&self, record: &csv::StringRecord) -> Result<Vec<String>> {
        if record.is_empty() || record.iter().all(|h| h.trim().is_empty()) {
            return Err(DataMindError::Parse("missing header row".to_string()));
        }
        if record.len() > self.max_columns {
            return Err(DataMindError::Parse(format!(
                "column count {} exceeds limit {}",
                record.len(),
                self.max_columns
            )));
        }
        let mut seen = HashSet::new();
        let mut headers = Vec::with_capacity(record.len());
        for (i, raw) in record.iter().enumerate() {
            let name = match raw.trim() {
                "" => format!("Unnamed: {i}"),
                trimmed => trimmed.to_string(),
            };
            if !seen.insert(name.clone()) {
                return Err(DataMindError::Parse(format!(
                    "duplicate column name '{name}'"
                )));
            }
            headers.push(name);
        }
        Ok(headers)
    }
}
impl Default for CsvReader {
    fn default() -> Self {
        Self::new()
    }
}
#[derive(Debug, Clone)]
pub struct CsvWriter {
    delimiter: u8,
}
impl CsvWriter {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
    pub fn write_to<W: Write>(&self, dataframe: &DataFrame, sink: W) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(sink);
        writer.write_record(dataframe.column_names())?;
        for row in 0..dataframe.row_count() {
            let cells = dataframe
                .row_values(row)
                .into_iter()
                .map(|v| v.to_text().unwrap_or_default());
            writer.write_record(cells)?;
        }
        writer.flush()?;
        Ok(())
    }
    pub fn to_bytes(&self, dataframe: &DataFrame) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write_to(dataframe, &mut buffer)?;
        Ok(buffer)
    }
    pub fn write_file(&self, dataframe: &DataFrame, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        self.write_to(dataframe, BufWriter::new(file))
    }
}
impl Default for CsvWriter {
    fn default() -> Self {
        Self::new()
    }
}
