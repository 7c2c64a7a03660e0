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

use crate::data_handler::column::{Column, ColumnData};
use crate::data_handler::common::{
    ColumnMetadata, DataMindError, DataType, DatasetMetadata, Result, Value,
};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
#[derive(Debug, Clone)]
pub struct DataFrame {
    pub columns: HashMap<String, Arc<Column>>,
    pub metadata: DatasetMetadata,
    column_order: Vec<String>,
}
impl PartialEq for DataFrame {
    /// Cell-by-cell comparison of names, order, types and values; metadata is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.column_order == other.column_order
            && self.row_count() == other.row_count()
            && self
                .column_order
                .iter()
                .all(|name| self.columns.get(name) == other.columns.get(name))
    }
}
impl DataFrame {
    pub fn new(metadata: DatasetMetadata) -> Self {
        Self {
            columns: HashMap::new(),
            metadata,
            column_order: Vec::new(),
        }
    }
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(DatasetMetadata::new(name))
    }
    pub fn from_columns<N: Into<String>>(
        name: impl Into<String>,
        columns: impl IntoIterator<Item = (N, Column)>,
    ) -> Result<Self> {
        let mut df = Self::named(name);
        for (column_name, column) in columns {
            let column_name = column_name.into();
            if df.has_column(&column_name) {
                return Err(DataMindError::Parse(format!(
                    "duplicate column name '{column_name}'"
                )));
            }
            df.add_column(column_name, column)?;
        }
        Ok(df)
    }
    /// An empty frame with the same metadata identity, used to rebuild after row changes.
    fn empty_like(&self, row_count: usize) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.row_count = row_count;
        metadata.column_count = 0;
        Self::new(metadata)
    }
    fn check_length(&self, column: &Column) -> Result<()> {
        if !self.columns.is_empty() && column.len() != self.row_count() {
            return Err(DataMindError::OperationFailed {
                operation: "add_column".to_string(),
                reason: format!(
                    "Column length mismatch: expected {}, got {}",
                    self.row_count(),
                    column.len()
                ),
            });
        }
        Ok(())
    }
    /// Appends a new column, or replaces an existing one in place.
    pub fn add_column(&mut self, name: String, column: Column) -> Result<()> {
        self.check_length(&column)?;
        if !self.columns.contains_key(&name) {
            self.column_order.push(name.clone());
        }
        self.metadata.row_count = column.len();
        self.columns.insert(name, Arc::new(column));
        self.metadata.column_count = self.column_order.len();
        Ok(())
    }
    pub fn insert_column(&mut self, position: usize, name: String, column: Column) -> Result<()> {
        if self.columns.contains_key(&name) {
            return Err(DataMindError::invalid_parameter(
                "column",
                format!("column '{name}' already exists"),
            ));
        }
        self.check_length(&column)?;
        let position = position.min(self.column_order.len());
        self.column_order.insert(position, name.clone());
        self.metadata.row_count = column.len();
        self.columns.insert(name, Arc::new(column));
        self.metadata.column_count = self.column_order.len();
        Ok(())
    }
    /// Removes a column, returning its former position and data.
    pub fn drop_column(&mut self, name: &str) -> Result<(usize, Arc<Column>)> {
        let position = self
            .column_position(name)
            .ok_or_else(|| DataMindError::column_not_found(name))?;
        self.column_order.remove(position);
        let column = self
            .columns
            .remove(name)
            .ok_or_else(|| DataMindError::column_not_found(name))?;
        self.metadata.column_count = self.column_order.len();
        Ok((position, column))
    }
    pub fn get_column(&self, name: &str) -> Option<&Arc<Column>> {
        self.columns.get(name)
    }
    pub fn column(&self, name: &str) -> Result<&Arc<Column>> {
        self.columns
            .get(name)
            .ok_or_else(|| DataMindError::column_not_found(name))
    }
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.column_order.iter().position(|c| c == name)
    }
    pub fn column_names(&self) -> &[String] {
        &self.column_order
    }
    pub fn columns_in_order(&self) -> impl Iterator<Item = (&String, &Arc<Column>)> {
        self.column_order
            .iter()
            .filter_map(move |name| self.columns.get(name).map(|c| (name, c)))
    }
    pub fn row_count(&self) -> usize {
        self.metadata.row_count
    }
    pub fn column_count(&self) -> usize {
        self.column_order.len()
    }
    pub fn value(&self, column: &str, row: usize) -> Value {
        self.columns
            .get(column)
            .map(|c| c.get(row))
            .unwrap_or(Value::Null)
    }
    pub fn row_values(&self, row: usize) -> Vec<Value> {
        self.columns_in_order().map(|(_, c)| c.get(row)).collect()
    }
    /// String key of a row across `columns`, suitable for hashing.
    pub fn row_key(&self, row: usize, columns: &[String]) -> Vec<Option<String>> {
        columns
            .iter()
            .map(|name| self.columns.get(name).and_then(|c| c.get_string(row)))
            .collect()
    }
    pub fn select_rows(&self, indices: &[usize]) -> Result<DataFrame> {
        let mut new_df = self.empty_like(indices.len());
        for (name, column) in self.columns_in_order() {
            new_df.add_column(name.clone(), column.select_rows(indices)?)?;
        }
        Ok(new_df)
    }
    pub fn filter<P>(&self, predicate: P) -> Result<DataFrame>
    where
        P: Fn(usize) -> bool + Send + Sync,
    {
        let indices: Vec<usize> = (0..self.row_count())
            .into_par_iter()
            .filter(|&i| predicate(i))
            .collect();
        self.select_rows(&indices)
    }
    /// Splits the frame into (kept, removed) by row position.
    pub fn remove_rows(&self, positions: &[usize]) -> Result<(DataFrame, DataFrame)> {
        let mut removed: Vec<usize> = positions
            .iter()
            .copied()
            .filter(|&p| p < self.row_count())
            .collect();
        removed.sort_unstable();
        removed.dedup();
        let mut flags = vec![false; self.row_count()];
        for &p in &removed {
            flags[p] = true;
        }
        let kept: Vec<usize> = (0..self.row_count()).filter(|&i| !flags[i]).collect();
        Ok((self.select_rows(&kept)?, self.select_rows(&removed)?))
    }
    /// Inverse of `remove_rows`: `positions` are the ascending row indices `rows` held
    /// before removal.
    pub fn insert_rows(&self, positions: &[usize], rows: &DataFrame) -> Result<DataFrame> {
        if positions.len() != rows.row_count() {
            return Err(DataMindError::OperationFailed {
                operation: "insert_rows".to_string(),
                reason: format!(
                    "{} positions supplied for {} rows",
                    positions.len(),
                    rows.row_count()
                ),
            });
        }
        let total = self.row_count() + rows.row_count();
        let mut new_df = self.empty_like(total);
        for (name, column) in self.columns_in_order() {
            let restored = rows.get_column(name);
            let mut cells = Vec::with_capacity(total);
            let (mut kept, mut inserted) = (0, 0);
            for row in 0..total {
                if positions.get(inserted) == Some(&row) {
                    cells.push(restored.map(|c| c.get(inserted)).unwrap_or(Value::Null));
                    inserted += 1;
                } else {
                    cells.push(column.get(kept));
                    kept += 1;
                }
            }
            let data_type = match restored {
                Some(r) if r.data_type() != column.data_type() => DataType::String,
                _ => column.data_type(),
            };
            new_df.add_column(name.clone(), Column::from_values(&cells, data_type)?)?;
        }
        Ok(new_df)
    }
    pub fn schema(&self) -> Vec<ColumnMetadata> {
        self.columns_in_order()
            .map(|(name, column)| ColumnMetadata {
                name: name.clone(),
                data_type: column.data_type(),
                logical_type: column.data_type().logical(),
                null_count: column.null_count(),
            })
            .collect()
    }
    pub fn total_missing(&self) -> usize {
        self.columns.values().map(|c| c.null_count()).sum()
    }
    pub fn to_records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        (0..self.row_count())
            .map(|row| {
                self.columns_in_order()
                    .map(|(name, column)| {
                        let cell = serde_json::to_value(column.get(row))
                            .unwrap_or(serde_json::Value::Null);
                        (name.clone(), cell)
                    })
                    .collect()
            })
            .collect()
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    fn sample() -> DataFrame {
        DataFrame::from_columns(
            "sample",
            vec![
                ("id", Column::from_i64(vec![Some(1), Some(2), Some(3), Some(4)])),
                ("region", Column::from_text(vec![Some("E"), None, Some("W"), Some("E")])),
            ],
        )
        .unwrap()
    }
    #[test]
    fn add_column_checks_length() {
        let mut df = sample();
        let err = df
            .add_column("short".into(), Column::from_i64(vec![Some(1)]))
            .unwrap_err();
        assert_eq!(err.code(), "OPERATION_FAILED");
        assert_eq!(df.column_count(), 2);
    }
    #[test]
    fn drop_then_insert_restores_position() {
        let mut df = sample();
        let original = df.clone();
        let (position, column) = df.drop_column("id").unwrap();
        assert_eq!(df.column_names(), ["region".to_string()]);
        df.insert_column(position, "id".into(), Column::clone(&column))
            .unwrap();
        assert_eq!(df, original);
    }
    #[test]
    fn remove_then_insert_rows_round_trips() {
        let df = sample();
        let (kept, removed) = df.remove_rows(&[3, 1, 3]).unwrap();
        assert_eq!(kept.row_count(), 2);
        assert_eq!(removed.row_count(), 2);
        let restored = kept.insert_rows(&[1, 3], &removed).unwrap();
        assert_eq!(restored, df);
    }
    #[test]
    fn filter_keeps_matching_rows() {
        let df = sample();
        let region = df.column("region").unwrap().clone();
        let filtered = df
            .filter(|i| region.str_at(i) == Some("E"))
            .unwrap();
        assert_eq!(filtered.row_count(), 2);
        assert_eq!(filtered.value("id", 1), Value::Int64(4));
    }
    #[test]
    fn records_serialize_missing_as_null() {
        let records = sample().to_records();
        assert_eq!(records[1]["region"], serde_json::Value::Null);
        assert_eq!(records[0]["id"], serde_json::json!(1));
    }
}
