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
use crate::config::ParsingConfig;
use crate::error::Result;
use crate::operations::OperationKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;
/// The minimal state needed to reverse one applied operation.
#[derive(Debug, Clone)]
pub enum UndoRecord {
    /// Cells that were missing before a fill, and the column type they lived in.
    RestoreMissing {
        column: String,
        positions: Vec<usize>,
        original_type: DataType,
    },
    /// Puts a column back at its position, replacing any column of the same name.
    RestoreColumn {
        name: String,
        position: usize,
        column: Arc<Column>,
    },
    DropColumns { names: Vec<String> },
    /// Rows removed from ascending `positions`, with every column they had.
    RestoreRows {
        positions: Vec<usize>,
        rows: DataFrame,
    },
    Snapshot(DataFrame),
    /// Steps recorded in application order; undone last to first.
    Sequence(Vec<UndoRecord>),
}
impl UndoRecord {
    pub fn undo(&self, df: &DataFrame) -> Result<DataFrame> {
        match self {
            UndoRecord::RestoreMissing {
                column,
                positions,
                original_type,
            } => {
                let mut restored = df.clone();
                let current = df.column(column)?;
                let nulled = current.set_positions(positions, &Value::Null)?;
                let retyped = if nulled.data_type() == *original_type {
                    nulled
                } else {
                    nulled.cast(*original_type, &ParsingConfig::default().datetime_formats)
                };
                restored.add_column(column.clone(), retyped)?;
                Ok(restored)
            }
            UndoRecord::RestoreColumn {
                name,
                position,
                column,
            } => {
                let mut restored = df.clone();
                if restored.has_column(name) {
                    restored.add_column(name.clone(), Column::clone(column))?;
                } else {
                    restored.insert_column(*position, name.clone(), Column::clone(column))?;
                }
                Ok(restored)
            }
            UndoRecord::DropColumns { names } => {
                let mut restored = df.clone();
                for name in names {
                    if restored.has_column(name) {
                        restored.drop_column(name)?;
                    }
                }
                Ok(restored)
            }
            UndoRecord::RestoreRows { positions, rows } => df.insert_rows(positions, rows),
            UndoRecord::Snapshot(previous) => Ok(previous.clone()),
            UndoRecord::Sequence(steps) => steps
                .iter()
                .rev()
                .try_fold(df.clone(), |current, step| step.undo(&current)),
        }
    }
    pub fn sequence(mut steps: Vec<UndoRecord>) -> UndoRecord {
        match steps.len() {
            1 => steps.remove(0),
            _ => UndoRecord::Sequence(steps),
        }
    }
}
/// Records for `names` as they stood in `before`: existing columns are restored, new ones dropped.
pub fn undo_for_columns(before: &DataFrame, names: &[String]) -> UndoRecord {
    let mut steps = Vec::new();
    let mut added = Vec::new();
    for name in names {
        match (before.column_position(name), before.get_column(name)) {
            (Some(position), Some(column)) => steps.push(UndoRecord::RestoreColumn {
                name: name.clone(),
                position,
                column: column.clone(),
            }),
            _ => added.push(name.clone()),
        }
    }
    if !added.is_empty() {
        steps.push(UndoRecord::DropColumns { names: added });
    }
    UndoRecord::sequence(steps)
}
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub kind: OperationKind,
    pub applied_at: DateTime<Utc>,
    pub version: u64,
    pub undo: UndoRecord,
}
impl HistoryRecord {
    pub fn new(kind: OperationKind, version: u64, undo: UndoRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            applied_at: Utc::now(),
            version,
            undo,
        }
    }
    pub fn entry(&self) -> HistoryEntry {
        HistoryEntry {
            id: self.id,
            kind: self.kind,
            applied_at: self.applied_at,
            version: self.version,
        }
    }
}
/// Caller-facing view of a history record.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub kind: OperationKind,
    pub applied_at: DateTime<Utc>,
    pub version: u64,
}
