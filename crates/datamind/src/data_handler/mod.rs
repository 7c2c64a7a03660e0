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

pub mod column;
pub mod common;
pub mod dataframe;
pub mod io;
pub use column::{Column, ColumnBuilder, ColumnData};
pub use common::{ColumnMetadata, DataType, DatasetId, DatasetMetadata, LogicalType, Value};
pub use dataframe::DataFrame;
pub use io::{CsvReader, CsvWriter};
pub fn load_csv<P: AsRef<std::path::Path>>(path: P, name: String) -> crate::Result<DataFrame> {
    CsvReader::new().read_file(path.as_ref(), name)
}
pub fn export_csv<P: AsRef<std::path::Path>>(dataframe: &DataFrame, path: P) -> crate::Result<()> {
    CsvWriter::new().write_file(dataframe, path.as_ref())
}
