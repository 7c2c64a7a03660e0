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

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;
pub const DEFAULT_CONFIG_FILE: &str = "datamind.toml";
pub const ENV_PREFIX: &str = "DATAMIND";
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: LimitsConfig,
    pub parsing: ParsingConfig,
    pub server: ServerConfig,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_rows: usize,
    pub max_columns: usize,
    pub max_upload_bytes: usize,
    /// Oldest undo records are discarded once a session exceeds this depth.
    pub max_history: usize,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParsingConfig {
    pub delimiter: char,
    pub datetime_formats: Vec<String>,
    pub type_inference_sample: usize,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub http_addr: String,
    pub log_level: String,
    pub log_format: LogFormat,
    pub request_timeout_secs: u64,
}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}
impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_rows: 1_000_000,
            max_columns: 10_000,
            max_upload_bytes: 64 * 1024 * 1024,
            max_history: 100,
        }
    }
}
impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            datetime_formats: [
                "%Y-%m-%d",
                "%Y-%m-%d %H:%M:%S",
                "%Y-%m-%dT%H:%M:%S",
                "%m/%d/%Y",
                "%d/%m/%Y",
                "%Y/%m/%d",
                "%Y%m%d",
            ]
            .iter()
            .map(|f| f.to_string())
            .collect(),
            type_inference_sample: 1000,
        }
    }
}
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:8080".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            request_timeout_secs: 30,
        }
    }
}
impl ParsingConfig {
    pub fn delimiter_byte(&self) -> u8 {
        if self.delimiter.is_ascii() {
            self.delimiter as u8
        } else {
            b','
        }
    }
}
impl EngineConfig {
    /// Defaults, then the optional TOML file, then `DATAMIND__SECTION__KEY` variables.
    pub fn load(path: impl AsRef<Path>) -> std::result::Result<Self, config::ConfigError> {
        let path = path.as_ref().to_string_lossy().to_string();
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&EngineConfig::default())?)
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        settings.try_deserialize()
    }
    pub fn load_or_default() -> Self {
        match Self::load(DEFAULT_CONFIG_FILE) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Failed to load configuration, using defaults");
                Self::default()
            }
        }
    }
    pub fn from_toml_str(input: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(input)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [limits]
            max_history = 5
            [server]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.limits.max_history, 5);
        assert_eq!(config.limits.max_rows, 1_000_000);
        assert_eq!(config.server.log_format, LogFormat::Json);
        assert_eq!(config.parsing.delimiter, ',');
    }
    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.http_addr, "127.0.0.1:8080");
        assert_eq!(config.parsing.type_inference_sample, 1000);
    }
    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datamind.toml");
        std::fs::write(&path, "[parsing]\ndelimiter = \";\"\n").unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.parsing.delimiter_byte(), b';');
    }
}
