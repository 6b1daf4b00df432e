//! Configuration: optional JSON file, environment and CLI overrides.
//!
//! Engine discovery lives here; the engine process itself only ever gets a
//! resolved path.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::PieceColor;
use crate::error::ConfigError;
use crate::models::EngineSettings;

/// Environment variable overriding `engine.path`
pub const ENGINE_PATH_ENV: &str = "CHESS_ENGINE_PATH";

/// Binary looked up on PATH when no engine path is configured
pub const DEFAULT_ENGINE_BINARY: &str = "stockfish";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine binary; searched on PATH when unset
    pub path: Option<PathBuf>,
    /// Extra command-line arguments for the engine
    pub args: Vec<String>,
    /// Wait for `uciok`/`readyok` before the engine counts as started
    pub wait_for_ready: bool,
    pub handshake_timeout_ms: u64,
    /// Read the engine's stderr into the same line stream as stdout
    pub merge_stderr: bool,
    /// UCI options sent during the handshake, e.g. {"Threads": "4"}
    pub options: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: None,
            args: Vec::new(),
            wait_for_ready: true,
            handshake_timeout_ms: 5000,
            merge_stderr: true,
            options: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AnalysisConfig {
    /// `go depth` for every analysis request
    pub depth: u32,
    /// Color the engine plays; none for analysis only
    pub ai_color: Option<PieceColor>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            depth: 22,
            ai_color: None,
        }
    }
}

impl AppConfig {
    /// Read the config file, or defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text)?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Apply environment overrides, looked up through `var`
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var(ENGINE_PATH_ENV).filter(|p| !p.is_empty()) {
            self.engine.path = Some(PathBuf::from(path));
        }
    }

    /// JSON schema of the config file
    pub fn schema_json() -> Result<String, ConfigError> {
        let schema = schemars::schema_for!(AppConfig);
        Ok(serde_json::to_string_pretty(&schema)?)
    }
}

impl EngineConfig {
    /// Turn the config into launch settings, resolving the engine path
    /// against `search_path` (a PATH-style list) when none is set.
    pub fn to_settings(
        &self,
        search_path: Option<&std::ffi::OsStr>,
    ) -> Result<EngineSettings, ConfigError> {
        let path = match &self.path {
            Some(path) => path.clone(),
            None => find_on_path(DEFAULT_ENGINE_BINARY, search_path)
                .ok_or_else(|| ConfigError::EngineNotFound(DEFAULT_ENGINE_BINARY.to_string()))?,
        };

        let mut settings = EngineSettings::new(path);
        settings.args = self.args.clone();
        settings.wait_for_ready = self.wait_for_ready;
        settings.handshake_timeout = Duration::from_millis(self.handshake_timeout_ms);
        settings.merge_stderr = self.merge_stderr;
        settings.options = self
            .options
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(settings)
    }
}

fn find_on_path(binary: &str, search_path: Option<&std::ffi::OsStr>) -> Option<PathBuf> {
    let search_path = search_path?;
    std::env::split_paths(search_path)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine.path, None);
        assert!(config.engine.wait_for_ready);
        assert_eq!(config.engine.handshake_timeout_ms, 5000);
        assert_eq!(config.analysis.depth, 22);
        assert_eq!(config.analysis.ai_color, None);
    }

    #[test]
    fn test_partial_json() {
        let config = AppConfig::from_json(
            r#"{ "engine": { "path": "/opt/sf", "options": { "Threads": "2" } },
                 "analysis": { "ai_color": "black" } }"#,
        )
        .unwrap();
        assert_eq!(config.engine.path, Some(PathBuf::from("/opt/sf")));
        assert_eq!(config.engine.handshake_timeout_ms, 5000);
        assert_eq!(config.engine.options.get("Threads").map(String::as_str), Some("2"));
        assert_eq!(config.analysis.ai_color, Some(PieceColor::Black));
        assert_eq!(config.analysis.depth, 22);
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            AppConfig::from_json("{ engine: 1 }"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/chess.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_env_override() {
        let mut config = AppConfig::default();
        config.apply_env(|key| {
            (key == ENGINE_PATH_ENV).then(|| "/usr/games/stockfish".to_string())
        });
        assert_eq!(config.engine.path, Some(PathBuf::from("/usr/games/stockfish")));

        config.apply_env(|_| Some(String::new()));
        assert_eq!(config.engine.path, Some(PathBuf::from("/usr/games/stockfish")));
    }

    #[test]
    fn test_settings_from_explicit_path() {
        let mut config = EngineConfig::default();
        config.path = Some(PathBuf::from("/opt/sf"));
        config.handshake_timeout_ms = 250;
        config.options.insert("Hash".to_string(), "64".to_string());

        let settings = config.to_settings(None).unwrap();
        assert_eq!(settings.path, PathBuf::from("/opt/sf"));
        assert_eq!(settings.handshake_timeout, Duration::from_millis(250));
        assert_eq!(settings.options, vec![("Hash".to_string(), "64".to_string())]);
    }

    #[test]
    fn test_engine_not_found() {
        let config = EngineConfig::default();
        let empty = OsString::from("/nonexistent-dir-a:/nonexistent-dir-b");
        assert!(matches!(
            config.to_settings(Some(empty.as_os_str())),
            Err(ConfigError::EngineNotFound(_))
        ));
        assert!(config.to_settings(None).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_found_on_path() {
        // `sh` stands in for the engine binary name
        let search = OsString::from("/nonexistent:/bin");
        assert_eq!(
            find_on_path("sh", Some(search.as_os_str())),
            Some(PathBuf::from("/bin/sh"))
        );
    }

    #[test]
    fn test_schema_mentions_fields() {
        let schema = AppConfig::schema_json().unwrap();
        assert!(schema.contains("handshake_timeout_ms"));
        assert!(schema.contains("ai_color"));
    }
}
