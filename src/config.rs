//! TOML settings for the library and the `nlsql` binary.
//!
//! ```toml
//! log_level = "info"
//!
//! [catalog]
//! dir = "/var/lib/nlsql/catalog"
//! embedding_dimension = 256
//!
//! [enhancement]
//! columns = 8
//!
//! [generator]
//! strict_value_shapes = true
//!
//! [[connections]]
//! name = "warehouse"
//! host = "db.internal"
//! database = "analytics"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::DEFAULT_DIMENSION;
use crate::db::ConnectionConfig;
use crate::dsl::GeneratorOptions;
use crate::enhance::EnhancementLimits;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// Where per-kind catalog files live. Defaults to `<config dir>/nlsql/catalog`.
    pub dir: Option<PathBuf>,
    pub embedding_dimension: usize,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            dir: None,
            embedding_dimension: DEFAULT_DIMENSION,
        }
    }
}

impl CatalogSettings {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| config_root().join("catalog"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    pub catalog: CatalogSettings,
    pub enhancement: EnhancementLimits,
    pub generator: GeneratorOptions,
    pub connections: Vec<ConnectionConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: String::from("info"),
            catalog: CatalogSettings::default(),
            enhancement: EnhancementLimits::default(),
            generator: GeneratorOptions::default(),
            connections: Vec::new(),
        }
    }
}

impl Settings {
    /// Load from `path`, or from the default location when `None`.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let settings = Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(settings)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn default_path() -> PathBuf {
        config_root().join("config.toml")
    }

    pub fn connection(&self, name: &str) -> Result<&ConnectionConfig> {
        self.connections
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::Config(format!("no connection named `{}`", name)))
    }

    fn validate(&self) -> Result<()> {
        if self.catalog.embedding_dimension == 0 {
            return Err(Error::Config(
                "catalog.embedding_dimension must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn config_root() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nlsql")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load(Some(&temp_dir.path().join("absent.toml"))).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.enhancement.columns, 5);
        assert!(!settings.generator.strict_value_shapes);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let settings = Settings::from_toml(
            r#"
            log_level = "debug"

            [catalog]
            dir = "/tmp/nlsql-catalog"

            [enhancement]
            group_by = 1

            [generator]
            strict_value_shapes = true

            [[connections]]
            name = "warehouse"
            host = "db.internal"
            "#,
        )
        .unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.catalog.resolved_dir(), PathBuf::from("/tmp/nlsql-catalog"));
        assert_eq!(settings.catalog.embedding_dimension, DEFAULT_DIMENSION);
        assert_eq!(settings.enhancement.group_by, 1);
        assert_eq!(settings.enhancement.tables, 3);
        assert!(settings.generator.strict_value_shapes);
        assert_eq!(settings.connection("warehouse").unwrap().host, "db.internal");
        assert!(settings.connection("missing").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[catalog]\nembedding_dimension = 64\n").unwrap();
        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.catalog.embedding_dimension, 64);
    }

    #[test]
    fn test_invalid_files_are_config_errors() {
        assert!(matches!(
            Settings::from_toml("log_level = 3"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Settings::from_toml("[catalog]\nembedding_dimension = 0"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_default_path_is_under_nlsql() {
        assert!(Settings::default_path().ends_with("nlsql/config.toml"));
    }
}
