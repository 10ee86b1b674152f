use super::types::PipelineConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use std::path::PathBuf;

/// Default configuration file name (without extension)
pub const DEFAULT_CONFIG_NAME: &str = "telemetry";

/// Environment variable prefix (`TELEMETRY_SUMMARY__GROUP_BY=quality`)
pub const ENV_PREFIX: &str = "TELEMETRY";

/// Configuration loader with builder pattern
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    config_file: Option<PathBuf>,
    load_env: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from file; `None` falls back to `telemetry.toml` if present
    pub fn load_from_file<P: Into<PathBuf>>(mut self, path: Option<P>) -> Self {
        self.config_file = path.map(Into::into);
        self
    }

    /// Load configuration from environment variables
    pub fn load_from_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> Result<PipelineConfig> {
        let mut builder = Config::builder().add_source(
            Config::try_from(&PipelineConfig::default())
                .context("Failed to serialize default configuration")?,
        );

        // An explicit file must exist; the default location is optional
        if let Some(config_path) = &self.config_file {
            builder = builder.add_source(
                File::from(config_path.as_path())
                    .format(FileFormat::Toml)
                    .required(true),
            );
        } else {
            builder = builder.add_source(
                File::with_name(DEFAULT_CONFIG_NAME)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        if self.load_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: PipelineConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate().context("Invalid configuration")?;

        tracing::debug!(
            file = ?self.config_file,
            detection = config.detection.is_some(),
            group_by = %config.summary.group_by,
            "設定読み込み完了"
        );

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_build_without_sources_yields_defaults() {
        let config = ConfigLoader::new()
            .load_from_file(Some(write_config("").path()))
            .build()
            .unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = write_config(
            r#"
            [ingest]
            validate = false

            [detection]
            sensor_id = "vibration"
            method = "iqr"
            threshold = 1.5

            [summary]
            group_by = "quality"
            time_window = "1h"

            [logging]
            level = "debug"
            format = "json"
            "#,
        );

        let config = ConfigLoader::new()
            .load_from_file(Some(file.path()))
            .build()
            .unwrap();

        assert!(!config.ingest.validate);
        let detection = config.detection.unwrap();
        assert_eq!(detection.sensor_id, "vibration");
        assert_eq!(detection.method, "iqr");
        assert_eq!(detection.threshold, 1.5);
        assert_eq!(config.summary.group_by, "quality");
        assert_eq!(config.summary.time_window.as_deref(), Some("1h"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let result = ConfigLoader::new()
            .load_from_file(Some("/nonexistent/telemetry.toml"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let file = write_config(
            r#"
            [detection]
            sensor_id = "temperature"
            method = "bogus"
            "#,
        );

        let err = ConfigLoader::new()
            .load_from_file(Some(file.path()))
            .build()
            .unwrap_err();
        assert!(format!("{:#}", err).contains("bogus"));
    }

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }
}
