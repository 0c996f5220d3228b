use crate::app::models::{AppConfig, ConfigLayer, Verbosity};
use serde_yaml::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const APP_NAME: &str = "cli_scaffold";

pub const DEFAULT_LOG_FILE_FORMAT: &str = "%(asctime)s %(levelname)s %(name)s %(message)s";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("'{}' is not a YAML dictionary", .path.display())]
    NotAMapping { path: PathBuf },
}

/// Built-in defaults, with files placed in the platform's per-user directories.
pub fn default_config() -> AppConfig {
    let config_file = dirs::config_dir()
        .map(|dir| dir.join(APP_NAME).join(format!("{APP_NAME}.config")));
    let log_file = dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|dir| dir.join(APP_NAME).join("log").join(format!("{APP_NAME}.log")));

    AppConfig {
        config_file,
        verbosity: Verbosity::Error,
        log_file,
        log_file_format: DEFAULT_LOG_FILE_FORMAT.to_string(),
        log_level: Some(Verbosity::Info),
        log_max_bytes: 100 * 1024,
        log_max_files: 10,
        log_when_to_rotate: None,
        dryrun: false,
        paths: Vec::new(),
        extra: Default::default(),
    }
}

/// Reads a YAML file whose top level must be a mapping.
pub fn read_yaml_layer(path: &Path) -> Result<ConfigLayer, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let not_a_mapping = || ConfigError::NotAMapping {
        path: path.to_path_buf(),
    };
    let parse_error = |source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    };

    if content.trim().is_empty() {
        return Err(not_a_mapping());
    }
    let document: Value = serde_yaml::from_str(&content).map_err(parse_error)?;
    if !document.is_mapping() {
        return Err(not_a_mapping());
    }
    serde_yaml::from_value(document).map_err(parse_error)
}

/// Builds the effective configuration: defaults, then the config file, then `overrides`.
///
/// An explicit `config_file` in `overrides` must be readable. The default one is only
/// read if it exists.
pub fn merge(defaults: &AppConfig, overrides: ConfigLayer) -> Result<AppConfig, ConfigError> {
    let file_layer = match (&overrides.config_file, &defaults.config_file) {
        (Some(Some(path)), _) => read_yaml_layer(path)?,
        (Some(None), _) => ConfigLayer::default(),
        (None, Some(path)) if path.exists() => read_yaml_layer(path)?,
        _ => ConfigLayer::default(),
    };

    Ok(defaults.clone().apply(file_layer).apply(overrides))
}

impl AppConfig {
    /// Overrides every field that `layer` sets.
    pub fn apply(mut self, layer: ConfigLayer) -> Self {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if let Some(value) = layer.$field {
                    self.$field = value;
                })*
            };
        }
        take!(
            config_file,
            verbosity,
            log_file,
            log_file_format,
            log_level,
            log_max_bytes,
            log_max_files,
            log_when_to_rotate,
            dryrun,
            paths
        );
        self.extra.extend(layer.extra);
        self
    }
}

impl ConfigLayer {
    /// Stacks `upper` on top of this layer; `upper` wins wherever both are set.
    pub fn merge(mut self, upper: ConfigLayer) -> Self {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if upper.$field.is_some() {
                    self.$field = upper.$field;
                })*
            };
        }
        take!(
            config_file,
            verbosity,
            log_file,
            log_file_format,
            log_level,
            log_max_bytes,
            log_max_files,
            log_when_to_rotate,
            dryrun,
            paths
        );
        self.extra.extend(upper.extra);
        self
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::app::models::RotateWhen;
    use std::io::Write;
    use tempfile::TempDir;

    pub(crate) fn sample_defaults() -> AppConfig {
        AppConfig {
            config_file: None,
            log_file: None,
            log_level: None,
            ..default_config()
        }
    }

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn missing_default_config_file_is_an_empty_layer() {
        let dir = TempDir::new().unwrap();
        let defaults = AppConfig {
            config_file: Some(dir.path().join("nope.config")),
            ..sample_defaults()
        };

        let merged = merge(&defaults, ConfigLayer::default()).unwrap();
        assert_eq!(merged, defaults);
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let overrides = ConfigLayer {
            config_file: Some(Some(dir.path().join("nope.config"))),
            ..Default::default()
        };

        let err = merge(&sample_defaults(), overrides).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn non_mapping_document_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "list.yaml", "- one\n- two\n");

        let err = read_yaml_layer(&path).unwrap_err();
        assert!(matches!(err, ConfigError::NotAMapping { .. }));
        assert!(err.to_string().contains("is not a YAML dictionary"));
    }

    #[test]
    fn empty_document_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "empty.yaml", "");

        let err = read_yaml_layer(&path).unwrap_err();
        assert!(matches!(err, ConfigError::NotAMapping { .. }));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "bad.yaml", "verbosity: [INFO\n");

        let err = read_yaml_layer(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn wrongly_typed_key_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "typed.yaml", "log_max_files: lots\n");

        let err = read_yaml_layer(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn layers_override_in_order() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "app.config",
            "verbosity: INFO\nlog_max_files: 3\nlog_when_to_rotate: midnight\ncolor: blue\n",
        );
        let defaults = AppConfig {
            config_file: Some(path),
            ..sample_defaults()
        };
        let overrides = ConfigLayer {
            verbosity: Some(Verbosity::Debug),
            dryrun: Some(true),
            ..Default::default()
        };

        let merged = merge(&defaults, overrides).unwrap();
        assert_eq!(merged.verbosity, Verbosity::Debug);
        assert_eq!(merged.log_max_files, 3);
        assert_eq!(merged.log_when_to_rotate, Some(RotateWhen::Midnight));
        assert!(merged.dryrun);
        // Untouched defaults survive.
        assert_eq!(merged.log_max_bytes, defaults.log_max_bytes);
        assert_eq!(merged.log_file_format, DEFAULT_LOG_FILE_FORMAT);
        // Keys unknown to the defaults still come through.
        assert_eq!(merged.extra.get("color"), Some(&Value::from("blue")));
    }

    #[test]
    fn explicit_config_file_replaces_default_one() {
        let dir = TempDir::new().unwrap();
        let default_path = write_file(&dir, "default.config", "log_max_files: 1\n");
        let explicit_path = write_file(&dir, "explicit.config", "log_max_files: 2\n");
        let defaults = AppConfig {
            config_file: Some(default_path),
            ..sample_defaults()
        };
        let overrides = ConfigLayer {
            config_file: Some(Some(explicit_path.clone())),
            ..Default::default()
        };

        let merged = merge(&defaults, overrides).unwrap();
        assert_eq!(merged.log_max_files, 2);
        assert_eq!(merged.config_file, Some(explicit_path));
    }

    #[test]
    fn null_in_the_config_file_clears_the_default() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "app.config", "log_file:\nlog_level: ~\n");
        let defaults = AppConfig {
            config_file: Some(path),
            log_file: Some(dir.path().join("app.log")),
            log_level: Some(Verbosity::Info),
            ..sample_defaults()
        };

        let merged = merge(&defaults, ConfigLayer::default()).unwrap();
        assert!(merged.log_file().is_none());
        assert_eq!(merged.log_level, None);
        // Keys the file leaves out keep their defaults.
        assert_eq!(merged.log_max_files, defaults.log_max_files);
    }

    #[test]
    fn null_in_an_upper_layer_survives_composition() {
        let file = ConfigLayer {
            log_level: Some(Some(Verbosity::Debug)),
            ..Default::default()
        };
        let overrides = ConfigLayer {
            log_level: Some(None),
            ..Default::default()
        };

        let combined = file.merge(overrides);
        assert_eq!(combined.log_level, Some(None));
        assert_eq!(sample_defaults().apply(combined).log_level, None);
    }

    #[test]
    fn merging_is_shallow() {
        let mut lower = ConfigLayer::default();
        lower.extra.insert(
            "nested".to_string(),
            serde_yaml::from_str("{a: 1, b: 2}").unwrap(),
        );
        let mut upper = ConfigLayer::default();
        upper
            .extra
            .insert("nested".to_string(), serde_yaml::from_str("{a: 3}").unwrap());

        let merged = sample_defaults().apply(lower).apply(upper);
        let nested: Value = serde_yaml::from_str("{a: 3}").unwrap();
        assert_eq!(merged.extra.get("nested"), Some(&nested));
    }

    #[test]
    fn layering_is_associative() {
        let file = ConfigLayer {
            verbosity: Some(Verbosity::Info),
            log_max_bytes: Some(10),
            log_level: Some(Some(Verbosity::Debug)),
            paths: Some(vec!["a".to_string()]),
            ..Default::default()
        };
        let overrides = ConfigLayer {
            verbosity: Some(Verbosity::Silent),
            log_max_files: Some(1),
            paths: Some(vec!["b".to_string()]),
            ..Default::default()
        };
        let defaults = sample_defaults();

        let stepwise = defaults.clone().apply(file.clone()).apply(overrides.clone());
        let combined = defaults.apply(file.merge(overrides));
        assert_eq!(stepwise, combined);
        assert_eq!(stepwise.verbosity, Verbosity::Silent);
        assert_eq!(stepwise.log_max_bytes, 10);
        assert_eq!(stepwise.log_max_files, 1);
        assert_eq!(stepwise.log_level, Some(Verbosity::Debug));
        assert_eq!(stepwise.paths, vec!["b".to_string()]);
    }
}
