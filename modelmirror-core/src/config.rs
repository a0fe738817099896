//! Configuration for ModelMirror audits.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment -> explicit overrides.
//! Configuration is loaded from `~/.config/modelmirror/config.toml` and/or
//! `.modelmirror/config.toml` in the workspace directory.

use crate::data::Label;
use crate::error::{AuditError, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level audit configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Fairness evaluation settings.
    #[serde(default)]
    pub fairness: FairnessConfig,
    /// Leakage detection settings.
    #[serde(default)]
    pub leakage: LeakageConfig,
    /// Feature attribution settings.
    #[serde(default)]
    pub explain: ExplainConfig,
    /// Report export settings.
    #[serde(default)]
    pub report: ReportConfig,
    /// Dataset ingestion settings.
    #[serde(default)]
    pub data: DataConfig,
    /// Python subprocess settings for pickled estimators and script factories.
    #[serde(default)]
    pub python: PythonConfig,
}

/// Fairness evaluation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FairnessConfig {
    /// Label counted as a positive prediction. Auto-detected when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positive_label: Option<String>,
}

impl FairnessConfig {
    pub fn positive_label(&self) -> Option<Label> {
        self.positive_label.as_deref().map(Label::parse)
    }
}

/// Leakage detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeakageConfig {
    /// Absolute correlation at or above which a feature is flagged.
    #[serde(default = "default_suspicious_threshold")]
    pub suspicious_threshold: f64,
}

impl Default for LeakageConfig {
    fn default() -> Self {
        Self {
            suspicious_threshold: default_suspicious_threshold(),
        }
    }
}

fn default_suspicious_threshold() -> f64 {
    0.9
}

/// Permutation importance configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainConfig {
    /// Compute feature attributions during an audit.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Shuffles per feature.
    #[serde(default = "default_repeats")]
    pub n_repeats: usize,
    /// RNG seed for reproducible shuffles.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Rows sampled for attribution (predictions are repeated per feature).
    #[serde(default = "default_explain_rows")]
    pub max_rows: usize,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_repeats: default_repeats(),
            seed: default_seed(),
            max_rows: default_explain_rows(),
        }
    }
}

fn default_repeats() -> usize {
    5
}

fn default_seed() -> u64 {
    42
}

fn default_explain_rows() -> usize {
    5000
}

/// Report export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Header printed at the top of every page.
    #[serde(default = "default_title")]
    pub title: String,
    /// Output path used when none is given.
    #[serde(default = "default_output")]
    pub default_output: PathBuf,
    /// Directory holding the PDF font files. System locations are tried when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_dir: Option<PathBuf>,
    /// Font family name (`<family>-Regular.ttf` etc.).
    #[serde(default = "default_font_family")]
    pub font_family: String,
    /// Body lines per page for the text format.
    #[serde(default = "default_lines_per_page")]
    pub lines_per_page: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            default_output: default_output(),
            font_dir: None,
            font_family: default_font_family(),
            lines_per_page: default_lines_per_page(),
        }
    }
}

fn default_title() -> String {
    "ModelMirror Fairness Audit Report".to_string()
}

fn default_output() -> PathBuf {
    PathBuf::from("audit_report.pdf")
}

fn default_font_family() -> String {
    "LiberationSans".to_string()
}

fn default_lines_per_page() -> usize {
    60
}

/// Dataset ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Field delimiter for `.csv`/`.txt` files.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Maximum rows read from a dataset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<usize>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            max_rows: None,
        }
    }
}

impl DataConfig {
    /// The delimiter as a byte; only ASCII delimiters are supported.
    pub fn delimiter_byte(&self) -> Result<u8> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                AuditError::Config(format!(
                    "Delimiter '{}' is not an ASCII character",
                    self.delimiter
                ))
            })
    }
}

fn default_delimiter() -> char {
    ','
}

/// Python runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PythonConfig {
    /// Python executable.
    #[serde(default = "default_python_path")]
    pub python_path: PathBuf,
    /// Virtual environment to run in, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venv_path: Option<PathBuf>,
    /// Timeout for a single model invocation (seconds).
    #[serde(default = "default_python_timeout")]
    pub timeout_secs: u64,
    /// Zero-argument factory function looked up in model scripts.
    #[serde(default = "default_factory_name")]
    pub factory_name: String,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            python_path: default_python_path(),
            venv_path: None,
            timeout_secs: default_python_timeout(),
            factory_name: default_factory_name(),
        }
    }
}

fn default_python_path() -> PathBuf {
    PathBuf::from("python3")
}

fn default_python_timeout() -> u64 {
    300
}

fn default_factory_name() -> String {
    "build_model".to_string()
}

fn default_true() -> bool {
    true
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `MODELMIRROR_`)
/// 3. Workspace-local config (`.modelmirror/config.toml`)
/// 4. User config (`~/.config/modelmirror/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&AuditConfig>,
) -> Result<AuditConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(AuditConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "modelmirror", "modelmirror") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".modelmirror").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // nested keys split on `__`: MODELMIRROR_EXPLAIN__MAX_ROWS=2500
    figment = figment.merge(Env::prefixed("MODELMIRROR_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuditConfig::default();
        assert_eq!(config.leakage.suspicious_threshold, 0.9);
        assert!(config.explain.enabled);
        assert_eq!(config.explain.n_repeats, 5);
        assert_eq!(config.report.title, "ModelMirror Fairness Audit Report");
        assert_eq!(config.python.factory_name, "build_model");
        assert!(config.fairness.positive_label().is_none());
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = AuditConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: AuditConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.report.lines_per_page, config.report.lines_per_page);
        assert_eq!(parsed.data.delimiter, ',');
    }

    #[test]
    fn test_load_config_defaults() {
        let config = load_config(None, None).unwrap();
        assert_eq!(config.explain.seed, 42);
    }

    #[test]
    fn test_load_config_with_overrides() {
        let mut overrides = AuditConfig::default();
        overrides.explain.n_repeats = 9;
        overrides.fairness.positive_label = Some("yes".to_string());

        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.explain.n_repeats, 9);
        assert_eq!(
            config.fairness.positive_label(),
            Some(Label::Text("yes".into()))
        );
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join(".modelmirror");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("config.toml"),
            r#"
[leakage]
suspicious_threshold = 0.75

[report]
title = "Credit Model Audit"
lines_per_page = 40

[data]
delimiter = ";"
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.leakage.suspicious_threshold, 0.75);
        assert_eq!(config.report.title, "Credit Model Audit");
        assert_eq!(config.report.lines_per_page, 40);
        assert_eq!(config.data.delimiter_byte().unwrap(), b';');
        // untouched sections keep their defaults
        assert_eq!(config.python.timeout_secs, 300);
    }

    #[test]
    fn test_env_overrides_nested_keys() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("MODELMIRROR_EXPLAIN__MAX_ROWS", "2500");
            jail.set_env("MODELMIRROR_REPORT__FONT_FAMILY", "DejaVuSans");
            let config = load_config(None, None).map_err(|e| *e)?;
            assert_eq!(config.explain.max_rows, 2500);
            assert_eq!(config.report.font_family, "DejaVuSans");
            Ok(())
        });
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        let config = DataConfig {
            delimiter: '§',
            max_rows: None,
        };
        assert!(matches!(config.delimiter_byte(), Err(AuditError::Config(_))));
    }
}
