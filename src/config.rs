// Tue Oct 13 2026 - Alex

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_WORKING_DIR: &str = "TASKFLOW_WORKING_DIR";
pub const ENV_OUTPUT_DIR: &str = "TASKFLOW_OUTPUT_DIR";
pub const ENV_SCRATCH_DIR: &str = "TASKFLOW_SCRATCH_DIR";
pub const ENV_MARKER_PREFIX: &str = "TASKFLOW_MARKER_PREFIX";

/// Marker prefix used by the external job-polling convention.
pub const DEFAULT_MARKER_PREFIX: &str = "RELION_JOB_EXIT_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0:?}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),
}

/// Settings of a managed pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub working_dir: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
    pub marker_prefix: String,
    pub tmp_name: String,
    pub handle_signals: bool,
    pub debug: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            working_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            output_dir: None,
            scratch_dir: None,
            marker_prefix: DEFAULT_MARKER_PREFIX.to_string(),
            tmp_name: "tmp".to_string(),
            handle_signals: true,
            debug: false,
        }
    }
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_working_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_scratch_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn with_marker_prefix(mut self, prefix: &str) -> Self {
        self.marker_prefix = prefix.to_string();
        self
    }

    pub fn with_signal_handling(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let ext = path.extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext.to_lowercase().as_str() {
            "json" => {
                let contents = fs::read_to_string(path)?;
                Ok(serde_json::from_str(&contents)?)
            }
            _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Overrides settings with the `TASKFLOW_*` variables that are set.
    /// Values loaded from a file lose against the environment.
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| env::var(key).ok())
    }

    pub fn apply_env_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_WORKING_DIR) {
            self.working_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_OUTPUT_DIR) {
            self.output_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup(ENV_SCRATCH_DIR) {
            self.scratch_dir = Some(PathBuf::from(dir));
        }
        if let Some(prefix) = lookup(ENV_MARKER_PREFIX) {
            self.marker_prefix = prefix;
        }
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.working_dir.as_os_str().is_empty() {
            return Err("working_dir must not be empty".to_string());
        }
        match &self.output_dir {
            None => return Err("output_dir must be set".to_string()),
            Some(dir) if dir.as_os_str().is_empty() => {
                return Err("output_dir must not be empty".to_string());
            }
            _ => {}
        }
        if self.tmp_name.is_empty() || self.tmp_name.contains(std::path::MAIN_SEPARATOR) {
            return Err(format!("tmp_name must be a plain file name, got '{}'", self.tmp_name));
        }
        Ok(())
    }
}

/// Resolves a setting from an explicit value, then the environment, then a
/// default.
pub fn get_arg(explicit: Option<&str>, env_key: &str, default: Option<&str>) -> Option<String> {
    explicit
        .map(str::to_string)
        .or_else(|| env::var(env_key).ok())
        .or_else(|| default.map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.marker_prefix, "RELION_JOB_EXIT_");
        assert_eq!(config.tmp_name, "tmp");
        assert!(config.handle_signals);
        assert!(config.output_dir.is_none());
    }

    #[test]
    fn test_validate_requires_output_dir() {
        let config = RunConfig::new().with_working_dir("/data");
        assert!(config.validate().is_err());

        let config = config.with_output_dir("/data/out");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_nested_tmp_name() {
        let mut config = RunConfig::new().with_output_dir("/data/out");
        config.tmp_name = format!("a{}b", std::path::MAIN_SEPARATOR);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("run.json");
        let config = RunConfig::new()
            .with_working_dir("/work")
            .with_output_dir("/work/out")
            .with_scratch_dir("/scratch")
            .with_marker_prefix("")
            .with_signal_handling(false);

        config.save(&path).unwrap();
        assert_eq!(RunConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(&path, r#"{"output_dir": "/out", "debug": true}"#).unwrap();

        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.output_dir, Some(PathBuf::from("/out")));
        assert!(config.debug);
        assert_eq!(config.marker_prefix, DEFAULT_MARKER_PREFIX);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            RunConfig::load(dir.path().join("missing.json")),
            Err(ConfigError::NotFound(_))
        ));

        let toml = dir.path().join("run.toml");
        fs::write(&toml, "").unwrap();
        assert!(matches!(RunConfig::load(&toml), Err(ConfigError::UnsupportedFormat(_))));
    }

    fn fake_env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_env_overrides_every_field_of_a_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(
            &path,
            r#"{"working_dir": "/cfg/work", "output_dir": "/cfg/out", "scratch_dir": "/cfg/scratch", "marker_prefix": "CFG_"}"#,
        )
        .unwrap();

        let config = RunConfig::load(&path).unwrap().apply_env_from(fake_env(&[
            (ENV_WORKING_DIR, "/env/work"),
            (ENV_OUTPUT_DIR, "/env/out"),
            (ENV_SCRATCH_DIR, "/env/scratch"),
            (ENV_MARKER_PREFIX, "ENV_"),
        ]));

        assert_eq!(config.working_dir, PathBuf::from("/env/work"));
        assert_eq!(config.output_dir, Some(PathBuf::from("/env/out")));
        assert_eq!(config.scratch_dir, Some(PathBuf::from("/env/scratch")));
        assert_eq!(config.marker_prefix, "ENV_");
    }

    #[test]
    fn test_unset_env_keeps_config_values() {
        let config = RunConfig::new()
            .with_working_dir("/work")
            .with_output_dir("/work/out")
            .with_marker_prefix("JOB_")
            .apply_env_from(fake_env(&[(ENV_SCRATCH_DIR, "/env/scratch")]));

        assert_eq!(config.working_dir, PathBuf::from("/work"));
        assert_eq!(config.output_dir, Some(PathBuf::from("/work/out")));
        assert_eq!(config.scratch_dir, Some(PathBuf::from("/env/scratch")));
        assert_eq!(config.marker_prefix, "JOB_");
    }

    #[test]
    fn test_get_arg_precedence() {
        let key = "TASKFLOW_TEST_GET_ARG_PRECEDENCE";
        env::remove_var(key);
        assert_eq!(get_arg(None, key, Some("fallback")).as_deref(), Some("fallback"));
        assert_eq!(get_arg(None, key, None), None);

        env::set_var(key, "from-env");
        assert_eq!(get_arg(None, key, Some("fallback")).as_deref(), Some("from-env"));
        assert_eq!(get_arg(Some("explicit"), key, Some("fallback")).as_deref(), Some("explicit"));
        env::remove_var(key);
    }
}
