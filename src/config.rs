//! Run-loop configuration with env-var overrides.
//!
//! [`RunConfig`] is the single knob surface of the kernel: loop cadence,
//! error policy, and the executor flavour. Embedders usually build it in
//! code; it also loads from a TOML file so deployments can tune the loop
//! without a rebuild, with `SWITCHBOARD_SLEEP_MS` / `SWITCHBOARD_ERRORS` /
//! `SWITCHBOARD_LOG` overrides applied on top.

use std::{env, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings for `run`/`start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Sleep between loop iterations, in milliseconds. `0` spins.
    pub sleep_ms: u64,
    /// Re-raise handler/tick failures to the loop caller instead of
    /// swallowing them after reification.
    pub errors: bool,
    /// Reify failures as `Error` events on the `error` channel.
    pub log: bool,
    /// Ask for process isolation. Best-effort: falls back to a worker
    /// thread with a warning.
    pub process: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { sleep_ms: 0, errors: false, log: true, process: false }
    }
}

impl RunConfig {
    /// Defaults with a loop cadence — the common embedder case.
    pub fn sleeping(sleep_ms: u64) -> Self {
        Self { sleep_ms, ..Self::default() }
    }

    /// Load from a TOML file, then apply `SWITCHBOARD_SLEEP_MS`,
    /// `SWITCHBOARD_ERRORS` and `SWITCHBOARD_LOG` env overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let sleep_override = env::var("SWITCHBOARD_SLEEP_MS").ok();
        let errors_override = env::var("SWITCHBOARD_ERRORS").ok();
        let log_override = env::var("SWITCHBOARD_LOG").ok();
        Self::load_from(
            path,
            sleep_override.as_deref(),
            errors_override.as_deref(),
            log_override.as_deref(),
        )
    }

    /// Internal loader — overrides are passed directly so tests do not have
    /// to mutate the process environment.
    pub fn load_from(
        path: &Path,
        sleep_override: Option<&str>,
        errors_override: Option<&str>,
        log_override: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut cfg: RunConfig = toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;

        if let Some(v) = sleep_override {
            cfg.sleep_ms = v.parse().map_err(|_| ConfigError::Override {
                name: "SWITCHBOARD_SLEEP_MS".into(),
                value: v.into(),
            })?;
        }
        if let Some(v) = errors_override {
            cfg.errors = parse_bool(v).ok_or_else(|| ConfigError::Override {
                name: "SWITCHBOARD_ERRORS".into(),
                value: v.into(),
            })?;
        }
        if let Some(v) = log_override {
            cfg.log = parse_bool(v).ok_or_else(|| ConfigError::Override {
                name: "SWITCHBOARD_LOG".into(),
                value: v.into(),
            })?;
        }
        Ok(cfg)
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.sleep_ms, 0);
        assert!(!cfg.errors);
        assert!(cfg.log);
        assert!(!cfg.process);
    }

    #[test]
    fn parse_partial_toml_fills_defaults() {
        let f = write_toml("sleep_ms = 10\n");
        let cfg = RunConfig::load_from(f.path(), None, None, None).unwrap();
        assert_eq!(cfg.sleep_ms, 10);
        assert!(cfg.log);
    }

    #[test]
    fn parse_full_toml() {
        let f = write_toml("sleep_ms = 5\nerrors = true\nlog = false\nprocess = true\n");
        let cfg = RunConfig::load_from(f.path(), None, None, None).unwrap();
        assert_eq!(
            cfg,
            RunConfig { sleep_ms: 5, errors: true, log: false, process: true }
        );
    }

    #[test]
    fn overrides_win_over_file_values() {
        let f = write_toml("sleep_ms = 5\nerrors = false\nlog = true\n");
        let cfg = RunConfig::load_from(f.path(), Some("20"), Some("true"), Some("false")).unwrap();
        assert_eq!(cfg.sleep_ms, 20);
        assert!(cfg.errors);
        assert!(!cfg.log);
    }

    #[test]
    fn errors_override_alone_leaves_the_rest() {
        let f = write_toml("sleep_ms = 5\n");
        let cfg = RunConfig::load_from(f.path(), None, Some("1"), None).unwrap();
        assert!(cfg.errors);
        assert_eq!(cfg.sleep_ms, 5);
        assert!(cfg.log);
    }

    #[test]
    fn bad_override_errors() {
        let f = write_toml("sleep_ms = 5\n");
        let err = RunConfig::load_from(f.path(), Some("soon"), None, None).unwrap_err();
        assert!(err.to_string().contains("SWITCHBOARD_SLEEP_MS"));

        let err = RunConfig::load_from(f.path(), None, Some("perhaps"), None).unwrap_err();
        assert!(err.to_string().contains("SWITCHBOARD_ERRORS"));

        let err = RunConfig::load_from(f.path(), None, None, Some("maybe")).unwrap_err();
        assert!(err.to_string().contains("SWITCHBOARD_LOG"));
    }

    #[test]
    fn missing_file_errors() {
        let err =
            RunConfig::load_from(Path::new("/nonexistent/run.toml"), None, None, None).unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }

    #[test]
    fn garbage_toml_errors() {
        let f = write_toml("sleep_ms = [not a number\n");
        let err = RunConfig::load_from(f.path(), None, None, None).unwrap_err();
        assert!(err.to_string().contains("parse error"));
    }
}
