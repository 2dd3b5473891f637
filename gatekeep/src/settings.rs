//! CLI settings, layered with figment.
//!
//! Precedence (lowest to highest): built-in defaults, `~/.gatekeep/settings.json`,
//! `GATEKEEP_*` environment variables. Command-line flags override all of them.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use serde::{Deserialize, Serialize};
use tracing::{Level, debug, instrument};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatekeepSettings {
    /// Rule file to load when `--rules` is not given.
    #[serde(default)]
    pub rules_path: Option<PathBuf>,

    /// Print JSON instead of text by default.
    #[serde(default)]
    pub json_output: bool,
}

impl GatekeepSettings {
    pub fn settings_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|h| h.join(".gatekeep"))
            .context("could not determine home directory")
    }

    pub fn settings_file() -> Result<PathBuf> {
        Ok(Self::settings_dir()?.join("settings.json"))
    }

    /// Load from the default settings file (if present) and the environment.
    #[instrument(level = Level::TRACE)]
    pub fn load() -> Result<Self> {
        let path = Self::settings_file().ok().filter(|p| p.exists());
        Self::load_from(path.as_deref())
    }

    /// Load with an explicit settings file in place of the default one.
    #[instrument(level = Level::TRACE)]
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let settings: Self = Self::figment(path)
            .extract()
            .context("failed to load gatekeep settings")?;
        debug!(?settings, "loaded settings");
        Ok(settings)
    }

    fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Json::file(path));
        }
        figment.merge(Env::prefixed("GATEKEEP_").only(&["rules_path", "json_output"]))
    }

    /// Resolve the rule file: explicit flag, then settings, then `~/.gatekeep/rules.json`.
    pub fn rules_path(&self, flag: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = flag {
            return Ok(path.to_path_buf());
        }
        if let Some(ref path) = self.rules_path {
            return Ok(path.clone());
        }
        Ok(Self::settings_dir()?.join("rules.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        assert!(GatekeepSettings::load_from(None).is_ok());
        assert_eq!(GatekeepSettings::default().rules_path, None);
    }

    #[test]
    fn file_values_are_merged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"rules_path": "/etc/gatekeep/rules.yaml", "json_output": true}"#,
        )
        .unwrap();

        let settings = GatekeepSettings::load_from(Some(&path)).unwrap();
        assert!(settings.json_output);
        assert_eq!(
            settings.rules_path(None).unwrap(),
            PathBuf::from("/etc/gatekeep/rules.yaml")
        );
    }

    #[test]
    fn flag_overrides_settings() {
        let settings = GatekeepSettings {
            rules_path: Some(PathBuf::from("/a.json")),
            json_output: false,
        };
        assert_eq!(
            settings.rules_path(Some(Path::new("/b.json"))).unwrap(),
            PathBuf::from("/b.json")
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"json_output": "sometimes"}"#).unwrap();
        assert!(GatekeepSettings::load_from(Some(&path)).is_err());
    }
}
