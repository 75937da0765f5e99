use super::StrategyArg;
use clap::ValueEnum;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Named set of defaults from the config file. Command-line flags win over
/// every field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    #[serde(skip)]
    pub name: String,
    pub page_size: Option<u32>,
    pub cache_pages: Option<usize>,
    #[serde(default, deserialize_with = "strategy_name")]
    pub strategy: Option<StrategyArg>,
    pub ring_pages: Option<usize>,
    pub verify_bucket_ownership: Option<bool>,
}

/// Contents of `cli.toml`:
///
/// ```toml
/// default_profile = "audit"
///
/// [profiles.audit]
/// strategy = "normal"
/// verify_bucket_ownership = true
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    #[serde(skip)]
    path: Option<PathBuf>,
    default_profile: Option<String>,
    #[serde(default)]
    profiles: BTreeMap<String, Profile>,
}

impl CliConfig {
    /// Reads `explicit`, or the per-user config file when none is given. A
    /// missing file is an empty config.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let Some(path) = explicit.or_else(default_config_path) else {
            return Ok(Self::default());
        };
        let mut config = if path.exists() {
            Self::parse(&path)?
        } else {
            Self::default()
        };
        config.path = Some(path);
        Ok(config)
    }

    fn parse(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        for (name, profile) in config.profiles.iter_mut() {
            profile.name = name.clone();
        }
        if let Some(name) = &config.default_profile {
            if !config.profiles.contains_key(name) {
                return Err(ConfigError::ProfileNotFound { name: name.clone() });
            }
        }
        Ok(config)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Profile named on the command line, else the configured default.
    pub fn select(&self, requested: Option<&str>) -> Result<Option<&Profile>, ConfigError> {
        let Some(name) = requested.or(self.default_profile.as_deref()) else {
            return Ok(None);
        };
        self.profiles
            .get(name)
            .map(Some)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.to_string(),
            })
    }
}

fn strategy_name<'de, D>(deserializer: D) -> Result<Option<StrategyArg>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    StrategyArg::from_str(&raw, true)
        .map(Some)
        .map_err(|_| serde::de::Error::custom(format!("unknown strategy '{raw}'")))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("hashcheck").join("cli.toml"))
}
