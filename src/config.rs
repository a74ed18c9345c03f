//! Optional TOML configuration.
//!
//! Values resolve as: command-line flag, then config file, then built-in
//! default. The file is looked up at `--config <path>` if given, otherwise
//! `./image-pipeline.toml`, otherwise `<config dir>/image-pipeline/config.toml`.
//! A missing file means all defaults.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::shrink::StrategyKind;

/// File name searched for in the working directory.
pub const LOCAL_CONFIG_NAME: &str = "image-pipeline.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub shrink: ShrinkConfig,
    pub rebuild: RebuildConfig,
    pub smoke: SmokeConfig,
    pub update: UpdateConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShrinkConfig {
    pub strategy: Option<StrategyKind>,
    /// Overrides the strategy's step quantum, in bytes.
    pub quantum: Option<u64>,
    pub state_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RebuildConfig {
    pub root_partition: Option<String>,
    pub definitions: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmokeConfig {
    pub firmware: Option<PathBuf>,
    pub memory: Option<String>,
    pub timeout_secs: Option<u64>,
    pub hook: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateConfig {
    pub definitions_source: Option<PathBuf>,
    pub inhibit_who: Option<String>,
}

impl Config {
    /// Load configuration, honoring an explicit path if one was passed.
    ///
    /// An explicit path that doesn't exist is an error; the implicit
    /// search locations are simply skipped when absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.is_file() {
                bail!("config file '{}' does not exist", path.display());
            }
            return Self::from_file(path);
        }

        for candidate in search_paths() {
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "using config file");
                return Self::from_file(&candidate);
            }
        }

        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config '{}'", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config '{}'", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_NAME)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("image-pipeline").join("config.toml"));
    }
    paths
}
