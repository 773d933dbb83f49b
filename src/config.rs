use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use vcfclean::vcard_io::{write_atomic, ExportVariant};

const CONFIG_FILE_NAME: &str = "config.toml";
const STATE_FILE_NAME: &str = "state.toml";
const APP_NAME: &str = "vcfclean";

/// Similarity threshold used when neither the command line, the state file
/// nor the config file provide one.
pub const DEFAULT_THRESHOLD: u8 = 80;

#[derive(Debug, Clone)]
pub struct Config {
    pub config_path: PathBuf,
    pub threshold: u8,
    pub phone_region: Option<String>,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Default)]
pub struct ExportConfig {
    pub variant: ExportVariant,
}

impl Config {
    fn defaults(config_path: PathBuf) -> Self {
        Self {
            config_path,
            threshold: DEFAULT_THRESHOLD,
            phone_region: None,
            export: ExportConfig::default(),
        }
    }

    /// `state.toml` lives next to the config file.
    pub fn state_path(&self) -> PathBuf {
        self.config_path.with_file_name(STATE_FILE_NAME)
    }

    /// Threshold remembered from the last run, or the configured one.
    pub fn effective_threshold(&self) -> u8 {
        match load_state(&self.state_path()) {
            Ok(state) => state
                .last_threshold
                .filter(|&threshold| threshold <= 100)
                .unwrap_or(self.threshold),
            Err(err) => {
                eprintln!("warning: ignoring {}: {err:#}", self.state_path().display());
                self.threshold
            }
        }
    }

    pub fn remember_threshold(&self, threshold: u8) -> Result<()> {
        let path = self.state_path();
        let mut state = load_state(&path).unwrap_or_default();
        if state.last_threshold == Some(threshold) {
            return Ok(());
        }
        state.last_threshold = Some(threshold);
        let raw = toml::to_string(&state).context("failed to serialize state")?;
        write_atomic(&path, raw.as_bytes())?;
        tracing::debug!(path = %path.display(), threshold, "stored last threshold");
        Ok(())
    }
}

// =============================================================================
// File Deserialization
// =============================================================================

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    threshold: Option<i64>,
    phone_region: Option<String>,
    export: ExportFile,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ExportFile {
    variant: Option<ExportVariant>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(default)]
struct StateFile {
    last_threshold: Option<u8>,
}

fn load_state(path: &Path) -> Result<StateFile> {
    if !path.exists() {
        return Ok(StateFile::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read state file at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse {} as TOML", path.display()))
}

// =============================================================================
// Loading
// =============================================================================

fn config_root() -> Result<PathBuf> {
    let base = BaseDirs::new().context("unable to determine base directories")?;
    let dir = base.config_dir().join(APP_NAME);
    Ok(dir)
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_root()?.join(CONFIG_FILE_NAME))
}

/// Load the config from `explicit`, or from the per-user location.
/// A missing file yields the defaults.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => config_path()?,
    };
    if !path.exists() {
        if explicit.is_some() {
            bail!("configuration file not found at {}", path.display());
        }
        tracing::debug!(path = %path.display(), "no configuration file, using defaults");
        return Ok(Config::defaults(path));
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read configuration file at {}", path.display()))?;
    parse(&raw, path)
}

fn parse(raw: &str, path: PathBuf) -> Result<Config> {
    let value: toml::Value = toml::from_str(raw)
        .with_context(|| format!("failed to parse {} as TOML", path.display()))?;

    warn_unknown_keys(&value);

    let cfg_file: ConfigFile = value
        .try_into()
        .with_context(|| format!("failed to deserialize config from {}", path.display()))?;

    let threshold = match cfg_file.threshold {
        None => DEFAULT_THRESHOLD,
        Some(value) => match u8::try_from(value) {
            Ok(threshold) if threshold <= 100 => threshold,
            _ => bail!("`threshold` must be between 0 and 100, got {value}"),
        },
    };

    let phone_region = cfg_file
        .phone_region
        .as_ref()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(|value| value.to_ascii_uppercase());

    Ok(Config {
        config_path: path,
        threshold,
        phone_region,
        export: ExportConfig {
            variant: cfg_file.export.variant.unwrap_or_default(),
        },
    })
}

// =============================================================================
// Unknown key warnings
// =============================================================================

fn warn_unknown_keys(value: &toml::Value) {
    let Some(table) = value.as_table() else {
        return;
    };

    let known = HashSet::from(["threshold", "phone_region", "export"]);
    for key in table.keys() {
        if !known.contains(key.as_str()) {
            eprintln!("warning: unknown configuration key `{}`", key);
        }
    }

    if let Some(export) = table.get("export").and_then(|v| v.as_table()) {
        for key in export.keys() {
            if key != "variant" {
                eprintln!("warning: unknown export.* entry `{}`", key);
            }
        }
    }
}
