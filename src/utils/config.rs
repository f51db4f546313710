use crate::mirror::SyncTarget;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_logging() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Start mirroring automatically when the host session logs in
    #[serde(default)]
    pub autoload: bool,

    /// Gate for the user-facing mirror log
    #[serde(default = "default_logging")]
    pub logging: bool,

    /// Root directory that mirrored targets are created under
    pub sync_root: PathBuf,

    /// Ordered collection of mirrored folder pairs
    #[serde(default)]
    pub targets: Vec<SyncTarget>,
}

impl Default for Config {
    fn default() -> Self {
        let sync_root = dirs::home_dir()
            .map(|home| home.join("Mirror"))
            .unwrap_or_else(|| PathBuf::from("Mirror"));

        Self {
            autoload: false,
            logging: true,
            sync_root,
            targets: Vec::new(),
        }
    }
}

impl Config {
    /// Location of the settings file under the user configuration directory.
    pub fn settings_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("smartsync")
            .join("settings.json")
    }

    /// Load settings from the default location, falling back to defaults if
    /// no file exists yet, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::settings_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Config::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        let config = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse settings in {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::settings_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, raw)
            .with_context(|| format!("failed to write settings to {}", path.display()))?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(root) = std::env::var("SMARTSYNC_ROOT") {
            self.sync_root = PathBuf::from(root);
        }
        if let Ok(logging) = std::env::var("SMARTSYNC_LOGGING") {
            self.logging = logging.parse()?;
        }
        if let Ok(autoload) = std::env::var("SMARTSYNC_AUTOLOAD") {
            self.autoload = autoload.parse()?;
        }
        Ok(())
    }

    /// Register a new target mirroring `source` into `<sync_root>/<name>`.
    pub fn add_target(&mut self, name: impl Into<String>, source: impl Into<PathBuf>) {
        let target = SyncTarget::new(name, source, &self.sync_root);
        self.targets.push(target);
    }
}
