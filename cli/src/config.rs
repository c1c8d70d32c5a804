use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use wallet::hardware::DEFAULT_DEVICE_TIMEOUT;
use wallet::mnemonic::DEFAULT_WORD_COUNT;
use wallet::{KdfConfig, DEFAULT_HRP};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Where `wallet create` writes; a timestamped file in `data_dir` if unset.
    #[serde(default)]
    pub wallet_file: Option<PathBuf>,

    #[serde(default = "default_hrp")]
    pub hrp: String,

    #[serde(default = "default_word_count")]
    pub word_count: usize,

    #[serde(default = "default_device_timeout_secs")]
    pub device_timeout_secs: u64,

    #[serde(default)]
    pub kdf: KdfConfig,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".spacemesh")
}

fn default_hrp() -> String {
    DEFAULT_HRP.to_string()
}

fn default_word_count() -> usize {
    DEFAULT_WORD_COUNT
}

fn default_device_timeout_secs() -> u64 {
    DEFAULT_DEVICE_TIMEOUT.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: default_data_dir(),
            wallet_file: None,
            hrp: default_hrp(),
            word_count: default_word_count(),
            device_timeout_secs: default_device_timeout_secs(),
            kdf: KdfConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_from(&Self::config_path())
    }

    /// Read `path`, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            create_private_dir(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        default_data_dir().join("config.json")
    }

    /// Create the data directory, readable by the owner only.
    pub fn ensure_data_dir(&self) -> std::io::Result<()> {
        create_private_dir(&self.data_dir)
    }

    /// Path for a newly created wallet file.
    pub fn new_wallet_path(&self) -> PathBuf {
        match &self.wallet_file {
            Some(file) if file.is_absolute() => file.clone(),
            Some(file) => self.data_dir.join(file),
            None => self.data_dir.join(format!(
                "wallet_{}.json",
                Utc::now().format("%Y-%m-%dT%H-%M-%S%.3f")
            )),
        }
    }

    pub fn device_timeout(&self) -> Duration {
        Duration::from_secs(self.device_timeout_secs)
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}
