use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use energy_client::{awattar, http::HttpSettings, smartmeter};
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "importer-config.toml";
pub const CONFIG_PATH_ENV: &str = "IMPORTER_CONFIG";

#[derive(Clone, Deserialize)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
}

impl fmt::Debug for InfluxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmartMeterConfig {
    pub base_url: String,
    pub session_file: PathBuf,
}

impl Default for SmartMeterConfig {
    fn default() -> Self {
        Self {
            base_url: smartmeter::DEFAULT_BASE_URL.to_string(),
            session_file: PathBuf::from("evn_session.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AwattarConfig {
    pub base_url: String,
}

impl Default for AwattarConfig {
    fn default() -> Self {
        Self {
            base_url: awattar::DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let defaults = HttpSettings::default();
        Self {
            timeout_secs: defaults.timeout.as_secs(),
            connect_timeout_secs: defaults.connect_timeout.as_secs(),
        }
    }
}

impl HttpConfig {
    pub fn settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub influx: InfluxConfig,
    #[serde(default)]
    pub smartmeter: SmartMeterConfig,
    #[serde(default)]
    pub awattar: AwattarConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl AppConfig {
    /// Load from `path`, else from `$IMPORTER_CONFIG`, else from `importer-config.toml`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => env::var(CONFIG_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }
}
