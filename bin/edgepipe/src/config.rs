use std::path::Path;

use iori_edge::LiveConfig;
use serde::{Deserialize, Serialize};

#[derive(Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub stream: LiveConfig,
    pub http: HttpConfig,
}

#[derive(Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HttpConfig {
    /// Timeout seconds for each playlist or segment request.
    pub timeout: u64,
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: 10,
            user_agent: None,
        }
    }
}

impl Config {
    pub fn load(file: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(file)?;
        let config = toml::from_str(&data)?;
        Ok(config)
    }
}
