use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use docker_upstreams::Options;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Docker endpoint, e.g. `unix:///var/run/docker.sock` or `tcp://10.0.0.1:2375`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_host: Option<String>,
    pub connect_timeout_secs: u64,
    pub retry_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker_host: None,
            connect_timeout_secs: 120,
            retry_backoff_ms: 500,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("docker-upstreams.toml"))
                .merge(Json::file("docker-upstreams.json"))
                .merge(Env::prefixed("DOCKER_UPSTREAMS_")),
        )
    }

    fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        if config.retry_backoff_ms == 0 {
            anyhow::bail!("retry_backoff_ms must be greater than zero");
        }

        Ok(config)
    }

    pub fn options(&self) -> Options {
        Options {
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}
