//! CLI-level configuration: a TOML file plus environment overrides, the
//! same two-step load the teacher's `mockforge_core::config` uses for its
//! server config (file first, environment variables layered on top).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub mock_http_port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub scheduler_tick_period_ms: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            mock_http_port: 3100,
            log_level: "info".to_string(),
            log_json: false,
            scheduler_tick_period_ms: 1000,
        }
    }
}

impl CliConfig {
    pub fn load(path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("TESTMESH_MOCK_HTTP_PORT") {
            if let Ok(port) = port.parse() {
                self.mock_http_port = port;
            }
        }
        if let Ok(level) = std::env::var("TESTMESH_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Ok(json) = std::env::var("TESTMESH_LOG_JSON") {
            self.log_json = json == "1" || json.eq_ignore_ascii_case("true");
        }
        if let Ok(period) = std::env::var("TESTMESH_SCHEDULER_TICK_MS") {
            if let Ok(period) = period.parse() {
                self.scheduler_tick_period_ms = period;
            }
        }
    }
}
