/*
 * Copyright 2025 Carver Automation Corporation.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use inventory_core::{
    ClientOptions, ControllerOptions, Credentials, FileStore, InventoryApiStore, RecordStore,
};
use serde::{Deserialize, Serialize};

const DEFAULT_PATHS: [&str; 2] = [
    "./inventory-collector.toml",
    "/etc/serviceradar/inventory-collector.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub redfish: RedfishConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedfishConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Inventory API base URL. When unset, records go to `data_dir`.
    pub api_url: Option<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_requeue_delay_ms")]
    pub requeue_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
}

impl Default for RedfishConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
            accept_invalid_certs: default_accept_invalid_certs(),
        }
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            data_dir: default_data_dir(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            requeue_delay_ms: default_requeue_delay_ms(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            resync_interval_secs: default_resync_interval_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the specified path, or search default locations if None
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        if let Some(path) = config_path {
            tracing::info!(path, "loading config");
            return Self::from_file(path);
        }

        for path in DEFAULT_PATHS {
            if Path::new(path).exists() {
                tracing::info!(path, "loading config");
                return Self::from_file(path);
            }
        }

        tracing::info!(searched = ?DEFAULT_PATHS, "no config file found, using defaults");
        Ok(Self::default())
    }

    /// Credentials for a BMC, preferring values given on the command line.
    pub fn credentials(&self, username: Option<&str>, password: Option<&str>) -> Result<Credentials> {
        let username = username
            .or(self.redfish.username.as_deref())
            .context("Redfish username is required (--username, REDFISH_USERNAME or [redfish].username)")?;
        let password = password
            .or(self.redfish.password.as_deref())
            .context("Redfish password is required (--password, REDFISH_PASSWORD or [redfish].password)")?;
        Ok(Credentials::new(username, password))
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: Duration::from_secs(self.redfish.timeout_secs),
            accept_invalid_certs: self.redfish.accept_invalid_certs,
        }
    }

    pub fn controller_options(&self) -> ControllerOptions {
        let controller = &self.controller;
        ControllerOptions {
            workers: controller.workers,
            max_retries: controller.max_retries,
            base_backoff: Duration::from_millis(controller.base_backoff_ms),
            max_backoff: Duration::from_millis(controller.max_backoff_ms),
            resync_interval: (controller.resync_interval_secs > 0)
                .then(|| Duration::from_secs(controller.resync_interval_secs)),
        }
    }

    pub fn requeue_delay(&self) -> Duration {
        Duration::from_millis(self.controller.requeue_delay_ms)
    }

    /// The inventory API when `api_url` is set, otherwise the file store.
    pub fn open_store(&self) -> Result<Arc<dyn RecordStore>> {
        match self.inventory.api_url.as_deref() {
            Some(url) => {
                let store = InventoryApiStore::new(
                    url,
                    Duration::from_secs(self.inventory.timeout_secs),
                )
                .context("Failed to create inventory API client")?;
                tracing::info!(url = store.base_url(), "using inventory API store");
                Ok(Arc::new(store))
            }
            None => {
                tracing::info!(data_dir = %self.inventory.data_dir, "using file store");
                Ok(Arc::new(FileStore::new(&self.inventory.data_dir)))
            }
        }
    }

    /// Generate an example configuration file content
    pub fn example_toml() -> String {
        let example = Config {
            redfish: RedfishConfig {
                username: Some("root".to_string()),
                password: Some("changeme".to_string()),
                ..RedfishConfig::default()
            },
            inventory: InventoryConfig {
                api_url: Some("http://localhost:8080".to_string()),
                ..InventoryConfig::default()
            },
            controller: ControllerConfig::default(),
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Failed to generate example".to_string())
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_accept_invalid_certs() -> bool {
    true
}

fn default_data_dir() -> String {
    "/var/lib/serviceradar/inventory".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_requeue_delay_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_resync_interval_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.redfish.timeout_secs, 30);
        assert!(config.redfish.accept_invalid_certs);
        assert!(config.inventory.api_url.is_none());
        assert_eq!(config.controller.workers, 4);
        assert_eq!(config.requeue_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_sections_get_defaults() {
        let config: Config = toml::from_str(
            r#"
[redfish]
username = "admin"
accept_invalid_certs = false

[controller]
workers = 8
resync_interval_secs = 0
"#,
        )
        .unwrap();

        assert_eq!(config.redfish.username.as_deref(), Some("admin"));
        assert!(!config.redfish.accept_invalid_certs);
        assert_eq!(config.redfish.timeout_secs, 30);
        assert_eq!(config.inventory.data_dir, "/var/lib/serviceradar/inventory");

        let options = config.controller_options();
        assert_eq!(options.workers, 8);
        assert_eq!(options.max_retries, 5);
        assert_eq!(options.base_backoff, Duration::from_millis(500));
        assert!(options.resync_interval.is_none());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[inventory]\napi_url = \"http://inventory:8080\"\n")
            .unwrap();

        let config = Config::load(Some(temp_file.path().to_str().unwrap())).unwrap();
        assert_eq!(config.inventory.api_url.as_deref(), Some("http://inventory:8080"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Config::from_file("/nonexistent/inventory-collector.toml").is_err());
    }

    #[test]
    fn test_command_line_credentials_win() {
        let mut config = Config::default();
        config.redfish.username = Some("file-user".to_string());
        config.redfish.password = Some("file-pass".to_string());

        let creds = config.credentials(Some("cli-user"), None).unwrap();
        assert_eq!(creds.username, "cli-user");
        assert_eq!(creds.password, "file-pass");

        let empty = Config::default();
        assert!(empty.credentials(None, Some("x")).is_err());
    }

    #[test]
    fn test_example_toml_parses() {
        let example = Config::example_toml();
        let parsed: Config = toml::from_str(&example).unwrap();
        assert_eq!(parsed.redfish.username.as_deref(), Some("root"));
        assert_eq!(parsed.controller.resync_interval_secs, 30);
    }

    #[test]
    fn test_open_file_store_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.inventory.data_dir = dir.path().display().to_string();
        assert!(config.open_store().is_ok());
    }
}
