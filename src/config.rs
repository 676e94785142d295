// OfCheck: Semantic checks of OpenFlow controller configurations
// Copyright (C) 2022-2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! This module contains the code for reading the configuration.
//!
//! The configuration is a TOML file. Every key is optional:
//!
//! ```toml
//! keywords_dir = "flow-equiv/keywords"
//!
//! [controller]
//! host = "127.0.0.1"
//! port = 8181
//! node = "openflow:1"
//!
//! [switch]
//! bridge = "s1"
//! ssh_host = "mininet"
//! ```

use std::{
    borrow::Cow,
    path::{Path, PathBuf},
    time::Duration,
};

use flow_equiv::{KeywordError, Keywords};
use ovs_lab::{Host, OvsSwitch, RestError, RestconfClient, SshError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable pointing to the configuration file.
pub const CONFIG_ENV: &str = "OFCHECK_CONFIG";

/// Complete configuration of the test harness.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The OpenFlow controller
    pub controller: ControllerConfig,
    /// The switch managed by the controller
    pub switch: SwitchConfig,
    /// Directory containing the keyword tables. The built-in tables are used if omitted.
    pub keywords_dir: Option<PathBuf>,
}

/// How to reach the RESTCONF interface of the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Hostname or address of the controller
    pub host: String,
    /// Port of the RESTCONF interface
    pub port: u16,
    /// Inventory node id of the switch, like `openflow:1`.
    pub node: String,
    /// Username for basic authentication
    pub username: String,
    /// Password for basic authentication
    pub password: String,
    /// Timeout of a single request
    pub timeout_secs: u64,
    /// Time to wait after a write before reading the config store.
    pub config_delay_ms: u64,
    /// Time to wait after a write before reading the operational store or the switch.
    pub operational_delay_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8181,
            node: "openflow:1".to_string(),
            username: "admin".to_string(),
            password: "admin".to_string(),
            timeout_secs: 30,
            config_delay_ms: 500,
            operational_delay_ms: 2000,
        }
    }
}

impl ControllerConfig {
    /// Timeout of a single request.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay before reading the config store.
    pub fn config_delay(&self) -> Duration {
        Duration::from_millis(self.config_delay_ms)
    }

    /// Delay before reading the operational store or the switch.
    pub fn operational_delay(&self) -> Duration {
        Duration::from_millis(self.operational_delay_ms)
    }
}

/// How to reach the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    /// Name of the bridge
    pub bridge: String,
    /// OpenFlow version passed to `ovs-ofctl -O`
    pub protocol: String,
    /// SSH destination of the host running the bridge. Commands are executed locally if omitted.
    pub ssh_host: Option<String>,
    /// Run `ovs-ofctl` with `sudo`.
    pub sudo: bool,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            bridge: "s1".to_string(),
            protocol: ovs_lab::switch::DEFAULT_PROTOCOL.to_string(),
            ssh_host: None,
            sudo: false,
        }
    }
}

impl Config {
    /// Parse the configuration from a TOML string.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Read the configuration from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config = Self::parse(&input)?;
        log::debug!("[config] loaded {}", path.display());
        Ok(config)
    }

    /// Read the configuration from the file in [`CONFIG_ENV`], or use the defaults if the
    /// variable is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(path),
            None => {
                log::debug!("[config] {CONFIG_ENV} is not set, using the defaults");
                Ok(Self::default())
            }
        }
    }

    /// The keyword tables, either loaded from `keywords_dir` or the built-in ones.
    pub fn keywords(&self) -> Result<Cow<'static, Keywords>, KeywordError> {
        match &self.keywords_dir {
            Some(dir) => Ok(Cow::Owned(Keywords::load(dir)?)),
            None => Ok(Cow::Borrowed(Keywords::builtin())),
        }
    }

    /// Create the RESTCONF client.
    pub fn controller_client(&self) -> Result<RestconfClient, RestError> {
        let c = &self.controller;
        RestconfClient::new(&c.host, c.port, &c.username, &c.password, c.timeout())
    }

    /// Connect to the host of the bridge and create the switch.
    pub async fn connect_switch(&self) -> Result<OvsSwitch, SshError> {
        let s = &self.switch;
        let host = Host::connect(s.ssh_host.as_deref()).await?;
        Ok(OvsSwitch::new(host, &s.bridge)
            .protocol(&s.protocol)
            .sudo(s.sudo))
    }
}

/// Error while reading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file cannot be read.
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, std::io::Error),
    /// The file is not valid TOML, or has values of the wrong type.
    #[error("Cannot parse the configuration: {0}")]
    Toml(#[from] toml::de::Error),
}
