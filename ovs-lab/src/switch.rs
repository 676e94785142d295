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

//! Access to the flow table of an Open vSwitch bridge.

use std::collections::HashSet;

use async_trait::async_trait;
use flow_equiv::{
    compare::scalars_equivalent,
    normalize::{normalize_dump_output, NormalizeError},
    CanonicalRecord, Value,
};
use thiserror::Error;

use crate::ssh::{Host, SshError};

/// Default OpenFlow version used to talk to the bridge.
pub const DEFAULT_PROTOCOL: &str = "OpenFlow13";

/// A switch whose flow table can be dumped.
#[async_trait]
pub trait Switch: Send + Sync {
    /// Name used in log messages.
    fn name(&self) -> &str;

    /// Raw output of the flow table dump.
    async fn dump_flows(&self) -> Result<String, SwitchError>;

    /// All installed flows, normalized and sorted by their age (most recently installed first).
    async fn installed_flows(
        &self,
        ignore: &HashSet<String>,
    ) -> Result<Vec<CanonicalRecord>, SwitchError> {
        let dump = self.dump_flows().await?;
        let mut flows = normalize_dump_output(&dump, ignore)?;
        flows.sort_by(|a, b| age(a).total_cmp(&age(b)));
        log::debug!("[{}] {} flows installed", self.name(), flows.len());
        Ok(flows)
    }
}

/// Seconds since the flow was installed. Flows without duration are treated as the oldest.
fn age(flow: &CanonicalRecord) -> f64 {
    flow.get_str("duration")
        .and_then(|d| d.parse().ok())
        .unwrap_or(f64::INFINITY)
}

/// Select the first flow whose values are equivalent to all fields of `identity`. Flags in
/// `identity` must be present in the flow.
pub fn select_flow<'a>(
    flows: &'a [CanonicalRecord],
    identity: &CanonicalRecord,
) -> Option<&'a CanonicalRecord> {
    flows.iter().find(|flow| {
        identity.iter().all(|(key, expected)| match (expected, flow.get(key)) {
            (Value::Scalar(e), Some(Value::Scalar(a))) => scalars_equivalent(e, a),
            (Value::Flag, Some(Value::Flag)) => true,
            _ => false,
        })
    })
}

/// An Open vSwitch bridge, managed with `ovs-ofctl`.
#[derive(Debug, Clone)]
pub struct OvsSwitch {
    host: Host,
    bridge: String,
    protocol: String,
    sudo: bool,
}

impl OvsSwitch {
    /// Bridge `bridge` on the given host, using [`DEFAULT_PROTOCOL`].
    pub fn new(host: Host, bridge: impl Into<String>) -> Self {
        Self {
            host,
            bridge: bridge.into(),
            protocol: DEFAULT_PROTOCOL.to_string(),
            sudo: false,
        }
    }

    /// Set the OpenFlow version passed to `ovs-ofctl -O`.
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Run `ovs-ofctl` with `sudo`.
    pub fn sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    /// The bridge name
    pub fn bridge(&self) -> &str {
        &self.bridge
    }

    /// Arguments of the dump command.
    pub fn dump_command(&self) -> Vec<&str> {
        let mut args = Vec::with_capacity(6);
        if self.sudo {
            args.push("sudo");
        }
        args.extend([
            "ovs-ofctl",
            "-O",
            self.protocol.as_str(),
            "dump-flows",
            self.bridge.as_str(),
        ]);
        args
    }
}

#[async_trait]
impl Switch for OvsSwitch {
    fn name(&self) -> &str {
        &self.bridge
    }

    async fn dump_flows(&self) -> Result<String, SwitchError> {
        Ok(self.host.execute_cmd_stdout(&self.dump_command()).await?)
    }
}

/// Error while reading the flow table.
#[derive(Debug, Error)]
pub enum SwitchError {
    /// The dump command failed.
    #[error("{0}")]
    Command(#[from] SshError),
    /// The dump cannot be parsed.
    #[error("Cannot parse the flow dump: {0}")]
    Dump(#[from] NormalizeError),
}
