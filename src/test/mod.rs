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

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use flow_equiv::{XmlDocument, XmlTree};
use ovs_lab::{Controller, RestError, RestResponse, Store, Switch, SwitchError};

use crate::fixture::{Fixture, ResourceId};

mod test_fixture;
mod test_stress;

const F1_XML: &str = include_str!("files/f1.xml");
const F2_XML: &str = include_str!("files/f2.xml");
const F4_XML: &str = include_str!("files/f4.xml");
const G1_XML: &str = include_str!("files/g1.xml");
const M1_XML: &str = include_str!("files/m1.xml");

const NODE: &str = "openflow:1";
const DUMP_HEADER: &str = "OFPST_FLOW reply (OF1.3) (xid=0x2):";

const FLOW_NAMESPACE: &str = "urn:opendaylight:flow:inventory";

fn fixture(name: &str, xml: &str) -> Fixture {
    Fixture::parse(name, xml).unwrap()
}

/// Path under which the mock controller stores a flow added through `sal-flow:add-flow`.
fn rpc_flow_path(table: &str, priority: &str) -> String {
    ResourceId::Flow {
        table: table.to_string(),
        id: format!("#UF$TABLE*{table}-{priority}"),
    }
    .path(NODE)
}

/// Flow table of a bridge, keyed by the resource path that installed the flow.
#[derive(Debug, Default)]
struct MockSwitch {
    flows: Mutex<BTreeMap<String, String>>,
}

impl MockSwitch {
    fn install(&self, path: &str, line: &str) {
        self.flows
            .lock()
            .unwrap()
            .insert(path.to_string(), line.to_string());
    }

    fn uninstall(&self, path: &str) {
        self.flows.lock().unwrap().remove(path);
    }

    fn len(&self) -> usize {
        self.flows.lock().unwrap().len()
    }
}

#[async_trait]
impl Switch for MockSwitch {
    fn name(&self) -> &str {
        "mock"
    }

    async fn dump_flows(&self) -> Result<String, SwitchError> {
        let flows = self.flows.lock().unwrap();
        let mut dump = String::from(DUMP_HEADER);
        for line in flows.values() {
            dump.push('\n');
            dump.push_str(line);
        }
        Ok(dump)
    }
}

/// In-memory controller. Writes to the config store are mirrored into the operational store, and
/// the dump line registered for a path is installed on the switch. The `n`-th write of a path
/// installs its `n`-th registered line (or the last one). Flows added through the sal service
/// only reach the operational store, under [`rpc_flow_path`]. Reading a table that has no
/// document of its own returns all operational flows in it.
#[derive(Debug, Default)]
struct MockController {
    config: Mutex<HashMap<String, String>>,
    operational: Mutex<HashMap<String, String>>,
    writes: Mutex<HashMap<String, usize>>,
    requests: Mutex<Vec<String>>,
    switch: MockSwitch,
    dumps: HashMap<String, Vec<String>>,
    rewrite: Option<(String, String)>,
    failing: HashSet<String>,
    keep_installed: bool,
    delay: Duration,
}

impl MockController {
    fn with_dump(mut self, path: impl Into<String>, line: impl Into<String>) -> Self {
        self.dumps.entry(path.into()).or_default().push(line.into());
        self
    }

    /// Store every document with `from` replaced by `to`.
    fn rewrite(mut self, from: &str, to: &str) -> Self {
        self.rewrite = Some((from.to_string(), to.to_string()));
        self
    }

    /// Answer writes of `path` with `500`.
    fn failing(mut self, path: impl Into<String>) -> Self {
        self.failing.insert(path.into());
        self
    }

    /// Do not remove flows from the switch when deleting them.
    fn keep_installed(mut self) -> Self {
        self.keep_installed = true;
        self
    }

    fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn stored(&self) -> usize {
        self.config.lock().unwrap().len()
    }

    fn log(&self, method: &str, path: &str) {
        self.requests.lock().unwrap().push(format!("{method} {path}"));
    }

    fn rewritten(&self, body: &str) -> String {
        match &self.rewrite {
            Some((from, to)) => body.replace(from, to),
            None => body.to_string(),
        }
    }

    fn store(&self, path: &str, body: &str) {
        let body = self.rewritten(body);
        self.config
            .lock()
            .unwrap()
            .insert(path.to_string(), body.clone());
        self.publish(path, body);
    }

    /// Write into the operational store and install the registered dump line.
    fn publish(&self, path: &str, body: String) {
        self.operational
            .lock()
            .unwrap()
            .insert(path.to_string(), body);

        let n = {
            let mut writes = self.writes.lock().unwrap();
            let n = writes.entry(path.to_string()).or_default();
            *n += 1;
            *n
        };
        if let Some(lines) = self.dumps.get(path) {
            let line = &lines[(n - 1).min(lines.len() - 1)];
            self.switch.install(path, line);
        }
    }

    /// All operational flows of the table at `path`.
    fn operational_table(&self, path: &str) -> Option<String> {
        let prefix = format!("{path}/flow/");
        let operational = self.operational.lock().unwrap();
        let mut flows: Vec<(&String, &String)> = operational
            .iter()
            .filter(|(p, _)| p.starts_with(&prefix))
            .collect();
        if flows.is_empty() {
            return None;
        }
        flows.sort();
        let id = path.rsplit('/').next().unwrap_or_default();
        let mut table = format!("<table xmlns=\"{FLOW_NAMESPACE}\">\n<id>{id}</id>\n");
        for (_, body) in flows {
            let body = match body.find("?>") {
                Some(i) => &body[i + 2..],
                None => body.as_str(),
            };
            table.push_str(body.trim());
            table.push('\n');
        }
        table.push_str("</table>\n");
        Some(table)
    }
}

#[async_trait]
impl Controller for MockController {
    async fn put(&self, path: &str, body: &str) -> Result<RestResponse, RestError> {
        tokio::time::sleep(self.delay).await;
        self.log("PUT", path);
        if self.failing.contains(path) {
            return Ok(RestResponse::new(500, ""));
        }
        self.store(path, body);
        Ok(RestResponse::new(200, ""))
    }

    async fn post(&self, path: &str, body: &str) -> Result<RestResponse, RestError> {
        tokio::time::sleep(self.delay).await;
        self.log("POST", path);
        let Ok(fixture) = Fixture::parse("post", body) else {
            return Ok(RestResponse::new(400, ""));
        };
        if fixture.id.collection_path(NODE) != path {
            return Ok(RestResponse::new(400, ""));
        }
        let resource = fixture.id.path(NODE);
        if self.config.lock().unwrap().contains_key(&resource) {
            return Ok(RestResponse::new(409, ""));
        }
        self.store(&resource, body);
        Ok(RestResponse::new(204, ""))
    }

    async fn get(&self, store: Store, path: &str) -> Result<RestResponse, RestError> {
        self.log("GET", &format!("{store}/{path}"));
        let documents = match store {
            Store::Config => &self.config,
            Store::Operational => &self.operational,
        };
        if let Some(body) = documents.lock().unwrap().get(path) {
            return Ok(RestResponse::new(200, body.clone()));
        }
        Ok(match store {
            Store::Operational => match self.operational_table(path) {
                Some(table) => RestResponse::new(200, table),
                None => RestResponse::new(404, ""),
            },
            Store::Config => RestResponse::new(404, ""),
        })
    }

    async fn delete(&self, path: &str) -> Result<RestResponse, RestError> {
        tokio::time::sleep(self.delay).await;
        self.log("DELETE", path);
        if self.config.lock().unwrap().remove(path).is_none() {
            return Ok(RestResponse::new(404, ""));
        }
        self.operational.lock().unwrap().remove(path);
        if !self.keep_installed {
            self.switch.uninstall(path);
        }
        Ok(RestResponse::new(200, ""))
    }

    async fn invoke(&self, operation: &str, body: &str) -> Result<RestResponse, RestError> {
        tokio::time::sleep(self.delay).await;
        self.log("POST", &format!("operations/{operation}"));
        let Ok(input) = XmlDocument::parse(body) else {
            return Ok(RestResponse::new(400, ""));
        };
        let flow = match operation {
            "sal-flow:add-flow" | "sal-flow:remove-flow" => Some(&input.root),
            "sal-flow:update-flow" => input.root.child("updated-flow"),
            _ => None,
        };
        let Some(flow) = flow else {
            return Ok(RestResponse::new(400, ""));
        };
        let (Some(table), Some(priority)) = (flow.find_text("table_id"), flow.find_text("priority"))
        else {
            return Ok(RestResponse::new(400, ""));
        };
        let path = rpc_flow_path(table, priority);

        if operation == "sal-flow:remove-flow" {
            self.operational.lock().unwrap().remove(&path);
            if !self.keep_installed {
                self.switch.uninstall(&path);
            }
        } else {
            let id = path.rsplit('/').next().unwrap_or_default();
            let children = flow
                .children()
                .iter()
                .filter(|c| c.tag() != "node")
                .cloned()
                .chain(std::iter::once(XmlTree::leaf("id", id)))
                .collect();
            let document = XmlDocument {
                namespace: Some(FLOW_NAMESPACE.to_string()),
                root: XmlTree::branch("flow", children),
            };
            self.publish(&path, self.rewritten(&document.to_xml()));
        }
        Ok(RestResponse::new(
            200,
            "<output><transaction-id>1</transaction-id></output>",
        ))
    }
}
