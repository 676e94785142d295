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

use std::{collections::HashSet, time::Duration};

use async_trait::async_trait;
use flow_equiv::{CanonicalRecord, Keywords, Value};
use maplit::btreemap;

use crate::{
    restconf::{RestconfClient, RestResponse, Store},
    ssh::{Host, SshError},
    switch::{select_flow, OvsSwitch, Switch, SwitchError},
};

use pretty_assertions::assert_eq;

const DUMP: &str = "OFPST_FLOW reply (OF1.3) (xid=0x2):
 cookie=0x1, duration=30.5s, table=0, n_packets=0, n_bytes=0, priority=1 actions=drop
 cookie=0xa, duration=3.434s, table=2, n_packets=0, n_bytes=0, priority=2,mpls actions=dec_mpls_ttl,drop
 cookie=0xb, duration=12s, table=2, n_packets=0, n_bytes=0, priority=2,ip actions=dec_ttl
";

struct StaticSwitch(&'static str);

#[async_trait]
impl Switch for StaticSwitch {
    fn name(&self) -> &str {
        "static"
    }

    async fn dump_flows(&self) -> Result<String, SwitchError> {
        Ok(self.0.to_string())
    }
}

#[tokio::test]
async fn installed_flows_newest_first() {
    let _ = pretty_env_logger::formatted_builder()
        .is_test(true)
        .try_init();

    let flows = StaticSwitch(DUMP)
        .installed_flows(&Keywords::builtin().ignore)
        .await
        .unwrap();
    let cookies: Vec<_> = flows.iter().filter_map(|f| f.get_str("cookie")).collect();
    assert_eq!(cookies, vec!["0xa", "0xb", "0x1"]);
}

#[tokio::test]
async fn installed_flows_bad_dump() {
    let result = StaticSwitch("priority=1\n").installed_flows(&HashSet::new()).await;
    assert!(matches!(result, Err(SwitchError::Dump(_))));
}

#[tokio::test]
async fn select_by_identity() {
    let flows = StaticSwitch(DUMP)
        .installed_flows(&Keywords::builtin().ignore)
        .await
        .unwrap();
    let identity = CanonicalRecord::from(btreemap! {
        "table" => Value::from("2"),
        "priority" => Value::from("2"),
        "cookie" => Value::from("11"),
    });
    let flow = select_flow(&flows, &identity).unwrap();
    assert_eq!(flow.get_str("actions"), Some("dec_ttl"));

    let mut identity = CanonicalRecord::from(btreemap! { "table" => Value::from("2") });
    identity.insert("mpls", Value::Flag);
    let flow = select_flow(&flows, &identity).unwrap();
    assert_eq!(flow.get_str("cookie"), Some("0xa"));

    let missing = CanonicalRecord::from(btreemap! { "table" => Value::from("7") });
    assert_eq!(select_flow(&flows, &missing), None);
}

#[test]
fn dump_command() {
    let switch = OvsSwitch::new(Host::Local, "s1");
    assert_eq!(
        switch.dump_command(),
        vec!["ovs-ofctl", "-O", "OpenFlow13", "dump-flows", "s1"]
    );
    let switch = OvsSwitch::new(Host::Local, "br0").protocol("OpenFlow10").sudo(true);
    assert_eq!(
        switch.dump_command(),
        vec!["sudo", "ovs-ofctl", "-O", "OpenFlow10", "dump-flows", "br0"]
    );
    assert_eq!(switch.name(), "br0");
}

#[tokio::test]
async fn local_host() {
    let host = Host::Local;
    assert_eq!(host.execute_cmd_stdout(&["echo", "hi"]).await.unwrap(), "hi\n");
    assert!(matches!(
        host.execute_cmd(&["false"]).await,
        Err(SshError::CommandError(_, _, 1))
    ));
    assert!(matches!(
        host.execute_cmd(&[] as &[&str]).await,
        Err(SshError::EmptyCommand)
    ));
}

#[test]
fn restconf_urls() {
    let client =
        RestconfClient::new("10.0.0.5", 8181, "admin", "admin", Duration::from_secs(5)).unwrap();
    assert_eq!(
        client.url(Store::Config, "opendaylight-inventory:nodes/node/openflow:1/table/2/flow/1"),
        "http://10.0.0.5:8181/restconf/config/opendaylight-inventory:nodes/node/openflow:1/table/2/flow/1"
    );
    assert_eq!(
        client.url(Store::Operational, "/opendaylight-inventory:nodes"),
        "http://10.0.0.5:8181/restconf/operational/opendaylight-inventory:nodes"
    );
    assert_eq!(
        client.operation_url("sal-flow:add-flow"),
        "http://10.0.0.5:8181/restconf/operations/sal-flow:add-flow"
    );
}

#[test]
fn response_status() {
    assert!(RestResponse::new(200, "").is_success());
    assert!(RestResponse::new(204, "").is_success());
    assert!(!RestResponse::new(404, "").is_success());
    assert!(RestResponse::new(404, "").is_not_found());
    assert!(RestResponse::new(409, "").is_conflict());
}
