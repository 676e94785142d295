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

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use flow_equiv::{validate::validate_flow, Normalizer};
use maplit::btreeset;
use ovs_lab::Controller;
use pretty_assertions::assert_eq;

use super::*;
use crate::stress::{self, cookie, flow_document, id_range, StressError, StressOptions};

fn options(workers: usize, flows_per_worker: u32) -> StressOptions {
    StressOptions {
        workers,
        flows_per_worker,
        table: 0,
        timeout: Duration::from_secs(5),
        cleanup: false,
    }
}

#[test]
fn disjoint_ranges() {
    assert_eq!(id_range(0, 25), Some(1..26));
    assert_eq!(id_range(3, 25), Some(76..101));

    let mut seen = BTreeSet::new();
    for worker in 0..4 {
        for id in id_range(worker, 25).unwrap() {
            assert!(seen.insert(id), "flow {id} is owned by two workers");
        }
    }
    assert_eq!(seen, (1..=100).collect::<BTreeSet<u32>>());
}

#[test]
fn ranges_beyond_u32() {
    assert_eq!(id_range(1, u32::MAX / 2), Some(u32::MAX / 2 + 1..u32::MAX));
    assert_eq!(id_range(2, u32::MAX / 2), None);
    assert_eq!(id_range(0, u32::MAX), None);
}

#[tokio::test]
async fn too_many_flows() {
    let controller = Arc::new(MockController::default());
    let shared: Arc<dyn Controller> = controller.clone();
    let result = stress::run(shared, NODE, &options(3, u32::MAX / 2)).await;

    assert!(matches!(
        result,
        Err(StressError::TooManyFlows { workers: 3, .. })
    ));
    assert!(controller.requests().is_empty());
}

#[test]
fn generated_flow() {
    let document = flow_document(3, 258);
    let flow = Normalizer::default().flat(&document.root);
    assert_eq!(flow.get_str("table"), Some("3"));
    assert_eq!(flow.get_str("priority"), Some("2"));
    assert_eq!(flow.get_str("cookie"), Some(cookie(258).as_str()));
    assert_eq!(flow.get_str("dl_type"), Some("2048"));
    assert_eq!(flow.get_str("nw_dst"), Some("10.0.1.2/32"));
    assert_eq!(flow.get_str("actions"), Some("drop"));
    assert!(validate_flow(&flow).ok());

    // the generated text is a valid fixture
    let parsed = fixture("stress", &document.to_xml());
    assert_eq!(parsed.id.path(NODE), "opendaylight-inventory:nodes/node/openflow:1/table/3/flow/258");
}

#[tokio::test]
async fn all_created() {
    let controller = Arc::new(MockController::default());
    let shared: Arc<dyn Controller> = controller.clone();
    let report = stress::run(shared, NODE, &options(4, 5)).await.unwrap();

    assert_eq!(report.workers, 4);
    assert_eq!(report.requested, 20);
    assert_eq!(report.errors, 0);
    assert_eq!(report.created.keys().copied().collect::<Vec<_>>(), (1..=20).collect::<Vec<_>>());
    assert_eq!(report.created[&10], "0xa");
    assert_eq!(controller.stored(), 20);
}

#[tokio::test]
async fn failures_are_counted() {
    let flow = |id: u32| format!("opendaylight-inventory:nodes/node/openflow:1/table/0/flow/{id}");
    let controller = Arc::new(MockController::default().failing(flow(3)).failing(flow(7)));
    let shared: Arc<dyn Controller> = controller.clone();
    let report = stress::run(shared, NODE, &options(2, 5)).await.unwrap();

    assert_eq!(report.errors, 2);
    assert_eq!(
        report.created.keys().copied().collect::<BTreeSet<u32>>(),
        btreeset! {1, 2, 4, 5, 6, 8, 9, 10}
    );
    assert_eq!(report.to_string().split(" in ").next(), Some("2 workers created 8 of 10 flows"));
}

#[tokio::test]
async fn timeouts_are_counted() {
    let controller = Arc::new(MockController::default().delay(Duration::from_millis(200)));
    let shared: Arc<dyn Controller> = controller.clone();
    let options = StressOptions {
        timeout: Duration::from_millis(20),
        ..options(2, 2)
    };
    let report = stress::run(shared, NODE, &options).await.unwrap();

    assert_eq!(report.errors, 4);
    assert!(report.created.is_empty());
    assert_eq!(controller.stored(), 0);
}

#[tokio::test]
async fn cleanup() {
    let controller = Arc::new(MockController::default());
    let shared: Arc<dyn Controller> = controller.clone();
    let options = StressOptions {
        cleanup: true,
        ..options(3, 4)
    };
    let report = stress::run(shared, NODE, &options).await.unwrap();

    assert_eq!(report.created.len(), 12);
    assert_eq!(report.deleted, 12);
    assert_eq!(report.errors, 0);
    assert_eq!(controller.stored(), 0);
    let deletes = controller
        .requests()
        .into_iter()
        .filter(|r| r.starts_with("DELETE"))
        .count();
    assert_eq!(deletes, 12);
}
