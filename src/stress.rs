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

//! Stress test: many workers creating flows concurrently.
//!
//! Each worker owns a disjoint range of flow ids (see [`id_range`]) and creates one flow per id
//! with `PUT`. Every request has its own timeout; a failed or timed-out request is counted as an
//! error and never retried. Workers keep their results locally and send a single
//! [`WorkerReport`] to the aggregating task once they are done.

use std::{
    collections::BTreeMap,
    fmt,
    future::Future,
    net::Ipv4Addr,
    ops::Range,
    sync::Arc,
    time::{Duration, Instant},
};

use flow_equiv::{XmlDocument, XmlTree};
use ipnet::Ipv4Net;
use ovs_lab::{Controller, RestError, RestResponse};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::fixture::ResourceId;

/// Namespace of flows in the inventory.
pub const FLOW_NAMESPACE: &str = "urn:opendaylight:flow:inventory";

/// Priority of generated flows.
const PRIORITY: u16 = 2;
/// Ethernet type of IPv4
const IPV4: u16 = 0x0800;

/// Options of the stress test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StressOptions {
    /// Number of concurrent workers
    pub workers: usize,
    /// Number of flows created by each worker
    pub flows_per_worker: u32,
    /// Table into which the flows are written
    pub table: u8,
    /// Timeout of each request
    pub timeout: Duration,
    /// Delete the created flows at the end.
    pub cleanup: bool,
}

impl Default for StressOptions {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            flows_per_worker: 100,
            table: 0,
            timeout: Duration::from_secs(30),
            cleanup: false,
        }
    }
}

/// Result of a single worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    /// Index of the worker
    pub worker: usize,
    /// Created flows: flow id to cookie
    pub created: BTreeMap<u32, String>,
    /// Failed or timed-out requests
    pub errors: usize,
    /// Number of flows deleted during the cleanup.
    pub deleted: usize,
}

/// Aggregated result of all workers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StressReport {
    /// Number of workers
    pub workers: usize,
    /// Number of flows that were attempted
    pub requested: u64,
    /// Created flows: flow id to cookie
    pub created: BTreeMap<u32, String>,
    /// Failed or timed-out requests
    pub errors: usize,
    /// Number of flows deleted during the cleanup.
    pub deleted: usize,
    /// Wall-clock time of the test
    pub elapsed_secs: f64,
}

impl StressReport {
    fn merge(&mut self, report: WorkerReport) {
        log::debug!(
            "[stress] worker {} created {} flows, {} errors",
            report.worker,
            report.created.len(),
            report.errors
        );
        for (id, cookie) in report.created {
            if self.created.insert(id, cookie).is_some() {
                log::error!("[stress] flow {id} was reported by more than one worker");
            }
        }
        self.errors += report.errors;
        self.deleted += report.deleted;
    }
}

impl fmt::Display for StressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} workers created {} of {} flows in {:.2}s ({} errors",
            self.workers,
            self.created.len(),
            self.requested,
            self.elapsed_secs,
            self.errors
        )?;
        if self.deleted > 0 {
            write!(f, ", {} deleted", self.deleted)?;
        }
        f.write_str(")")
    }
}

/// Flow ids owned by a worker. The ranges of different workers never overlap, and ids start at 1.
/// Returns `None` if the ids of the worker do not fit into a `u32`.
pub fn id_range(worker: usize, flows_per_worker: u32) -> Option<Range<u32>> {
    let start = u32::try_from(worker)
        .ok()?
        .checked_mul(flows_per_worker)?
        .checked_add(1)?;
    Some(start..start.checked_add(flows_per_worker)?)
}

/// Cookie of a generated flow, as printed by the switch.
pub fn cookie(id: u32) -> String {
    format!("{id:#x}")
}

/// Generate a flow that drops IPv4 traffic towards a host address derived from `id`.
pub fn flow_document(table: u8, id: u32) -> XmlDocument {
    let destination = Ipv4Net::from(Ipv4Addr::from(0x0a00_0000 | (id & 0x00ff_ffff)));
    let ethernet_match = XmlTree::branch(
        "ethernet-match",
        vec![XmlTree::branch(
            "ethernet-type",
            vec![XmlTree::leaf("type", IPV4.to_string())],
        )],
    );
    let instruction = XmlTree::branch(
        "instruction",
        vec![
            XmlTree::leaf("order", "0"),
            XmlTree::branch(
                "apply-actions",
                vec![XmlTree::branch(
                    "action",
                    vec![XmlTree::leaf("order", "0"), XmlTree::empty("drop-action")],
                )],
            ),
        ],
    );
    let root = XmlTree::branch(
        "flow",
        vec![
            XmlTree::leaf("id", id.to_string()),
            XmlTree::leaf("table_id", table.to_string()),
            XmlTree::leaf("priority", PRIORITY.to_string()),
            XmlTree::leaf("cookie", id.to_string()),
            XmlTree::leaf("flow-name", format!("stress-{id}")),
            XmlTree::branch(
                "match",
                vec![
                    ethernet_match,
                    XmlTree::leaf("ipv4-destination", destination.to_string()),
                ],
            ),
            XmlTree::branch("instructions", vec![instruction]),
        ],
    );
    XmlDocument {
        namespace: Some(FLOW_NAMESPACE.to_string()),
        root,
    }
}

/// Run the stress test against the inventory node `node`.
pub async fn run(
    controller: Arc<dyn Controller>,
    node: &str,
    options: &StressOptions,
) -> Result<StressReport, StressError> {
    let ranges = (0..options.workers)
        .map(|worker| id_range(worker, options.flows_per_worker))
        .collect::<Option<Vec<_>>>()
        .ok_or(StressError::TooManyFlows {
            workers: options.workers,
            flows_per_worker: options.flows_per_worker,
        })?;

    let start = Instant::now();
    let (report_tx, mut report_rx) = mpsc::channel::<WorkerReport>(options.workers.max(1));

    log::info!(
        "[stress] {} workers, {} flows each",
        options.workers,
        options.flows_per_worker
    );
    let mut workers = Vec::with_capacity(options.workers);
    for (worker_id, ids) in ranges.into_iter().enumerate() {
        let report_tx = report_tx.clone();
        let controller = controller.clone();
        let node = node.to_string();
        let options = options.clone();
        workers.push(tokio::task::spawn(async move {
            let report = worker(worker_id, ids, controller, node, options).await;
            if report_tx.send(report).await.is_err() {
                log::error!("[stress] worker {worker_id} cannot send its report");
            }
        }));
    }
    std::mem::drop(report_tx);

    let mut total = StressReport {
        workers: options.workers,
        requested: options.workers as u64 * options.flows_per_worker as u64,
        ..Default::default()
    };
    while let Some(report) = report_rx.recv().await {
        total.merge(report);
    }

    for worker in workers {
        worker.await?;
    }
    total.elapsed_secs = start.elapsed().as_secs_f64();
    log::info!("[stress] {total}");
    Ok(total)
}

async fn worker(
    worker: usize,
    ids: Range<u32>,
    controller: Arc<dyn Controller>,
    node: String,
    options: StressOptions,
) -> WorkerReport {
    let mut report = WorkerReport {
        worker,
        ..Default::default()
    };
    let table = options.table.to_string();
    let flow_path = |id: u32| {
        ResourceId::Flow {
            table: table.clone(),
            id: id.to_string(),
        }
        .path(&node)
    };

    for id in ids {
        let xml = flow_document(options.table, id).to_xml();
        let path = flow_path(id);
        if call(options.timeout, id, "create", controller.put(&path, &xml)).await {
            report.created.insert(id, cookie(id));
        } else {
            report.errors += 1;
        }
    }

    if options.cleanup {
        for id in report.created.keys() {
            let path = flow_path(*id);
            if call(options.timeout, *id, "delete", controller.delete(&path)).await {
                report.deleted += 1;
            } else {
                report.errors += 1;
            }
        }
    }
    report
}

/// Await a request with a timeout. Returns `true` if the request succeeded.
async fn call(
    timeout: Duration,
    id: u32,
    what: &str,
    request: impl Future<Output = Result<RestResponse, RestError>>,
) -> bool {
    match tokio::time::timeout(timeout, request).await {
        Ok(Ok(response)) if response.is_success() => true,
        Ok(Ok(response)) => {
            log::warn!("[stress] {what} flow {id}: status {}", response.status);
            false
        }
        Ok(Err(e)) => {
            log::warn!("[stress] {what} flow {id}: {e}");
            false
        }
        Err(_) => {
            log::warn!("[stress] {what} flow {id}: timed out after {timeout:?}");
            false
        }
    }
}

/// Error of the stress test.
#[derive(Debug, Error)]
pub enum StressError {
    /// A worker panicked or was cancelled.
    #[error("Worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    /// The flow ids of all workers do not fit into 32 bits.
    #[error("{workers} workers with {flows_per_worker} flows each exceed the flow id space")]
    TooManyFlows {
        /// Number of workers
        workers: usize,
        /// Flows per worker
        flows_per_worker: u32,
    },
}
