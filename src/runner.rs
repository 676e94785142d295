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

//! The CRUD test case runner.
//!
//! A test case pushes a fixture to the controller and follows it through the system:
//!
//! 1. Validate the fixture (advisory).
//! 2. Create the resource with `PUT` (or with `POST` into its collection, or by calling the
//!    `add` procedure of the sal service).
//! 3. Read it back from the config store and compare it with the fixture. The sal service never
//!    writes into the config store, so there the resource must be absent.
//! 4. Read it from the operational store and compare it, skipping [`OPERATIONAL_EXCLUDED`].
//! 5. Find the flow in the flow table of the switch and compare it with the flat fixture.
//! 6. For `POST`, repeat the request and expect `409 Conflict`.
//! 7. Optionally update the resource and repeat steps 3 to 5.
//! 8. Delete (or remove) the resource and make sure that it disappears everywhere.
//!
//! The last step always runs, even if one of the earlier steps failed. Discrepancies do not abort
//! the test case; they are collected in the [`CaseReport`].
//!
//! Flows added through the sal service are stored in the operational store under keys generated
//! by the controller. They are found among all flows of their table by
//! [`OPERATIONAL_IDENTITY_KEYS`], see [`find_operational_flow`].

use std::{fmt, path::Path, time::Duration};

use clap::ValueEnum;
use flow_equiv::{
    compare::check_expiry, validate::validate_flow, CanonicalRecord, Comparator,
    ComparisonReport, Keywords, NormalizeError, Normalizer, Value,
};
use ovs_lab::{
    select_flow, Controller, RestError, RestResponse, Store, Switch, SwitchError,
};
use serde::Serialize;
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{
    config::ControllerConfig,
    fixture::{Fixture, FixtureError, ResourceKind, Rpc},
};

/// Keys that the operational store reports differently from what was requested, in addition to
/// the ignore set of the keywords.
pub const OPERATIONAL_EXCLUDED: [&str; 2] = ["in_port", "duration"];

/// Keys identifying a flow in the flow table of the switch.
pub const IDENTITY_KEYS: [&str; 3] = ["table", "priority", "cookie"];

/// Keys identifying a flow among the flows of a table in the operational store.
pub const OPERATIONAL_IDENTITY_KEYS: [&str; 3] = ["priority", "cookie", "match"];

/// Elements of an operational table that hold flows.
const OPERATIONAL_FLOW_TAGS: [&str; 2] = ["flow", "flow-statistics"];

/// How the resource is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CreateMethod {
    /// `PUT` to the resource path
    #[default]
    Put,
    /// `POST` to the collection path
    Post,
    /// Call the `add`, `update` and `remove` procedures of the sal service.
    Operations,
}

/// Options of the runner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// How resources are created
    pub method: CreateMethod,
    /// Also test an update of each resource.
    pub update: bool,
    /// Skip the flow table of the switch.
    pub skip_switch: bool,
    /// Time to wait after a write before reading the config store.
    pub config_delay: Duration,
    /// Time to wait after a write before reading the operational store or the switch.
    pub operational_delay: Duration,
}

impl RunOptions {
    /// Default options with the delays of the controller configuration.
    pub fn with_delays(config: &ControllerConfig) -> Self {
        Self {
            config_delay: config.config_delay(),
            operational_delay: config.operational_delay(),
            ..Default::default()
        }
    }
}

/// A comparison step of a test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Config store against the fixture
    Config,
    /// Operational store against the fixture
    Operational,
    /// Flow table against the fixture
    Switch,
    /// Config store against the updated fixture
    UpdatedConfig,
    /// Operational store against the updated fixture
    UpdatedOperational,
    /// Flow table against the updated fixture
    UpdatedSwitch,
}

impl Step {
    fn after_update(self) -> Self {
        match self {
            Step::Config => Step::UpdatedConfig,
            Step::Operational => Step::UpdatedOperational,
            Step::Switch => Step::UpdatedSwitch,
            s => s,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Config => "config store",
            Step::Operational => "operational store",
            Step::Switch => "switch",
            Step::UpdatedConfig => "config store (updated)",
            Step::UpdatedOperational => "operational store (updated)",
            Step::UpdatedSwitch => "switch (updated)",
        })
    }
}

/// The result of one comparison step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// What was compared
    pub step: Step,
    /// The comparison
    pub report: ComparisonReport,
}

/// Outcome of a test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseReport {
    /// Name of the fixture
    pub name: String,
    /// Kind of the resource
    pub kind: ResourceKind,
    /// The resource, like `flow 1 in table 2`.
    pub resource: String,
    /// Start of the test case (RFC 3339)
    pub timestamp: String,
    /// Whether the fixture passed the validation.
    pub xml_ok: bool,
    /// Validation messages
    pub validation: Vec<String>,
    /// All comparisons in the order they were made.
    pub steps: Vec<StepReport>,
    /// Whether the resource was removed from everywhere.
    pub removed: bool,
    /// Errors that aborted the test case.
    pub errors: Vec<String>,
}

impl CaseReport {
    fn new(fixture: &Fixture) -> Self {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        Self {
            name: fixture.name.clone(),
            kind: fixture.kind(),
            resource: fixture.id.to_string(),
            timestamp: now.format(&Rfc3339).unwrap_or_default(),
            xml_ok: true,
            validation: Vec::new(),
            steps: Vec::new(),
            removed: false,
            errors: Vec::new(),
        }
    }

    /// The comparison of a step, if it was made.
    pub fn step(&self, step: Step) -> Option<&ComparisonReport> {
        self.steps
            .iter()
            .find(|s| s.step == step)
            .map(|s| &s.report)
    }

    /// A test case passes if no error occurred, every comparison is equivalent and the resource
    /// was removed. Validation issues are not considered.
    pub fn passed(&self) -> bool {
        self.errors.is_empty() && self.removed && self.steps.iter().all(|s| s.report.is_equivalent())
    }
}

impl fmt::Display for CaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed() { "PASS" } else { "FAIL" };
        write!(f, "{verdict} {} ({})", self.name, self.resource)?;
        for message in &self.validation {
            write!(f, "\n  invalid: {message}")?;
        }
        for s in self.steps.iter().filter(|s| !s.report.is_equivalent()) {
            write!(f, "\n  {}: ", s.step)?;
            for line in s.report.to_string().lines() {
                write!(f, "\n    {line}")?;
            }
        }
        for error in &self.errors {
            write!(f, "\n  error: {error}")?;
        }
        if !self.removed {
            write!(f, "\n  the resource was not removed")?;
        }
        Ok(())
    }
}

/// Runs test cases against a controller and a switch.
pub struct Runner<'a> {
    controller: &'a dyn Controller,
    switch: &'a dyn Switch,
    normalizer: Normalizer<'a>,
    node: String,
    options: RunOptions,
}

impl fmt::Debug for Runner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("switch", &self.switch.name())
            .field("node", &self.node)
            .field("options", &self.options)
            .finish()
    }
}

impl<'a> Runner<'a> {
    /// Create a runner for the inventory node `node`, with default options.
    pub fn new(
        controller: &'a dyn Controller,
        switch: &'a dyn Switch,
        keywords: &'a Keywords,
        node: impl Into<String>,
    ) -> Self {
        Self {
            controller,
            switch,
            normalizer: Normalizer::new(keywords),
            node: node.into(),
            options: RunOptions::default(),
        }
    }

    /// Set the options.
    pub fn options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Run all fixtures in `dir`, see [`Fixture::discover`].
    pub async fn run_dir(
        &self,
        dir: impl AsRef<Path>,
        kinds: &[ResourceKind],
        numbers: &[u32],
    ) -> Result<Vec<CaseReport>, RunError> {
        let fixtures = Fixture::discover(dir, kinds, numbers)?;
        Ok(self.run_all(&fixtures).await)
    }

    /// Run the test cases one after the other.
    pub async fn run_all(&self, fixtures: &[Fixture]) -> Vec<CaseReport> {
        let mut reports = Vec::with_capacity(fixtures.len());
        for fixture in fixtures {
            let report = self.run_case(fixture).await;
            log::info!("[runner] {}", report);
            reports.push(report);
        }
        reports
    }

    /// Run a single test case.
    pub async fn run_case(&self, fixture: &Fixture) -> CaseReport {
        log::info!("[runner] {}: testing {}", fixture.name, fixture.id);
        let mut report = CaseReport::new(fixture);

        if fixture.kind() == ResourceKind::Flow {
            let validation = validate_flow(&self.normalizer.flat(&fixture.document.root));
            report.xml_ok = validation.ok();
            report.validation = validation.messages();
            for message in &report.validation {
                log::warn!("[runner] {}: {message}", fixture.name);
            }
        }

        let path = fixture.id.path(&self.node);
        if let Err(e) = self.lifecycle(fixture, &path, &mut report).await {
            log::error!("[runner] {}: {e}", fixture.name);
            report.errors.push(e.to_string());
        }
        match self.remove(fixture, &path).await {
            Ok(()) => report.removed = true,
            Err(e) => {
                log::error!("[runner] {}: {e}", fixture.name);
                report.errors.push(e.to_string());
            }
        }
        report
    }

    async fn lifecycle(
        &self,
        fixture: &Fixture,
        path: &str,
        report: &mut CaseReport,
    ) -> Result<(), RunError> {
        match self.options.method {
            CreateMethod::Put => {
                let response = self.controller.put(path, &fixture.xml).await?;
                expect_status("create", &response, RestResponse::is_success)?;
            }
            CreateMethod::Post => {
                let collection = fixture.id.collection_path(&self.node);
                let response = self.controller.post(&collection, &fixture.xml).await?;
                expect_status("create", &response, RestResponse::is_success)?;
            }
            CreateMethod::Operations => {
                let input = fixture.rpc_input(&self.node);
                self.invoke("create", fixture, Rpc::Add, &input).await?;
            }
        }
        self.check_all(fixture, path, false, report).await?;

        if self.options.method == CreateMethod::Post {
            let collection = fixture.id.collection_path(&self.node);
            let response = self.controller.post(&collection, &fixture.xml).await?;
            expect_status("repeated create", &response, RestResponse::is_conflict)?;
        }

        if self.options.update {
            match fixture.updated() {
                Some(updated) => {
                    if self.options.method == CreateMethod::Operations {
                        let input = fixture.rpc_update_input(&updated, &self.node);
                        self.invoke("update", fixture, Rpc::Update, &input).await?;
                    } else {
                        let response = self.controller.put(path, &updated.xml).await?;
                        expect_status("update", &response, RestResponse::is_success)?;
                    }
                    self.check_all(&updated, path, true, report).await?;
                }
                None => log::debug!("[runner] {}: nothing to update", fixture.name),
            }
        }
        Ok(())
    }

    /// Compare the config store, the operational store and the switch with the fixture.
    async fn check_all(
        &self,
        fixture: &Fixture,
        path: &str,
        updated: bool,
        report: &mut CaseReport,
    ) -> Result<(), RunError> {
        let mut push = |step: Step, comparison: ComparisonReport| {
            let step = if updated { step.after_update() } else { step };
            if !comparison.is_equivalent() {
                log::warn!("[runner] {}: {step} differs\n{comparison}", fixture.name);
            }
            report.steps.push(StepReport {
                step,
                report: comparison,
            });
        };

        if self.options.method == CreateMethod::Operations {
            self.check_config_absent("read config", path).await?;
        } else {
            push(Step::Config, self.check_config(fixture, path).await?);
        }
        push(Step::Operational, self.check_operational(fixture, path).await?);
        if self.checks_switch(fixture) {
            push(Step::Switch, self.check_switch(fixture).await?);
        }
        Ok(())
    }

    async fn check_config(&self, fixture: &Fixture, path: &str) -> Result<ComparisonReport, RunError> {
        tokio::time::sleep(self.options.config_delay).await;
        let response = self.controller.get(Store::Config, path).await?;
        expect_status("read config", &response, |r| r.status == 200)?;
        let expected = self.normalizer.nested(&fixture.document.root);
        let actual = self.normalizer.nested_xml(&response.body)?;
        Ok(Comparator::structural().report(&expected, &actual))
    }

    async fn check_operational(
        &self,
        fixture: &Fixture,
        path: &str,
    ) -> Result<ComparisonReport, RunError> {
        tokio::time::sleep(self.options.operational_delay).await;
        let expected = self.normalizer.nested(&fixture.document.root);
        let actual = if self.looks_up_table(fixture) {
            self.operational_flow(fixture, &expected)
                .await?
                .ok_or_else(|| RunError::Missing {
                    resource: fixture.id.to_string(),
                    place: "operational store",
                })?
        } else {
            let response = self.controller.get(Store::Operational, path).await?;
            expect_status("read operational", &response, |r| r.status == 200)?;
            self.normalizer.nested_xml(&response.body)?
        };
        Ok(operational_comparator().report(&expected, &actual))
    }

    /// Read the table of the flow from the operational store and find the flow in it.
    async fn operational_flow(
        &self,
        fixture: &Fixture,
        expected: &CanonicalRecord,
    ) -> Result<Option<CanonicalRecord>, RunError> {
        let table = fixture.id.collection_path(&self.node);
        let response = self.controller.get(Store::Operational, &table).await?;
        if response.is_not_found() {
            return Ok(None);
        }
        expect_status("read operational table", &response, |r| r.status == 200)?;
        let table = self.normalizer.nested_xml(&response.body)?;
        Ok(find_operational_flow(&table, expected).cloned())
    }

    async fn check_config_absent(&self, step: &'static str, path: &str) -> Result<(), RunError> {
        tokio::time::sleep(self.options.config_delay).await;
        let response = self.controller.get(Store::Config, path).await?;
        expect_status(step, &response, RestResponse::is_not_found)
    }

    async fn invoke(
        &self,
        step: &'static str,
        fixture: &Fixture,
        rpc: Rpc,
        input: &str,
    ) -> Result<(), RunError> {
        let operation = fixture.kind().operation(rpc);
        let response = self.controller.invoke(&operation, input).await?;
        expect_status(step, &response, RestResponse::is_success)?;
        log::debug!("[runner] {}: {operation} -> {}", fixture.name, response.status);
        Ok(())
    }

    async fn check_switch(&self, fixture: &Fixture) -> Result<ComparisonReport, RunError> {
        let expected = self.normalizer.flat(&fixture.document.root);
        let identity = expected.select(IDENTITY_KEYS);
        let flows = self.installed_flows().await?;
        let flow = select_flow(&flows, &identity)
            .ok_or_else(|| RunError::NotInstalled(identity.to_string()))?;
        let mut report = Comparator::switch().report(&expected, flow);
        report.discrepancies.extend(check_expiry(flow, &expected));
        Ok(report)
    }

    /// Delete the resource and make sure that it is gone.
    async fn remove(&self, fixture: &Fixture, path: &str) -> Result<(), RunError> {
        if self.options.method == CreateMethod::Operations {
            let input = fixture.rpc_input(&self.node);
            self.invoke("remove", fixture, Rpc::Remove, &input).await?;
        } else {
            let response = self.controller.delete(path).await?;
            expect_status("delete", &response, RestResponse::is_success)?;
        }
        self.check_config_absent("read deleted config", path).await?;

        tokio::time::sleep(self.options.operational_delay).await;
        let expected = self.normalizer.nested(&fixture.document.root);
        // any flow with the same identity counts, as it may have been updated
        let still_operational = if self.looks_up_table(fixture) {
            self.operational_flow(fixture, &expected).await?.is_some()
        } else {
            let response = self.controller.get(Store::Operational, path).await?;
            if response.is_not_found() {
                false
            } else {
                expect_status("read deleted operational", &response, |r| r.status == 200)?;
                let actual = self.normalizer.nested_xml(&response.body)?;
                operational_comparator().compare(&expected, &actual).is_empty()
            }
        };
        if still_operational {
            return Err(RunError::StillPresent {
                resource: fixture.id.to_string(),
                place: "operational store",
            });
        }

        if self.checks_switch(fixture) {
            let identity = self.normalizer.flat(&fixture.document.root).select(IDENTITY_KEYS);
            if select_flow(&self.installed_flows().await?, &identity).is_some() {
                return Err(RunError::StillPresent {
                    resource: fixture.id.to_string(),
                    place: "flow table",
                });
            }
        }
        log::debug!("[runner] {}: removed", fixture.name);
        Ok(())
    }

    async fn installed_flows(&self) -> Result<Vec<CanonicalRecord>, SwitchError> {
        self.switch
            .installed_flows(&self.normalizer.keywords().ignore)
            .await
    }

    fn checks_switch(&self, fixture: &Fixture) -> bool {
        !self.options.skip_switch && fixture.kind() == ResourceKind::Flow
    }

    fn looks_up_table(&self, fixture: &Fixture) -> bool {
        self.options.method == CreateMethod::Operations && fixture.kind() == ResourceKind::Flow
    }
}

/// Find the flow with the same [`OPERATIONAL_IDENTITY_KEYS`] as `expected` among the flows of an
/// operational table, normalized with [`Normalizer::nested`]. [`OPERATIONAL_EXCLUDED`] keys are
/// not part of the identity.
pub fn find_operational_flow<'t>(
    table: &'t CanonicalRecord,
    expected: &CanonicalRecord,
) -> Option<&'t CanonicalRecord> {
    let identity = expected.select(OPERATIONAL_IDENTITY_KEYS);
    let comparator = operational_comparator();
    OPERATIONAL_FLOW_TAGS
        .iter()
        .filter_map(|tag| table.get(tag))
        .filter_map(Value::records)
        .flatten()
        .find(|flow| {
            let candidate = flow.select(OPERATIONAL_IDENTITY_KEYS);
            comparator.compare(&identity, &candidate).is_empty()
                && comparator.compare(&candidate, &identity).is_empty()
        })
}

fn operational_comparator() -> Comparator {
    Comparator::structural().exclude(OPERATIONAL_EXCLUDED)
}

fn expect_status(
    step: &'static str,
    response: &RestResponse,
    expected: impl Fn(&RestResponse) -> bool,
) -> Result<(), RunError> {
    if expected(response) {
        Ok(())
    } else {
        Err(RunError::UnexpectedStatus {
            step,
            status: response.status,
        })
    }
}

/// Error that aborts a test case.
#[derive(Debug, Error)]
pub enum RunError {
    /// The controller cannot be reached.
    #[error("Controller: {0}")]
    Rest(#[from] RestError),
    /// The flow table cannot be read.
    #[error("Switch: {0}")]
    Switch(#[from] SwitchError),
    /// The response of the controller is not valid XML.
    #[error("Cannot parse the response: {0}")]
    Response(#[from] NormalizeError),
    /// The fixtures cannot be loaded.
    #[error("{0}")]
    Fixture(#[from] FixtureError),
    /// The controller answered with an unexpected status code.
    #[error("{step}: unexpected status {status}")]
    UnexpectedStatus {
        /// The request that failed
        step: &'static str,
        /// HTTP status code
        status: u16,
    },
    /// The resource cannot be found where it should be.
    #[error("{resource} is missing from the {place}")]
    Missing {
        /// The resource
        resource: String,
        /// Where it was searched
        place: &'static str,
    },
    /// No flow in the flow table matches the identity of the fixture.
    #[error("No flow with {0} is installed on the switch")]
    NotInstalled(String),
    /// The resource is still present after deleting it.
    #[error("{resource} is still present in the {place}")]
    StillPresent {
        /// The resource
        resource: String,
        /// Where it was found
        place: &'static str,
    },
}
