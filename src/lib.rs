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

//! # OfCheck: Semantic checks of OpenFlow controller configurations
//!
//! OfCheck tests the configuration interface of an OpenFlow controller (RESTCONF, using the
//! `opendaylight-inventory:nodes` model) against the flow table of an Open vSwitch bridge. Each
//! test case takes an XML fixture describing a flow, group or meter, pushes it to the controller,
//! and checks that the controller stores it faithfully, that it reaches the switch with the same
//! semantics, and that it disappears everywhere once deleted.
//!
//! ## Structure
//! - The crate [`flow_equiv`] contains the semantic core: normalizing XML documents and switch
//!   dumps into canonical records, comparing them, and validating fixture fields.
//! - The crate [`ovs_lab`] contains the access to the external systems: the RESTCONF client
//!   ([`ovs_lab::Controller`]) and the switch ([`ovs_lab::Switch`]), locally or over SSH.
//! - The module [`runner`] drives a test case through its steps and collects a
//!   [`runner::CaseReport`].
//! - The module [`fixture`] loads the XML fixtures and derives the resource paths.
//! - The module [`stress`] creates many flows concurrently.
//! - The module [`config`] reads the TOML configuration.

#![deny(missing_docs, missing_debug_implementations, rust_2018_idioms)]

pub mod config;
pub mod fixture;
pub mod runner;
pub mod stress;

#[cfg(test)]
mod test;

pub use config::{Config, ConfigError};
pub use fixture::{Fixture, FixtureError, ResourceId, ResourceKind, Rpc};
pub use runner::{CaseReport, CreateMethod, RunError, RunOptions, Runner, Step};
pub use stress::{StressError, StressOptions, StressReport};
