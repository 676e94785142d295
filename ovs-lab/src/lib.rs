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

//! This library connects the test runner to the systems under test: the OpenDaylight controller,
//! reached over its RESTCONF interface, and the Open vSwitch bridge, whose flow table is read with
//! `ovs-ofctl dump-flows`.
//!
//! # Configuration
//!
//! The switch usually runs inside a Mininet VM. If the bridge is not on the local machine, the
//! commands are executed over SSH. Make sure that the SSH host name matches your `~/.ssh/config`
//! file, and that `ssh $hostname` establishes a session without asking for a password. Commands
//! reuse a single control master located at `/tmp/.ssh-%r@%h:%p`.
//!
//! # Seams
//!
//! The runner only talks to the [`Controller`] and [`Switch`] traits. [`RestconfClient`] and
//! [`OvsSwitch`] are the implementations talking to the real systems.

#![deny(missing_docs, missing_debug_implementations)]

pub mod restconf;
pub mod ssh;
pub mod switch;

#[cfg(test)]
mod test;

pub use restconf::{Controller, RestError, RestResponse, RestconfClient, Store};
pub use ssh::{Host, SshError, SshSession};
pub use switch::{select_flow, OvsSwitch, Switch, SwitchError};
