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

#![deny(missing_docs, missing_debug_implementations)]

//! # Flow Equivalence
//!
//! This library decides whether two independently produced descriptions of an OpenFlow rule
//! describe the same rule. One description is an XML document as it is stored by the controller
//! (the fixture, or the config / operational store), the other is a single line printed by
//! `ovs-ofctl dump-flows`.
//!
//! Both sides are turned into a [`CanonicalRecord`], a small tree keyed by canonical field names.
//! The translation from XML tag names to canonical names is driven by the [`Keywords`]
//! dictionaries, one per namespace ([`Namespace`]).
//!
//! - [`normalize`] contains the three normalizers: [`Normalizer::flat`] and
//!   [`Normalizer::nested`] for XML trees, [`Normalizer::ordered`] for ordered instruction and
//!   action lists, and [`normalize::normalize_dump`] for switch dumps.
//! - [`compare`] contains the [`Comparator`], which collects every [`Discrepancy`] between an
//!   expected and an actual record. In switch mode, it knows that the switch encodes the ethernet
//!   type and the ip protocol by distinct field names.
//! - [`validate`] checks a flat record against a registry of [`FieldDescriptor`]s (bit widths,
//!   value types and prerequisites). Validation is advisory.
//!
//! ```
//! use flow_equiv::{normalize::normalize_dump, Comparator, Keywords, Normalizer};
//!
//! let keywords = Keywords::builtin();
//! let normalizer = Normalizer::new(keywords);
//! let expected = normalizer
//!     .flat_xml("<flow><priority>2</priority><cookie>10</cookie></flow>")
//!     .unwrap();
//! let actual = normalize_dump(
//!     "cookie=0xa, duration=3.4s, table=0, priority=2 actions=drop",
//!     &keywords.ignore,
//! )
//! .unwrap();
//! assert!(Comparator::switch().compare(&expected, &actual).is_empty());
//! ```

pub mod compare;
pub mod keywords;
pub mod normalize;
mod num;
pub mod record;
pub mod tree;
pub mod validate;

#[cfg(test)]
mod test;

pub use compare::{Comparator, ComparisonReport, Discrepancy, Observed};
pub use keywords::{KeywordDictionary, KeywordError, Keywords};
pub use normalize::{Namespace, NormalizeError, Normalizer};
pub use record::{CanonicalRecord, Value};
pub use tree::{XmlDocument, XmlTree};
pub use validate::{FieldDescriptor, Validation, ValidationIssue};
