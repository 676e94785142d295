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

use crate::{
    keywords::Keywords,
    normalize::{normalize_dump_output, Normalizer},
    record::{CanonicalRecord, Value},
};

mod test_keywords;

pub(crate) const F1_XML: &str = include_str!("files/f1.xml");
pub(crate) const F1_DUMP: &str = include_str!("files/f1.dump");
pub(crate) const F2_XML: &str = include_str!("files/f2.xml");
pub(crate) const F2_DUMP: &str = include_str!("files/f2.dump");
pub(crate) const F3_XML: &str = include_str!("files/f3.xml");
pub(crate) const F3_DUMP: &str = include_str!("files/f3.dump");
pub(crate) const G1_XML: &str = include_str!("files/g1.xml");

pub(crate) fn normalizer() -> Normalizer<'static> {
    Normalizer::default()
}

/// Build a flat record from string pairs.
pub(crate) fn rec(fields: &[(&str, &str)]) -> CanonicalRecord {
    fields
        .iter()
        .map(|(k, v)| (*k, Value::from(*v)))
        .collect()
}

/// Parse a switch dump that contains a single flow.
pub(crate) fn single_flow(dump: &str) -> CanonicalRecord {
    let mut flows = normalize_dump_output(dump, &Keywords::builtin().ignore).unwrap();
    assert_eq!(flows.len(), 1);
    flows.pop().unwrap()
}
