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

//! Equivalence check between two canonical records.
//!
//! Every key of the expected record must exist in the actual record with an equivalent value.
//! Keys that only exist in the actual record are fine. Sequences are aligned by their
//! [`order_key`] before they are compared item by item.
//!
//! Scalars are equivalent if they are equal strings, equal integers (decimal or hex), or the same
//! IP network. All scalars are lowercase already, so the comparison does not care about case.
//!
//! In [`Mode::Switch`], the comparator additionally applies the [`ProtocolRule`]s: the switch
//! prints an ethernet type of 2048 as `ip` (or `tcp`, `udp`, ...), and an ip protocol of 6 as
//! `tcp`, instead of printing the numbers.

use std::{cmp::Ordering, collections::HashSet, fmt, net::IpAddr};

use ipnet::IpNet;
use itertools::{EitherOrBoth, Itertools};
use serde::Serialize;

use crate::{
    normalize::ORDER_TAG,
    num,
    record::{CanonicalRecord, Value},
};

/// Text printed for a key that does not exist.
pub const KEY_NOT_FOUND: &str = "KEY_NOT_FOUND";
/// Elapsed time since the flow was installed.
pub const DURATION_KEY: &str = "duration";
/// Lifetime of the flow.
pub const HARD_TIMEOUT_KEY: &str = "hard_timeout";
/// Suffix of the key holding the mask of a masked field.
const MASK_SUFFIX: &str = "_mask";

/// What was observed on one side of a discrepancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Observed {
    /// The value found at the path.
    Value(Value),
    /// A requirement imposed by a rule, like `one of ip, tcp, udp`.
    Requirement(String),
    /// The key does not exist.
    Missing,
}

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observed::Value(v) => v.fmt(f),
            Observed::Requirement(r) => f.write_str(r),
            Observed::Missing => f.write_str(KEY_NOT_FOUND),
        }
    }
}

/// A single difference between the expected and the actual record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    /// Path of the key, like `match.dl_type` or `action[1].order`.
    pub path: String,
    /// Expected side
    pub expected: Observed,
    /// Actual side
    pub actual: Observed,
}

impl Discrepancy {
    fn new(path: impl Into<String>, expected: Observed, actual: Observed) -> Self {
        Self {
            path: path.into(),
            expected,
            actual,
        }
    }

    fn values(path: impl Into<String>, expected: &Value, actual: Option<&Value>) -> Self {
        Self::new(
            path,
            Observed::Value(expected.clone()),
            actual.cloned().map(Observed::Value).unwrap_or(Observed::Missing),
        )
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}, found {}",
            self.path, self.expected, self.actual
        )
    }
}

/// Which rules the comparator applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Tree against tree (fixture against the config or operational store).
    #[default]
    Structural,
    /// XML against a switch dump, applying the [`ProtocolRule`]s and masked values.
    Switch,
}

/// Rule comparing a field that the switch encodes differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolRule {
    /// A well-known value is printed as a presence marker. If the expected value appears in the
    /// table, one of the listed markers must exist on the actual side.
    Demux(&'static [(u128, &'static [&'static str])]),
    /// The value is printed under another key, multiplied by a factor.
    Scaled {
        /// Key on the actual side
        key: &'static str,
        /// Factor applied to the expected value
        factor: u128,
    },
}

/// Presence markers printed by the switch instead of `dl_type`.
pub const ETHERNET_TYPES: &[(u128, &[&str])] = &[
    (2048, &["ip", "tcp", "udp", "icmp", "sctp"]),
    (2054, &["arp"]),
    (34887, &["mpls"]),
    (34888, &["mplsm"]),
    (34525, &["ipv6", "tcp6", "udp6", "icmp6", "sctp6"]),
];

/// Presence markers printed by the switch instead of `nw_proto`.
pub const IP_PROTOCOLS: &[(u128, &[&str])] = &[
    (1, &["icmp", "icmp6"]),
    (6, &["tcp", "tcp6"]),
    (17, &["udp", "udp6"]),
    (58, &["icmp6"]),
    (132, &["sctp", "sctp6"]),
];

impl ProtocolRule {
    /// Get the rule for a canonical key.
    pub fn for_key(key: &str) -> Option<Self> {
        match key {
            "dl_type" => Some(ProtocolRule::Demux(ETHERNET_TYPES)),
            "nw_proto" => Some(ProtocolRule::Demux(IP_PROTOCOLS)),
            // OVS prints the DSCP bits as part of the ToS byte
            "ip_dscp" => Some(ProtocolRule::Scaled {
                key: "nw_tos",
                factor: 4,
            }),
            _ => None,
        }
    }

    /// Check the rule. A literal match of the same key always satisfies the rule.
    fn check(
        &self,
        path: &str,
        key: &str,
        expected: &Value,
        actual: &CanonicalRecord,
    ) -> Option<Discrepancy> {
        let literal = actual.get(key);
        if literal.map(|a| values_equivalent(expected, a)).unwrap_or(false) {
            return None;
        }
        let expected_num = expected.as_str().and_then(num::parse_int);
        match self {
            ProtocolRule::Demux(table) => {
                let markers = expected_num
                    .and_then(|n| table.iter().find(|(value, _)| *value == n))
                    .map(|(_, markers)| *markers);
                match markers {
                    Some(markers) if markers.iter().any(|m| actual.contains_key(m)) => None,
                    Some(markers) => Some(Discrepancy::new(
                        path,
                        Observed::Requirement(format!("one of {}", markers.join(", "))),
                        literal.cloned().map(Observed::Value).unwrap_or(Observed::Missing),
                    )),
                    None => Some(Discrepancy::values(path, expected, literal)),
                }
            }
            ProtocolRule::Scaled { key: alt, factor } => {
                let scaled = expected_num.and_then(|n| n.checked_mul(*factor));
                let found = actual.get_str(alt).and_then(num::parse_int);
                match (scaled, found) {
                    (Some(s), Some(f)) if s == f => None,
                    (Some(s), _) => Some(Discrepancy::new(
                        path,
                        Observed::Requirement(format!("{alt}={s}")),
                        actual
                            .get(alt)
                            .or(literal)
                            .cloned()
                            .map(Observed::Value)
                            .unwrap_or(Observed::Missing),
                    )),
                    (None, _) => Some(Discrepancy::values(path, expected, literal)),
                }
            }
        }
    }
}

/// Comparator between an expected and an actual record.
#[derive(Debug, Clone, Default)]
pub struct Comparator {
    mode: Mode,
    excluded: HashSet<String>,
}

impl Comparator {
    /// Comparator for two trees.
    pub fn structural() -> Self {
        Self::default()
    }

    /// Comparator for a tree against a switch dump.
    pub fn switch() -> Self {
        Self {
            mode: Mode::Switch,
            ..Default::default()
        }
    }

    /// Skip the given keys (at any depth).
    pub fn exclude<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded.extend(keys.into_iter().map(Into::into));
        self
    }

    /// The mode of the comparator.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Collect all discrepancies between `expected` and `actual`.
    pub fn compare(&self, expected: &CanonicalRecord, actual: &CanonicalRecord) -> Vec<Discrepancy> {
        let mut out = Vec::new();
        self.compare_records("", expected, actual, &mut out);
        out
    }

    /// Compare and keep both records in the report.
    pub fn report(&self, expected: &CanonicalRecord, actual: &CanonicalRecord) -> ComparisonReport {
        ComparisonReport {
            discrepancies: self.compare(expected, actual),
            expected: expected.clone(),
            actual: actual.clone(),
        }
    }

    fn compare_records(
        &self,
        prefix: &str,
        expected: &CanonicalRecord,
        actual: &CanonicalRecord,
        out: &mut Vec<Discrepancy>,
    ) {
        for (key, exp) in expected.iter() {
            if self.excluded.contains(key) {
                continue;
            }
            let path = join_path(prefix, key);

            if key == DURATION_KEY {
                out.extend(duration_rule(&path, exp, actual));
                continue;
            }

            if self.mode == Mode::Switch {
                if let Some(rule) = ProtocolRule::for_key(key) {
                    out.extend(rule.check(&path, key, exp, actual));
                    continue;
                }
                if let Some(base) = key.strip_suffix(MASK_SUFFIX) {
                    if let Some((_, mask)) = actual.get_str(base).and_then(|v| v.split_once('/')) {
                        if !exp.as_str().map(|e| scalars_equivalent(e, mask)).unwrap_or(false) {
                            out.push(Discrepancy::values(path, exp, Some(&Value::from(mask))));
                        }
                    }
                    // an unmasked value on the switch means that the mask has all bits set
                    continue;
                }
            }

            match actual.get(key) {
                None => out.push(Discrepancy::values(path, exp, None)),
                Some(act) => self.compare_values(&path, exp, act, out),
            }
        }
    }

    fn compare_values(&self, path: &str, expected: &Value, actual: &Value, out: &mut Vec<Discrepancy>) {
        match (expected, actual) {
            (Value::Record(e), Value::Record(a)) => self.compare_records(path, e, a, out),
            (Value::Record(_) | Value::Sequence(_), Value::Record(_) | Value::Sequence(_)) => {
                let (e, a) = (expected.records(), actual.records());
                self.compare_sequences(path, e.unwrap_or(&[]), a.unwrap_or(&[]), out)
            }
            (Value::Scalar(e), Value::Scalar(a)) => {
                let equal = scalars_equivalent(e, a)
                    || (self.mode == Mode::Switch && masked_equivalent(e, a));
                if !equal {
                    out.push(Discrepancy::values(path, expected, Some(actual)));
                }
            }
            (Value::Flag, Value::Flag) => {}
            _ => out.push(Discrepancy::values(path, expected, Some(actual))),
        }
    }

    fn compare_sequences(
        &self,
        path: &str,
        expected: &[CanonicalRecord],
        actual: &[CanonicalRecord],
        out: &mut Vec<Discrepancy>,
    ) {
        let expected = sorted_by_order_key(expected);
        let actual = sorted_by_order_key(actual);
        for (i, pair) in expected.into_iter().zip_longest(actual).enumerate() {
            let item_path = format!("{path}[{i}]");
            match pair {
                EitherOrBoth::Both(e, a) => self.compare_records(&item_path, e, a, out),
                EitherOrBoth::Left(e) => out.push(Discrepancy::new(
                    item_path,
                    Observed::Value(Value::Record(e.clone())),
                    Observed::Missing,
                )),
                EitherOrBoth::Right(a) => out.push(Discrepancy::new(
                    item_path,
                    Observed::Missing,
                    Observed::Value(Value::Record(a.clone())),
                )),
            }
        }
    }
}

/// Check that a flow that was installed `duration` seconds ago is still alive, i.e., that the
/// `hard_timeout` of the actual record is at least the `duration` of the expected record. A
/// hard timeout of 0 never expires. Returns `None` if `expected` has no duration.
pub fn check_duration(expected: &CanonicalRecord, actual: &CanonicalRecord) -> Option<Discrepancy> {
    duration_rule(DURATION_KEY, expected.get(DURATION_KEY)?, actual)
}

/// Check that an installed flow was not removed by the hard timeout requested in `expected`.
/// A flow requested without `hard_timeout` never expires and passes, like a hard timeout of 0.
pub fn check_expiry(
    installed: &CanonicalRecord,
    expected: &CanonicalRecord,
) -> Option<Discrepancy> {
    if !expected.contains_key(HARD_TIMEOUT_KEY) {
        return None;
    }
    check_duration(installed, expected)
}

fn duration_rule(path: &str, duration: &Value, actual: &CanonicalRecord) -> Option<Discrepancy> {
    let requirement = Observed::Requirement(format!("{HARD_TIMEOUT_KEY} >= {duration}"));
    let Some(timeout) = actual.get(HARD_TIMEOUT_KEY) else {
        return Some(Discrepancy::new(path, requirement, Observed::Missing));
    };
    let elapsed = duration.as_str().and_then(num::parse_seconds);
    match (elapsed, timeout.as_str().and_then(num::parse_seconds)) {
        (_, Some(t)) if t == 0.0 => None,
        (Some(e), Some(t)) if e <= t => None,
        _ => Some(Discrepancy::new(
            path,
            requirement,
            Observed::Value(timeout.clone()),
        )),
    }
}

/// Sort key discovery for an item of a sequence: the value of the `order` key if present,
/// otherwise the value of the first key (in sorted order) that is named `id` or ends with `-id`
/// or `_id`. Only scalar values are considered.
pub fn order_key(record: &CanonicalRecord) -> Option<(&str, &str)> {
    if let Some(order) = record.get_str(ORDER_TAG) {
        return Some((ORDER_TAG, order));
    }
    record
        .iter()
        .filter(|(key, _)| *key == "id" || key.ends_with("-id") || key.ends_with("_id"))
        .find_map(|(key, value)| value.as_str().map(|v| (key, v)))
}

/// Sort items by their order key. Items without a key go last; the sort is stable.
fn sorted_by_order_key(items: &[CanonicalRecord]) -> Vec<&CanonicalRecord> {
    items
        .iter()
        .sorted_by(|a, b| match (order_key(a), order_key(b)) {
            (Some((_, x)), Some((_, y))) => num::natural_cmp(x, y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .collect()
}

fn values_equivalent(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Scalar(e), Value::Scalar(a)) => scalars_equivalent(e, a),
        (e, a) => e == a,
    }
}

/// Two scalars are equivalent if they are the same string, the same integer or the same IP
/// network.
pub fn scalars_equivalent(expected: &str, actual: &str) -> bool {
    if expected == actual {
        return true;
    }
    if let (Some(e), Some(a)) = (num::parse_int(expected), num::parse_int(actual)) {
        return e == a;
    }
    if let (Some(e), Some(a)) = (parse_net(expected), parse_net(actual)) {
        return e == a;
    }
    false
}

/// The switch prints masked fields as `value/mask`. Compare only the value part.
fn masked_equivalent(expected: &str, actual: &str) -> bool {
    match actual.split_once('/') {
        Some((value, _)) if !expected.contains('/') => scalars_equivalent(expected, value),
        _ => false,
    }
}

/// Parse an IP network, treating a plain address as a host route. Host bits are cleared.
fn parse_net(s: &str) -> Option<IpNet> {
    s.parse::<IpNet>()
        .ok()
        .or_else(|| s.parse::<IpAddr>().ok().map(IpNet::from))
        .map(|net| net.trunc())
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Result of comparing two records, keeping both sides for the error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonReport {
    /// Expected record
    pub expected: CanonicalRecord,
    /// Actual record
    pub actual: CanonicalRecord,
    /// All discrepancies
    pub discrepancies: Vec<Discrepancy>,
}

impl ComparisonReport {
    /// Returns `true` if there is no discrepancy.
    pub fn is_equivalent(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_equivalent() {
            return f.write_str("equivalent");
        }
        writeln!(f, "{} discrepancies:", self.discrepancies.len())?;
        for d in &self.discrepancies {
            writeln!(f, "  {d}")?;
        }
        writeln!(f, "expected: {}", self.expected)?;
        write!(f, "actual:   {}", self.actual)
    }
}
