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

//! Advisory validation of a flat record against the field registry.
//!
//! Each [`FieldDescriptor`] describes one canonical key: its bit width, its value type, the base
//! in which it is written, and the prerequisites that must hold on the sibling fields (like
//! `tp_src` requires `nw_proto` to be 6, 17 or 132). Validation never aborts anything; it only
//! reports [`ValidationIssue`]s.

use std::net::Ipv6Addr;

use ipnet::Ipv4Net;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::{num, record::CanonicalRecord};

lazy_static! {
    static ref MAC_RE: Regex =
        Regex::new(r"^[0-9a-fA-F]{2}(:[0-9a-fA-F]{2}){5}$").expect("valid regex");
    static ref IPV4_RE: Regex =
        Regex::new(r"^([0-9]{1,3}\.){3}[0-9]{1,3}(/[0-9]{1,2})?$").expect("valid regex");
    static ref IPV6_RE: Regex =
        Regex::new(r"^[0-9a-fA-F]{0,4}(:[0-9a-fA-F]{0,4}){1,7}(/[0-9]{1,3})?$")
            .expect("valid regex");
    static ref GENERAL_FIELDS: Vec<FieldDescriptor> = vec![
        FieldDescriptor::integer("priority", 16),
        FieldDescriptor::integer("table", 8),
        FieldDescriptor::integer("idle_timeout", 16),
        FieldDescriptor::integer("hard_timeout", 16),
        FieldDescriptor::integer("cookie", 64).base(16),
        FieldDescriptor::integer("in_port", 32),
    ];
    static ref MATCH_FIELDS: Vec<FieldDescriptor> = {
        use ValueType::*;
        const IPV4: &[u128] = &[2048];
        const IP: &[u128] = &[2048, 34525];
        const IPV6: &[u128] = &[34525];
        const ARP: &[u128] = &[2054];
        const MPLS: &[u128] = &[34887, 34888];
        vec![
            FieldDescriptor::integer("in_phy_port", 32).requires_presence("in_port"),
            FieldDescriptor::integer("metadata", 64).base(16),
            FieldDescriptor::integer("metadata_mask", 64).base(16),
            FieldDescriptor::typed("dl_src", 48, Mac),
            FieldDescriptor::typed("dl_dst", 48, Mac),
            FieldDescriptor::integer("dl_type", 16),
            FieldDescriptor::integer("dl_vlan", 12),
            FieldDescriptor::integer("dl_vlan_pcp", 3).requires_presence("dl_vlan"),
            FieldDescriptor::integer("ip_dscp", 6).requires_any("dl_type", IP),
            FieldDescriptor::integer("nw_ecn", 2).requires_any("dl_type", IP),
            FieldDescriptor::integer("nw_proto", 8).requires_any("dl_type", IP),
            FieldDescriptor::typed("nw_src", 32, Ipv4).requires_any("dl_type", IPV4),
            FieldDescriptor::typed("nw_dst", 32, Ipv4).requires_any("dl_type", IPV4),
            FieldDescriptor::integer("tp_src", 16).requires_any("nw_proto", &[6, 17, 132]),
            FieldDescriptor::integer("tp_dst", 16).requires_any("nw_proto", &[6, 17, 132]),
            FieldDescriptor::integer("icmp_type", 8).requires_any("nw_proto", &[1]),
            FieldDescriptor::integer("icmp_code", 8).requires_any("nw_proto", &[1]),
            FieldDescriptor::integer("arp_op", 16).requires_any("dl_type", ARP),
            FieldDescriptor::typed("arp_spa", 32, Ipv4).requires_any("dl_type", ARP),
            FieldDescriptor::typed("arp_tpa", 32, Ipv4).requires_any("dl_type", ARP),
            FieldDescriptor::typed("arp_sha", 48, Mac).requires_any("dl_type", ARP),
            FieldDescriptor::typed("arp_tha", 48, Mac).requires_any("dl_type", ARP),
            FieldDescriptor::typed("ipv6_src", 128, Ipv6).requires_any("dl_type", IPV6),
            FieldDescriptor::typed("ipv6_dst", 128, Ipv6).requires_any("dl_type", IPV6),
            FieldDescriptor::integer("ipv6_label", 20).requires_any("dl_type", IPV6),
            FieldDescriptor::integer("icmpv6_type", 8).requires_any("nw_proto", &[58]),
            FieldDescriptor::integer("icmpv6_code", 8).requires_any("nw_proto", &[58]),
            FieldDescriptor::typed("nd_target", 128, Ipv6).requires_any("icmpv6_type", &[135, 136]),
            FieldDescriptor::typed("nd_sll", 48, Mac).requires_any("icmpv6_type", &[135]),
            FieldDescriptor::typed("nd_tll", 48, Mac).requires_any("icmpv6_type", &[136]),
            FieldDescriptor::integer("mpls_label", 20).requires_any("dl_type", MPLS),
            FieldDescriptor::integer("mpls_tc", 3).requires_any("dl_type", MPLS),
            FieldDescriptor::integer("mpls_bos", 1).requires_any("dl_type", MPLS),
            FieldDescriptor::integer("pbb_isid", 24).requires_any("dl_type", &[35047]),
            FieldDescriptor::integer("tun_id", 64).base(16),
            FieldDescriptor::integer("ipv6_exthdr", 9).requires_any("dl_type", IPV6),
        ]
    };
}

/// Type of the value of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValueType {
    /// Unsigned integer, limited by the bit width of the field.
    Integer,
    /// `true` or `false`
    Boolean,
    /// `aa:bb:cc:dd:ee:ff`
    Mac,
    /// Dotted quad, optionally with a prefix length.
    Ipv4,
    /// IPv6 address, optionally with a prefix length.
    Ipv6,
}

/// Values a prerequisite field may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allowed {
    /// The field must exist, its value does not matter.
    PresenceOnly,
    /// The field must have one of these values.
    Values(Vec<u128>),
}

/// Description of a single canonical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Canonical key
    pub key: &'static str,
    /// Maximum number of bits
    pub bits: Option<u32>,
    /// Type of the value
    pub value_type: ValueType,
    /// Base in which integers are written.
    pub base: u32,
    /// Conditions on sibling fields.
    pub prerequisites: Vec<(&'static str, Allowed)>,
}

impl FieldDescriptor {
    /// Decimal integer field of the given width.
    pub fn integer(key: &'static str, bits: u32) -> Self {
        Self::typed(key, bits, ValueType::Integer)
    }

    /// Field of the given type and width.
    pub fn typed(key: &'static str, bits: u32, value_type: ValueType) -> Self {
        Self {
            key,
            bits: Some(bits),
            value_type,
            base: 10,
            prerequisites: Vec::new(),
        }
    }

    /// Set the base in which integers are written.
    pub fn base(mut self, base: u32) -> Self {
        self.base = base;
        self
    }

    /// Require the field `key` to exist.
    pub fn requires_presence(mut self, key: &'static str) -> Self {
        self.prerequisites.push((key, Allowed::PresenceOnly));
        self
    }

    /// Require the field `key` to have one of the `values`.
    pub fn requires_any(mut self, key: &'static str, values: &[u128]) -> Self {
        self.prerequisites.push((key, Allowed::Values(values.to_vec())));
        self
    }

    /// Check the value of this field, and its prerequisites on the rest of the `record`.
    pub fn check(&self, value: &str, record: &CanonicalRecord) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        issues.extend(self.check_value(value));
        issues.extend(self.check_prerequisites(record));
        issues
    }

    fn check_value(&self, value: &str) -> Option<ValidationIssue> {
        let malformed = |expected: ValueType| ValidationIssue::Malformed {
            key: self.key.to_string(),
            value: value.to_string(),
            expected,
        };
        match self.value_type {
            ValueType::Integer => {
                let bits = self.bits?;
                let Some(n) = num::parse_int_radix(value, self.base) else {
                    return Some(ValidationIssue::Unparseable {
                        key: self.key.to_string(),
                        value: value.to_string(),
                        base: self.base,
                    });
                };
                (bits < 128 && n >> bits != 0).then(|| ValidationIssue::TooWide {
                    key: self.key.to_string(),
                    value: value.to_string(),
                    bits,
                })
            }
            ValueType::Boolean => {
                (!matches!(value, "true" | "false")).then(|| malformed(ValueType::Boolean))
            }
            ValueType::Mac => (!MAC_RE.is_match(value)).then(|| malformed(ValueType::Mac)),
            ValueType::Ipv4 => (!valid_ipv4(value)).then(|| malformed(ValueType::Ipv4)),
            ValueType::Ipv6 => (!valid_ipv6(value)).then(|| malformed(ValueType::Ipv6)),
        }
    }

    fn check_prerequisites(&self, record: &CanonicalRecord) -> Vec<ValidationIssue> {
        self.prerequisites
            .iter()
            .filter_map(|(key, allowed)| {
                let Some(value) = record.get(key) else {
                    return Some(ValidationIssue::MissingPrerequisite {
                        key: self.key.to_string(),
                        prerequisite: key.to_string(),
                    });
                };
                let Allowed::Values(values) = allowed else {
                    return None;
                };
                let found = value.as_str().unwrap_or_default();
                let n = num::parse_int_radix(found, self.base).or_else(|| num::parse_int(found));
                let ok = match n {
                    Some(n) => values.contains(&n),
                    None => values.iter().any(|v| v.to_string() == found),
                };
                (!ok).then(|| ValidationIssue::UnmetPrerequisite {
                    key: self.key.to_string(),
                    prerequisite: key.to_string(),
                    found: found.to_string(),
                    allowed: values.clone(),
                })
            })
            .collect()
    }
}

/// Check a dotted quad with an optional prefix length. Host bits beyond the prefix must be zero.
fn valid_ipv4(value: &str) -> bool {
    if !IPV4_RE.is_match(value) {
        return false;
    }
    let (addr, prefix) = match value.split_once('/') {
        Some((addr, prefix)) => (addr, prefix.parse::<u8>().ok()),
        None => (value, Some(32)),
    };
    if addr.split('.').any(|o| o.parse::<u8>().is_err()) {
        return false;
    }
    match prefix.filter(|p| *p <= 32) {
        Some(prefix) => match format!("{addr}/{prefix}").parse::<Ipv4Net>() {
            Ok(net) => net.trunc() == net,
            Err(_) => false,
        },
        None => false,
    }
}

/// Check an IPv6 address with an optional prefix length.
fn valid_ipv6(value: &str) -> bool {
    if !IPV6_RE.is_match(value) {
        return false;
    }
    let (addr, prefix) = match value.split_once('/') {
        Some((addr, prefix)) => (addr, prefix.parse::<u8>().ok()),
        None => (value, Some(128)),
    };
    prefix.map(|p| p <= 128).unwrap_or(false)
        && addr.matches("::").count() <= 1
        && addr.parse::<Ipv6Addr>().is_ok()
}

/// A single advisory finding.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ValidationIssue {
    /// The value is not an integer in the expected base.
    #[error("{key}: {value:?} is not an integer in base {base}")]
    Unparseable {
        /// Field
        key: String,
        /// Value found
        value: String,
        /// Expected base
        base: u32,
    },
    /// The value does not fit into the field.
    #[error("{key}: {value} does not fit into {bits} bits")]
    TooWide {
        /// Field
        key: String,
        /// Value found
        value: String,
        /// Width of the field
        bits: u32,
    },
    /// The value has the wrong format.
    #[error("{key}: {value:?} is not a valid {expected:?}")]
    Malformed {
        /// Field
        key: String,
        /// Value found
        value: String,
        /// Expected type
        expected: ValueType,
    },
    /// A prerequisite field is missing.
    #[error("{key} requires {prerequisite} to be set")]
    MissingPrerequisite {
        /// Field
        key: String,
        /// Missing field
        prerequisite: String,
    },
    /// A prerequisite field has a value that is not allowed.
    #[error("{key} requires {prerequisite} to be one of {allowed:?}, found {found}")]
    UnmetPrerequisite {
        /// Field
        key: String,
        /// Prerequisite field
        prerequisite: String,
        /// Value of the prerequisite field
        found: String,
        /// Allowed values
        allowed: Vec<u128>,
    },
    /// The field holds a structure instead of a scalar.
    #[error("{key} is not a scalar")]
    NotScalar {
        /// Field
        key: String,
    },
}

/// Result of validating a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Validation {
    issues: Vec<ValidationIssue>,
}

impl Validation {
    /// Returns `true` if there are no issues.
    pub fn ok(&self) -> bool {
        self.issues.is_empty()
    }

    /// All issues found.
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// Issues as human-readable messages.
    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }
}

/// Validate all fields of `record` that are described in `descriptors`. Keys without descriptor
/// are not checked. A flag (presence marker) is treated as valid.
pub fn validate(record: &CanonicalRecord, descriptors: &[FieldDescriptor]) -> Validation {
    let mut issues = Vec::new();
    for descriptor in descriptors {
        let found = match record.get(descriptor.key) {
            Some(value) => value,
            None => continue,
        };
        if found.is_flag() {
            continue;
        }
        match found.as_str() {
            Some(value) => issues.extend(descriptor.check(value, record)),
            None => issues.push(ValidationIssue::NotScalar {
                key: descriptor.key.to_string(),
            }),
        }
    }
    for issue in &issues {
        log::warn!("[validate] {issue}");
    }
    Validation { issues }
}

/// Validate a flat flow record against the general and the match fields.
pub fn validate_flow(record: &CanonicalRecord) -> Validation {
    let mut validation = validate(record, general_fields());
    validation.issues.extend(validate(record, match_fields()).issues);
    validation
}

/// Fields outside of the match block.
pub fn general_fields() -> &'static [FieldDescriptor] {
    &GENERAL_FIELDS
}

/// Match fields.
pub fn match_fields() -> &'static [FieldDescriptor] {
    &MATCH_FIELDS
}
