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

//! Parser for the output of `ovs-ofctl dump-flows`.
//!
//! A flow is printed on a single line:
//!
//! ```text
//!  cookie=0xa, duration=3.434s, table=1, n_packets=0, n_bytes=0, priority=2,ip,nw_dst=10.0.0.0/24 actions=dec_mpls_ttl,drop
//! ```

use std::collections::HashSet;

use itertools::Itertools;

use super::{squash, NormalizeError, ACTIONS_KEY};
use crate::{
    num,
    record::{CanonicalRecord, Value},
};

const ACTIONS_FIELD: &str = "actions=";

/// Prefixes of the header lines printed before the flows.
const HEADER_PREFIXES: [&str; 2] = ["OFPST_", "NXST_"];

/// Normalize a single flow line. Keys in `ignore` are dropped. The action list is stored under
/// [`ACTIONS_KEY`], with the actions separated by `", "`.
pub fn normalize_dump(
    line: &str,
    ignore: &HashSet<String>,
) -> Result<CanonicalRecord, NormalizeError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(NormalizeError::EmptyDumpLine);
    }
    let (fields, actions) =
        split_actions(line).ok_or_else(|| NormalizeError::MissingActions(line.to_string()))?;

    let mut record = CanonicalRecord::new();
    for token in fields
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
    {
        let (key, value) = match token.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (token, None),
        };
        if key.is_empty() {
            return Err(NormalizeError::MalformedToken(token.to_string()));
        }
        let key = key.to_lowercase();
        if ignore.contains(&key) {
            continue;
        }
        let value = match value {
            Some(value) => Value::Scalar(strip_unit(value)),
            None => Value::Flag,
        };
        record.insert(key, value);
    }
    record.insert(ACTIONS_KEY, Value::Scalar(normalize_actions(actions)));

    Ok(record)
}

/// Normalize the complete output of `ovs-ofctl dump-flows`, skipping the reply header and empty
/// lines.
pub fn normalize_dump_output(
    output: &str,
    ignore: &HashSet<String>,
) -> Result<Vec<CanonicalRecord>, NormalizeError> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !HEADER_PREFIXES.iter().any(|p| line.starts_with(p)))
        .map(|line| normalize_dump(line, ignore))
        .collect()
}

/// Split the line at the `actions=` field. The field must start the line or follow a whitespace
/// or a comma, such that keys like `write_actions=` are not mistaken for it.
fn split_actions(line: &str) -> Option<(&str, &str)> {
    line.match_indices(ACTIONS_FIELD)
        .find(|(i, _)| {
            line[..*i]
                .chars()
                .last()
                .map(|c| c.is_whitespace() || c == ',')
                .unwrap_or(true)
        })
        .map(|(i, field)| (&line[..i], &line[i + field.len()..]))
}

/// Split the action list on commas that are not enclosed in parentheses, and join the actions
/// with `", "`.
fn normalize_actions(actions: &str) -> String {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in actions.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&actions[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&actions[start..]);
    parts
        .into_iter()
        .map(squash)
        .filter(|a| !a.is_empty())
        .join(", ")
}

/// Lowercase a value, remove trailing commas and the unit of durations (`3.434s`).
fn strip_unit(value: &str) -> String {
    let value = value.trim_end_matches(',').to_lowercase();
    match value.strip_suffix('s') {
        Some(number) if num::parse_seconds(number).is_some() => number.to_string(),
        _ => value,
    }
}
