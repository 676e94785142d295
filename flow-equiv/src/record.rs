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

//! The canonical record produced by every normalizer.

use std::{
    collections::{btree_map::Entry, BTreeMap},
    fmt,
};

use itertools::Itertools;
use serde::Serialize;

/// Value stored under a canonical key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Presence marker without a value, like `ip` in a switch dump or `<drop-action/>`.
    Flag,
    /// Lowercase text without any whitespace.
    Scalar(String),
    /// Nested structure.
    Record(CanonicalRecord),
    /// Repeated structural elements.
    Sequence(Vec<CanonicalRecord>),
}

impl Value {
    /// Get the scalar text, or `None` for all other kinds.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Returns `true` if the value is a presence marker.
    pub fn is_flag(&self) -> bool {
        matches!(self, Value::Flag)
    }

    /// View a structural value as a sequence of records. A single record is a sequence of
    /// length one. Scalars and flags return `None`.
    pub fn records(&self) -> Option<&[CanonicalRecord]> {
        match self {
            Value::Record(r) => Some(std::slice::from_ref(r)),
            Value::Sequence(s) => Some(s),
            Value::Flag | Value::Scalar(_) => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Scalar(s)
    }
}

impl From<CanonicalRecord> for Value {
    fn from(r: CanonicalRecord) -> Self {
        Value::Record(r)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Flag => f.write_str("<present>"),
            Value::Scalar(s) => f.write_str(s),
            Value::Record(r) => r.fmt(f),
            Value::Sequence(s) => write!(f, "[{}]", s.iter().join(", ")),
        }
    }
}

/// Mapping from canonical keys to values. Keys are kept sorted, so two records with the same
/// content always print the same.
///
/// Inserting a record under a key that already holds a record turns the value into a
/// [`Value::Sequence`]; once a key holds a sequence, further records are appended. A scalar is
/// never overwritten: the first value wins and the conflict is logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CanonicalRecord {
    fields: BTreeMap<String, Value>,
}

impl CanonicalRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, following the sequence rules described on [`CanonicalRecord`].
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        match self.fields.entry(key.into()) {
            Entry::Vacant(e) => {
                e.insert(value);
            }
            Entry::Occupied(mut e) => {
                let merged = match (e.insert(Value::Flag), value) {
                    (Value::Sequence(mut seq), Value::Record(r)) => {
                        seq.push(r);
                        Value::Sequence(seq)
                    }
                    (Value::Sequence(mut seq), Value::Sequence(more)) => {
                        seq.extend(more);
                        Value::Sequence(seq)
                    }
                    (Value::Record(first), Value::Record(r)) => Value::Sequence(vec![first, r]),
                    (Value::Record(first), Value::Sequence(more)) => {
                        Value::Sequence(std::iter::once(first).chain(more).collect())
                    }
                    (old, new) => {
                        if old != new {
                            log::warn!(
                                "[record] `{}` already holds {}, dropping {}",
                                e.key(),
                                old,
                                new
                            );
                        }
                        old
                    }
                };
                e.insert(merged);
            }
        }
    }

    /// Get the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get the scalar stored under `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Check if the key exists (with any kind of value).
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Remove a key and return its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Iterate over all keys and values, sorted by key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate over all keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of top-level keys.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the record has no keys.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Create a new record that only contains the given keys (those that exist).
    pub fn select<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Self {
        keys.into_iter()
            .filter_map(|k| self.get(k).map(|v| (k, v.clone())))
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for CanonicalRecord {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        let mut record = Self::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl<K: Into<String>> From<BTreeMap<K, Value>> for CanonicalRecord {
    fn from(map: BTreeMap<K, Value>) -> Self {
        map.into_iter().collect()
    }
}

impl fmt::Display for CanonicalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.fields
                .iter()
                .map(|(k, v)| match v {
                    Value::Flag => k.clone(),
                    v => format!("{k}: {v}"),
                })
                .join(", ")
        )
    }
}
