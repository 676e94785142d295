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

//! Keyword dictionaries that map XML tag names onto canonical keys.
//!
//! Each dictionary is stored in a file with one `tag;canonical_key` pair per line. Lines starting
//! with `#` are comments. The ignore file lists one key per line (a second column is allowed and
//! ignored).

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use lazy_static::lazy_static;
use thiserror::Error;

use crate::normalize::Namespace;

/// File name of the general dictionary.
pub const GENERAL_FILE: &str = "keywords.csv";
/// File name of the match dictionary.
pub const MATCH_FILE: &str = "match-keywords.csv";
/// File name of the action dictionary.
pub const ACTION_FILE: &str = "action-keywords.csv";
/// File name of the ignore set.
pub const IGNORE_FILE: &str = "ignore-keywords.csv";

lazy_static! {
    static ref BUILTIN: Keywords = Keywords::from_tables(
        include_str!("../keywords/keywords.csv"),
        include_str!("../keywords/match-keywords.csv"),
        include_str!("../keywords/action-keywords.csv"),
        include_str!("../keywords/ignore-keywords.csv"),
    )
    .unwrap_or_else(|e| panic!("The built-in keyword tables are malformed: {e}"));
}

/// Mapping from XML tag names to canonical keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordDictionary {
    entries: HashMap<String, String>,
}

impl KeywordDictionary {
    /// Parse a `tag;canonical_key` table.
    pub fn parse(input: &str) -> Result<Self, KeywordError> {
        let mut entries = HashMap::new();
        for (line_no, line) in table_lines(input) {
            match line.split_once(';') {
                Some((tag, key)) if !tag.trim().is_empty() && !key.trim().is_empty() => {
                    let (tag, key) = (tag.trim(), key.trim());
                    if let Some(old) = entries.insert(tag.to_string(), key.to_string()) {
                        log::debug!("[keywords] line {line_no}: `{tag}` redefined ({old} -> {key})");
                    }
                }
                _ => return Err(KeywordError::MalformedLine(line_no, line.to_string())),
            }
        }
        Ok(Self { entries })
    }

    /// Resolve a tag to its canonical key.
    pub fn lookup(&self, tag: &str) -> Option<&str> {
        self.entries.get(tag).map(String::as_str)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the dictionary has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Into<String>, K: Into<String>> FromIterator<(T, K)> for KeywordDictionary {
    fn from_iter<I: IntoIterator<Item = (T, K)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(t, k)| (t.into(), k.into())).collect(),
        }
    }
}

/// The three keyword dictionaries and the ignore set. Read-only once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keywords {
    /// Fields outside of any match or action block.
    pub general: KeywordDictionary,
    /// Fields inside a `<match>` block.
    pub matches: KeywordDictionary,
    /// Actions and instructions.
    pub actions: KeywordDictionary,
    /// Tags and canonical keys that are dropped during normalization.
    pub ignore: HashSet<String>,
}

impl Keywords {
    /// The compiled-in tables, using the naming of Open vSwitch with OpenFlow 1.3.
    pub fn builtin() -> &'static Keywords {
        &BUILTIN
    }

    /// Parse the four tables from strings.
    pub fn from_tables(
        general: &str,
        matches: &str,
        actions: &str,
        ignore: &str,
    ) -> Result<Self, KeywordError> {
        Ok(Self {
            general: KeywordDictionary::parse(general)?,
            matches: KeywordDictionary::parse(matches)?,
            actions: KeywordDictionary::parse(actions)?,
            ignore: parse_ignore(ignore),
        })
    }

    /// Load the tables from a directory containing [`GENERAL_FILE`], [`MATCH_FILE`],
    /// [`ACTION_FILE`] and [`IGNORE_FILE`].
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, KeywordError> {
        let dir = dir.as_ref();
        let read = |name: &str| {
            let path = dir.join(name);
            std::fs::read_to_string(&path).map_err(|e| {
                log::error!("[keywords] Cannot read {}: {e}", path.display());
                KeywordError::Io(path, e)
            })
        };
        let keywords = Self::from_tables(
            &read(GENERAL_FILE)?,
            &read(MATCH_FILE)?,
            &read(ACTION_FILE)?,
            &read(IGNORE_FILE)?,
        )?;
        log::debug!(
            "[keywords] loaded {} general, {} match and {} action keywords, ignoring {} keys",
            keywords.general.len(),
            keywords.matches.len(),
            keywords.actions.len(),
            keywords.ignore.len()
        );
        Ok(keywords)
    }

    /// Get the dictionary of a namespace.
    pub fn dictionary(&self, namespace: Namespace) -> &KeywordDictionary {
        match namespace {
            Namespace::Default => &self.general,
            Namespace::Match => &self.matches,
            Namespace::Action => &self.actions,
        }
    }

    /// Check if a tag or canonical key is in the ignore set.
    pub fn is_ignored(&self, key: &str) -> bool {
        self.ignore.contains(key)
    }
}

/// Parse an ignore table. Only the first column is used.
fn parse_ignore(input: &str) -> HashSet<String> {
    table_lines(input)
        .filter_map(|(_, line)| line.split(';').next())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(String::from)
        .collect()
}

/// Iterate over all non-empty, non-comment lines with their (1-based) line number.
fn table_lines(input: &str) -> impl Iterator<Item = (usize, &str)> {
    input
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// Error while loading keyword tables.
#[derive(Debug, Error)]
pub enum KeywordError {
    /// Cannot read a table file.
    #[error("Cannot read keyword table {0}: {1}")]
    Io(PathBuf, std::io::Error),
    /// A line is not of the form `tag;canonical_key`.
    #[error("Malformed keyword line {0}: {1:?}")]
    MalformedLine(usize, String),
}
