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

//! Normalizers turning XML trees and switch dumps into [`CanonicalRecord`]s.
//!
//! The tree normalizer comes in two shapes:
//!
//! - [`Normalizer::flat`] collects all leaves into a single record keyed by canonical names, as
//!   needed to compare against a switch dump. A leaf whose tag is unknown is keyed by the
//!   canonical name of its nearest known ancestor, such that wrappers like
//!   `<ethernet-type><type>2048</type></ethernet-type>` collapse into `dl_type: 2048`. Leaves
//!   without any known name are dropped. Ordered items (instructions and actions) are rendered
//!   into a single string stored under [`ACTIONS_KEY`].
//! - [`Normalizer::nested`] keeps the structure of the document, which is used to compare two XML
//!   documents with each other (the fixture and the config store).

use thiserror::Error;

use crate::{
    keywords::Keywords,
    record::{CanonicalRecord, Value},
    tree::XmlTree,
};

mod dump;
mod ordered;

pub use dump::{normalize_dump, normalize_dump_output};
pub use ordered::order_key;

/// Canonical key under which the rendered action list is stored.
pub const ACTIONS_KEY: &str = "actions";
/// Tag of the element that determines the position of an ordered item.
pub const ORDER_TAG: &str = "order";

/// Canonical keys whose decimal values are stored as hex.
const HEX_KEYS: [&str; 6] = [
    "cookie",
    "cookie_mask",
    "metadata",
    "metadata_mask",
    "tun_id",
    "tun_id_mask",
];

/// Which keyword dictionary is active while descending the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Namespace {
    /// General flow fields.
    #[default]
    Default,
    /// Inside a `<match>` block.
    Match,
    /// Inside an instruction or action block.
    Action,
}

impl Namespace {
    /// The namespace opened by an element with the given tag, or `None` if the tag keeps the
    /// current namespace.
    pub fn for_tag(tag: &str) -> Option<Self> {
        match tag {
            "match" => Some(Namespace::Match),
            "instructions" | "instruction" | "apply-actions" | "write-actions" | "actions"
            | "action" => Some(Namespace::Action),
            _ => None,
        }
    }
}

/// Tree normalizer, borrowing the keyword dictionaries.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'k> {
    keywords: &'k Keywords,
}

impl Default for Normalizer<'static> {
    fn default() -> Self {
        Self::new(Keywords::builtin())
    }
}

impl<'k> Normalizer<'k> {
    /// Create a normalizer using the given keywords.
    pub fn new(keywords: &'k Keywords) -> Self {
        Self { keywords }
    }

    /// The keywords used by this normalizer.
    pub fn keywords(&self) -> &'k Keywords {
        self.keywords
    }

    /// Parse an XML document and normalize it into a flat record.
    pub fn flat_xml(&self, xml: &str) -> Result<CanonicalRecord, NormalizeError> {
        Ok(self.flat(&XmlTree::parse(xml)?))
    }

    /// Parse an XML document and normalize it into a nested record.
    pub fn nested_xml(&self, xml: &str) -> Result<CanonicalRecord, NormalizeError> {
        Ok(self.nested(&XmlTree::parse(xml)?))
    }

    /// Normalize a switch dump line using the ignore set of this normalizer.
    pub fn dump(&self, line: &str) -> Result<CanonicalRecord, NormalizeError> {
        normalize_dump(line, &self.keywords.ignore)
    }

    /// Flat normalization of a tree.
    pub fn flat(&self, root: &XmlTree) -> CanonicalRecord {
        let mut record = CanonicalRecord::new();
        self.flat_into(root, Namespace::Default, None, &mut record);
        record
    }

    pub(crate) fn flat_into<'a>(
        &'a self,
        node: &XmlTree,
        namespace: Namespace,
        parent: Option<&'a str>,
        out: &mut CanonicalRecord,
    ) {
        let alias = self.keywords.dictionary(namespace).lookup(node.tag());
        if self.is_ignored(node.tag(), alias) {
            log::trace!("[normalize] ignoring <{}>", node.tag());
            return;
        }
        match node {
            XmlTree::Leaf { tag, text } => match alias.or(parent) {
                Some(key) => out.insert(key, leaf_value(key, text.as_deref())),
                None => log::trace!("[normalize] dropping unknown leaf <{tag}>"),
            },
            XmlTree::Branch { tag, children } => {
                let inner = Namespace::for_tag(tag).unwrap_or(namespace);
                let parent = alias.or(parent);
                let (items, fields): (Vec<&XmlTree>, Vec<&XmlTree>) =
                    children.iter().partition(|c| c.is_ordered_item());
                if !items.is_empty() {
                    out.insert(ACTIONS_KEY, Value::Scalar(self.render_items(items)));
                }
                for child in fields {
                    self.flat_into(child, inner, parent, out);
                }
            }
        }
    }

    /// Nested normalization of a tree. The children of the root form the top-level record.
    pub fn nested(&self, root: &XmlTree) -> CanonicalRecord {
        let mut record = CanonicalRecord::new();
        match root {
            XmlTree::Branch { tag, children } => {
                let namespace = Namespace::for_tag(tag).unwrap_or_default();
                for child in children {
                    self.nested_into(child, namespace, &mut record);
                }
            }
            leaf => self.nested_into(leaf, Namespace::Default, &mut record),
        }
        record
    }

    fn nested_into(&self, node: &XmlTree, namespace: Namespace, out: &mut CanonicalRecord) {
        let alias = self.keywords.dictionary(namespace).lookup(node.tag());
        if self.is_ignored(node.tag(), alias) {
            log::trace!("[normalize] ignoring <{}>", node.tag());
            return;
        }
        let key = alias.unwrap_or_else(|| node.tag());
        match node {
            XmlTree::Leaf { text, .. } => out.insert(key, leaf_value(key, text.as_deref())),
            XmlTree::Branch { tag, children } => {
                let inner = Namespace::for_tag(tag).unwrap_or(namespace);
                let mut record = CanonicalRecord::new();
                for child in children {
                    self.nested_into(child, inner, &mut record);
                }
                // a branch whose children were all ignored leaves no trace
                if !record.is_empty() {
                    out.insert(key, Value::Record(record));
                }
            }
        }
    }

    fn is_ignored(&self, tag: &str, alias: Option<&str>) -> bool {
        self.keywords.is_ignored(tag) || alias.map(|a| self.keywords.is_ignored(a)).unwrap_or(false)
    }
}

/// Remove all whitespace and lowercase.
pub fn squash(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Value of a leaf stored under `key`.
fn leaf_value(key: &str, text: Option<&str>) -> Value {
    match text.map(squash).filter(|t| !t.is_empty()) {
        Some(text) => Value::Scalar(convert_value(key, text)),
        None => Value::Flag,
    }
}

/// Apply the value conversion table.
fn convert_value(key: &str, value: String) -> String {
    if HEX_KEYS.contains(&key) {
        if let Ok(n) = value.parse::<u128>() {
            return format!("{n:#x}");
        }
    }
    value
}

/// Error while normalizing a document or a switch dump.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// Malformed XML
    #[error("XML: {0}")]
    Xml(#[from] roxmltree::Error),
    /// The document ends before the root element is closed.
    #[error("XML: <{0}> is not closed")]
    Unclosed(String),
    /// Switch dump line without content
    #[error("Empty switch dump line")]
    EmptyDumpLine,
    /// Switch dump line without `actions=`
    #[error("Switch dump line has no `actions=` field: {0}")]
    MissingActions(String),
    /// Token of the form `=value`
    #[error("Malformed switch dump token {0:?}")]
    MalformedToken(String),
}
