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

//! XML fixtures: the resources that are pushed to the controller.
//!
//! A fixture directory contains files named `f<N>.xml` (flows), `g<N>.xml` (groups) and `m<N>.xml`
//! (meters). The resource id is read from the document itself.
//!
//! Besides the stores, a fixture can be sent to the remote procedures of the sal services
//! (`sal-flow:add-flow`, ...). Their `<input>` carries the fields of the resource and a reference
//! to the inventory node, see [`Fixture::rpc_input`].

use std::{
    fmt,
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use flow_equiv::{normalize::ORDER_TAG, NormalizeError, XmlDocument, XmlTree};
use serde::Serialize;
use thiserror::Error;

/// Root of the inventory in both stores.
pub const NODES: &str = "opendaylight-inventory:nodes";

const DROP_ACTION: &str = "drop-action";
const DEC_MPLS_TTL: &str = "dec-mpls-ttl";
const METER_RATE_TAGS: [&str; 2] = ["band-rate", "drop-rate"];
/// Key of a flow in the config store. The sal service generates its own.
const FLOW_KEY_TAG: &str = "id";
const INVENTORY_NAMESPACE: &str = "urn:opendaylight:inventory";

/// Kind of resource described by a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A flow entry, `f<N>.xml`
    Flow,
    /// A group entry, `g<N>.xml`
    Group,
    /// A meter entry, `m<N>.xml`
    Meter,
}

impl ResourceKind {
    /// All kinds
    pub const ALL: [ResourceKind; 3] = [ResourceKind::Flow, ResourceKind::Group, ResourceKind::Meter];

    /// First letter of the fixture file name.
    pub fn prefix(&self) -> char {
        match self {
            ResourceKind::Flow => 'f',
            ResourceKind::Group => 'g',
            ResourceKind::Meter => 'm',
        }
    }

    /// Tag of the root element.
    pub fn tag(&self) -> &'static str {
        match self {
            ResourceKind::Flow => "flow",
            ResourceKind::Group => "group",
            ResourceKind::Meter => "meter",
        }
    }

    /// Namespace of the `<input>` of the sal service managing this kind.
    pub fn service_namespace(&self) -> &'static str {
        match self {
            ResourceKind::Flow => "urn:opendaylight:flow:service",
            ResourceKind::Group => "urn:opendaylight:group:service",
            ResourceKind::Meter => "urn:opendaylight:meter:service",
        }
    }

    /// Name of a remote procedure, like `sal-flow:add-flow`.
    pub fn operation(&self, rpc: Rpc) -> String {
        let tag = self.tag();
        format!("sal-{tag}:{}-{tag}", rpc.verb())
    }

    fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }
}

/// Remote procedures of the sal services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rpc {
    /// Install the resource on the switch
    Add,
    /// Replace the resource on the switch
    Update,
    /// Remove the resource from the switch
    Remove,
}

impl Rpc {
    fn verb(&self) -> &'static str {
        match self {
            Rpc::Add => "add",
            Rpc::Update => "update",
            Rpc::Remove => "remove",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Identifier of a resource in the inventory of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ResourceId {
    /// Flow `id` in table `table`
    Flow {
        /// Table id
        table: String,
        /// Flow id
        id: String,
    },
    /// Group id
    Group(String),
    /// Meter id
    Meter(String),
}

impl ResourceId {
    /// Read the identifier from the document.
    pub fn from_tree(root: &XmlTree) -> Result<Self, FixtureError> {
        let kind = ResourceKind::from_tag(root.tag())
            .ok_or_else(|| FixtureError::UnknownRoot(root.tag().to_string()))?;
        let text = |tag: &'static str| {
            root.find_text(tag)
                .map(String::from)
                .ok_or(FixtureError::MissingId(kind, tag))
        };
        Ok(match kind {
            ResourceKind::Flow => ResourceId::Flow {
                table: text("table_id")?,
                id: text("id")?,
            },
            ResourceKind::Group => ResourceId::Group(text("group-id")?),
            ResourceKind::Meter => ResourceId::Meter(text("meter-id")?),
        })
    }

    /// The kind of the resource.
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceId::Flow { .. } => ResourceKind::Flow,
            ResourceId::Group(_) => ResourceKind::Group,
            ResourceId::Meter(_) => ResourceKind::Meter,
        }
    }

    /// Path of the resource, relative to the store.
    pub fn path(&self, node: &str) -> String {
        match self {
            ResourceId::Flow { table, id } => {
                format!("{NODES}/node/{node}/table/{table}/flow/{id}")
            }
            ResourceId::Group(id) => format!("{NODES}/node/{node}/group/{id}"),
            ResourceId::Meter(id) => format!("{NODES}/node/{node}/meter/{id}"),
        }
    }

    /// Path of the collection into which the resource is created with `POST`.
    pub fn collection_path(&self, node: &str) -> String {
        match self {
            ResourceId::Flow { table, .. } => format!("{NODES}/node/{node}/table/{table}"),
            ResourceId::Group(_) | ResourceId::Meter(_) => format!("{NODES}/node/{node}"),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Flow { table, id } => write!(f, "flow {id} in table {table}"),
            ResourceId::Group(id) => write!(f, "group {id}"),
            ResourceId::Meter(id) => write!(f, "meter {id}"),
        }
    }
}

/// A parsed fixture, keeping the raw text that is sent to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixture {
    /// Name of the fixture, usually the file stem like `f12`.
    pub name: String,
    /// Raw XML
    pub xml: String,
    /// Parsed document
    pub document: XmlDocument,
    /// Identifier of the described resource
    pub id: ResourceId,
}

impl Fixture {
    /// Parse a fixture from its text.
    pub fn parse(name: impl Into<String>, xml: impl Into<String>) -> Result<Self, FixtureError> {
        let name = name.into();
        let xml = xml.into();
        let document =
            XmlDocument::parse(&xml).map_err(|e| FixtureError::Xml(name.clone(), e))?;
        let id = ResourceId::from_tree(&document.root)?;
        Ok(Self {
            name,
            xml,
            document,
            id,
        })
    }

    /// Read and parse a fixture file. The name of the fixture is the file stem.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let path = path.as_ref();
        let xml =
            std::fs::read_to_string(path).map_err(|e| FixtureError::Io(path.to_path_buf(), e))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(name, xml)
    }

    /// Find all fixtures in `dir` of the given kinds (all if empty) and with the given numbers
    /// (all if empty), sorted by kind and number.
    pub fn discover(
        dir: impl AsRef<Path>,
        kinds: &[ResourceKind],
        numbers: &[u32],
    ) -> Result<Vec<Self>, FixtureError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| FixtureError::Io(dir.to_path_buf(), e))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| FixtureError::Io(dir.to_path_buf(), e))?
                .path();
            let file_name = path.file_name().and_then(|n| n.to_str());
            let Some((kind, number)) = file_name.and_then(parse_file_name) else {
                continue;
            };
            if (kinds.is_empty() || kinds.contains(&kind))
                && (numbers.is_empty() || numbers.contains(&number))
            {
                files.push((kind, number, path));
            }
        }
        files.sort();
        log::debug!("[fixture] found {} fixtures in {}", files.len(), dir.display());
        files.into_iter().map(|(_, _, path)| Self::load(path)).collect()
    }

    /// The kind of the described resource.
    pub fn kind(&self) -> ResourceKind {
        self.id.kind()
    }

    /// Input of [`Rpc::Add`] and [`Rpc::Remove`]: every field of the resource except the key of
    /// flows, followed by the `<node>` reference.
    pub fn rpc_input(&self, node: &str) -> String {
        self.wrap_input(&self.rpc_fields(), node)
    }

    /// Input of [`Rpc::Update`], replacing this resource with `updated`.
    pub fn rpc_update_input(&self, updated: &Fixture, node: &str) -> String {
        let tag = self.kind().tag();
        let fields = format!(
            "<original-{tag}>\n{}</original-{tag}>\n<updated-{tag}>\n{}</updated-{tag}>\n",
            self.rpc_fields(),
            updated.rpc_fields(),
        );
        self.wrap_input(&fields, node)
    }

    fn rpc_fields(&self) -> String {
        self.document
            .root
            .children()
            .iter()
            .filter(|c| c.tag() != FLOW_KEY_TAG)
            .map(XmlTree::to_xml)
            .collect()
    }

    fn wrap_input(&self, fields: &str, node: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n\
             <input xmlns=\"{}\">\n\
             {fields}\
             <node xmlns:inv=\"{INVENTORY_NAMESPACE}\">/inv:nodes/inv:node[inv:id=\"{node}\"]</node>\n\
             </input>\n",
            self.kind().service_namespace(),
        )
    }

    /// The number in the fixture name, like `12` for `f12`.
    pub fn number(&self) -> Option<u32> {
        self.name.get(1..)?.parse().ok()
    }

    /// A modified copy of the fixture, used to test updates. In flows and groups, the first
    /// action is replaced by a drop action (or by `dec-mpls-ttl` if it already drops). In meters,
    /// the band rates are increased by one. Returns `None` if there is nothing to modify.
    pub fn updated(&self) -> Option<Self> {
        let mut document = self.document.clone();
        let modified = match self.kind() {
            ResourceKind::Flow | ResourceKind::Group => replace_first_action(&mut document.root),
            ResourceKind::Meter => bump_leaves(&mut document.root, &METER_RATE_TAGS) > 0,
        };
        if !modified {
            return None;
        }
        Some(Self {
            name: format!("{}-updated", self.name),
            xml: document.to_xml(),
            document,
            id: self.id.clone(),
        })
    }
}

/// Parse file names like `f12.xml`.
fn parse_file_name(name: &str) -> Option<(ResourceKind, u32)> {
    let stem = name.strip_suffix(".xml")?;
    let mut chars = stem.chars();
    let prefix = chars.next()?;
    let kind = ResourceKind::ALL.into_iter().find(|k| k.prefix() == prefix)?;
    Some((kind, chars.as_str().parse().ok()?))
}

fn replace_first_action(root: &mut XmlTree) -> bool {
    let Some(XmlTree::Branch { children, .. }) = root.find_mut("action") else {
        return false;
    };
    let mut modified = false;
    for child in children.iter_mut().filter(|c| c.tag() != ORDER_TAG) {
        *child = if child.tag() == DROP_ACTION {
            XmlTree::empty(DEC_MPLS_TTL)
        } else {
            XmlTree::empty(DROP_ACTION)
        };
        modified = true;
    }
    modified
}

/// Increase every numeric leaf with one of the tags by one. Returns the number of changed leaves.
fn bump_leaves(node: &mut XmlTree, tags: &[&str]) -> usize {
    match node {
        XmlTree::Leaf {
            tag,
            text: Some(text),
        } if tags.contains(&tag.as_str()) => match text.trim().parse::<u64>() {
            Ok(value) => {
                *text = (value + 1).to_string();
                1
            }
            Err(_) => 0,
        },
        XmlTree::Leaf { .. } => 0,
        XmlTree::Branch { children, .. } => children.iter_mut().map(|c| bump_leaves(c, tags)).sum(),
    }
}

/// Error while loading a fixture.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// The file or directory cannot be read.
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, std::io::Error),
    /// The document is not valid XML.
    #[error("Fixture {0}: {1}")]
    Xml(String, NormalizeError),
    /// The root element is not a flow, group or meter.
    #[error("Unknown resource <{0}>")]
    UnknownRoot(String),
    /// The identifier of the resource is missing.
    #[error("The {0} has no <{1}>")]
    MissingId(ResourceKind, &'static str),
}
