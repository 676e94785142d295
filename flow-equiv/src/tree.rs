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

//! Owned XML tree with explicit branches and leaves.

use std::{collections::VecDeque, fmt::Write};

use roxmltree::Node;

use crate::normalize::{NormalizeError, ORDER_TAG};

/// An XML element. Elements with element children are branches, all others are leaves.
/// Attributes and comments are not kept, and tag names are reduced to their local name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlTree {
    /// Element containing other elements.
    Branch {
        /// Local tag name
        tag: String,
        /// Element children in document order
        children: Vec<XmlTree>,
    },
    /// Element without element children.
    Leaf {
        /// Local tag name
        tag: String,
        /// Text content, `None` if the element is empty or contains only whitespace.
        text: Option<String>,
    },
}

impl XmlTree {
    /// Parse a document and return its root element.
    pub fn parse(input: &str) -> Result<Self, NormalizeError> {
        Ok(XmlDocument::parse(input)?.root)
    }

    fn from_node(node: Node<'_, '_>) -> Self {
        let tag = node.tag_name().name().to_string();
        let children: Vec<XmlTree> = node
            .children()
            .filter(Node::is_element)
            .map(Self::from_node)
            .collect();
        if children.is_empty() {
            let text = node
                .text()
                .filter(|t| !t.trim().is_empty())
                .map(String::from);
            XmlTree::Leaf { tag, text }
        } else {
            XmlTree::Branch { tag, children }
        }
    }

    /// Create a leaf with text.
    pub fn leaf(tag: impl Into<String>, text: impl Into<String>) -> Self {
        XmlTree::Leaf {
            tag: tag.into(),
            text: Some(text.into()),
        }
    }

    /// Create an empty element.
    pub fn empty(tag: impl Into<String>) -> Self {
        XmlTree::Leaf {
            tag: tag.into(),
            text: None,
        }
    }

    /// Create a branch. If `children` is empty, an empty leaf is returned.
    pub fn branch(tag: impl Into<String>, children: Vec<XmlTree>) -> Self {
        if children.is_empty() {
            Self::empty(tag)
        } else {
            XmlTree::Branch {
                tag: tag.into(),
                children,
            }
        }
    }

    /// Local tag name of the element.
    pub fn tag(&self) -> &str {
        match self {
            XmlTree::Branch { tag, .. } | XmlTree::Leaf { tag, .. } => tag,
        }
    }

    /// Element children. Leaves have none.
    pub fn children(&self) -> &[XmlTree] {
        match self {
            XmlTree::Branch { children, .. } => children,
            XmlTree::Leaf { .. } => &[],
        }
    }

    /// Text of a leaf. Branches have none.
    pub fn text(&self) -> Option<&str> {
        match self {
            XmlTree::Leaf { text, .. } => text.as_deref(),
            XmlTree::Branch { .. } => None,
        }
    }

    /// First direct child with the given tag.
    pub fn child(&self, tag: &str) -> Option<&XmlTree> {
        self.children().iter().find(|c| c.tag() == tag)
    }

    /// Breadth-first search for the first leaf with the given tag, returning its trimmed text.
    /// Elements closer to this node are preferred over deeper ones.
    pub fn find_text(&self, tag: &str) -> Option<&str> {
        let mut queue = VecDeque::from([self]);
        while let Some(node) = queue.pop_front() {
            if node.tag() == tag {
                if let Some(text) = node.text() {
                    return Some(text.trim());
                }
            }
            queue.extend(node.children());
        }
        None
    }

    /// An ordered item is a branch with a direct `<order>` child.
    pub fn is_ordered_item(&self) -> bool {
        self.child(ORDER_TAG).is_some()
    }

    /// Depth-first search for the first branch with the given tag.
    pub fn find_mut(&mut self, tag: &str) -> Option<&mut XmlTree> {
        if self.tag() == tag && matches!(self, XmlTree::Branch { .. }) {
            return Some(self);
        }
        match self {
            XmlTree::Branch { children, .. } => children.iter_mut().find_map(|c| c.find_mut(tag)),
            XmlTree::Leaf { .. } => None,
        }
    }

    /// Apply `f` to the text of every leaf.
    pub fn map_text(self, f: &impl Fn(&str) -> String) -> Self {
        match self {
            XmlTree::Branch { tag, children } => XmlTree::Branch {
                tag,
                children: children.into_iter().map(|c| c.map_text(f)).collect(),
            },
            XmlTree::Leaf { tag, text } => XmlTree::Leaf {
                tag,
                text: text.map(|t| f(&t)),
            },
        }
    }

    /// Serialize the element (without namespace declaration).
    pub fn to_xml(&self) -> String {
        let mut buf = String::new();
        self.write_xml(&mut buf, None, 0);
        buf
    }

    fn write_xml(&self, buf: &mut String, namespace: Option<&str>, depth: usize) {
        let indent = "  ".repeat(depth);
        let xmlns = namespace
            .map(|ns| format!(" xmlns=\"{}\"", escape(ns)))
            .unwrap_or_default();
        // writing into a string cannot fail
        let _ = match self {
            XmlTree::Branch { tag, children } => {
                let _ = writeln!(buf, "{indent}<{tag}{xmlns}>");
                for child in children {
                    child.write_xml(buf, None, depth + 1);
                }
                writeln!(buf, "{indent}</{tag}>")
            }
            XmlTree::Leaf {
                tag,
                text: Some(text),
            } => writeln!(buf, "{indent}<{tag}{xmlns}>{}</{tag}>", escape(text)),
            XmlTree::Leaf { tag, text: None } => writeln!(buf, "{indent}<{tag}{xmlns}/>"),
        };
    }
}

/// A parsed document: the root element together with the namespace of the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    /// Namespace URI of the root element, if any.
    pub namespace: Option<String>,
    /// Root element.
    pub root: XmlTree,
}

impl XmlDocument {
    /// Parse a document. Trailing `]]>]]>` markers are removed.
    pub fn parse(input: &str) -> Result<Self, NormalizeError> {
        let input = input.trim().trim_end_matches("]]>]]>");
        let doc = roxmltree::Document::parse(input)?;
        let root = doc.root_element();
        if !is_closed(input, root) {
            return Err(NormalizeError::Unclosed(root.tag_name().name().to_string()));
        }
        Ok(Self {
            namespace: root.tag_name().namespace().map(String::from),
            root: XmlTree::from_node(root),
        })
    }

    /// Serialize the document, including the XML declaration and the root namespace.
    pub fn to_xml(&self) -> String {
        let mut buf = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n");
        self.root.write_xml(&mut buf, self.namespace.as_deref(), 0);
        buf
    }
}

/// roxmltree accepts a document that ends before its elements are closed. The last tag of the
/// input (ignoring trailing comments) must therefore close the root element, or be the root
/// element itself when it is self-closing.
fn is_closed(input: &str, root: Node<'_, '_>) -> bool {
    let mut tail = input.trim_end();
    while tail.ends_with("-->") {
        match tail.rfind("<!--") {
            Some(i) => tail = tail[..i].trim_end(),
            None => return false,
        }
    }
    let Some(last) = tail.rsplit('<').next().and_then(|t| t.strip_suffix('>')) else {
        return false;
    };
    match last.strip_prefix('/') {
        Some(name) => name.trim().rsplit(':').next() == Some(root.tag_name().name()),
        None => last.ends_with('/') && !root.children().any(|c| c.is_element()),
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
