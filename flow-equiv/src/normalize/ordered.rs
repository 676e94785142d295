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

//! Rendering of ordered instruction and action lists into the syntax of `ovs-ofctl`.

use itertools::Itertools;

use super::{Namespace, Normalizer, ORDER_TAG};
use crate::{num, record::CanonicalRecord, tree::XmlTree};

/// Sort key of an ordered item: the text of its `<order>` child, or `"0"` if the child is
/// missing or empty.
pub fn order_key(item: &XmlTree) -> &str {
    item.child(ORDER_TAG)
        .and_then(XmlTree::text)
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .unwrap_or("0")
}

impl<'k> Normalizer<'k> {
    /// Render the children of `container` as an ordered list, like `"dec_mpls_ttl, drop"`.
    ///
    /// Each child is one item, sorted by [`order_key`]. Items with the same order key keep their
    /// document order.
    pub fn ordered(&self, container: &XmlTree) -> String {
        self.render_items(container.children())
    }

    pub(super) fn render_items<'t>(&self, items: impl IntoIterator<Item = &'t XmlTree>) -> String {
        items
            .into_iter()
            .filter(|item| !self.keywords.is_ignored(item.tag()))
            // `sorted_by` is a stable sort
            .sorted_by(|a, b| num::natural_cmp(order_key(a), order_key(b)))
            .flat_map(|item| self.render_item(item))
            .join(", ")
    }

    fn render_item(&self, item: &XmlTree) -> Vec<String> {
        if item.children().is_empty() {
            return vec![self.render_payload(item)];
        }
        item.children()
            .iter()
            .filter(|c| c.tag() != ORDER_TAG && !self.keywords.is_ignored(c.tag()))
            .map(|payload| self.render_payload(payload))
            .collect()
    }

    fn render_payload(&self, payload: &XmlTree) -> String {
        let name = self
            .keywords
            .actions
            .lookup(payload.tag())
            .map(String::from)
            .unwrap_or_else(|| payload.tag().replace('-', "_").to_lowercase());

        // wrappers around another ordered list, like `<apply-actions>`
        if payload.children().iter().any(XmlTree::is_ordered_item) {
            let inner =
                self.render_items(payload.children().iter().filter(|c| c.is_ordered_item()));
            return if name == "apply_actions" {
                inner
            } else {
                format!("{name}({inner})")
            };
        }

        let mut params = CanonicalRecord::new();
        for child in payload.children() {
            self.flat_into(child, Namespace::Action, None, &mut params);
        }
        render_action(&name, &params)
    }
}

/// Render a single action with its parameters.
fn render_action(name: &str, params: &CanonicalRecord) -> String {
    let param = |key: &str| params.get_str(key);
    let rendered = match name {
        "output" => param("port").map(|port| render_output(port, param("max_len"))),
        "push_vlan" | "push_mpls" | "push_pbb" | "pop_mpls" => param("ethertype")
            .and_then(num::parse_int)
            .map(|ethertype| format!("{name}:{ethertype:#06x}")),
        "set_field" if !params.is_empty() => Some(
            params
                .iter()
                .map(|(field, value)| format!("set_field:{value}->{field}"))
                .join(", "),
        ),
        "set_mpls_ttl" => param("ttl").map(|ttl| format!("set_mpls_ttl({ttl})")),
        "set_nw_ttl" => param("ttl").map(|ttl| format!("mod_nw_ttl:{ttl}")),
        "group" => param("group_id").map(|id| format!("group:{id}")),
        "set_queue" => param("queue_id").map(|id| format!("set_queue:{id}")),
        "goto_table" => param("table_id").map(|id| format!("goto_table:{id}")),
        "meter" => param("meter_id").map(|id| format!("meter:{id}")),
        "write_metadata" => param("metadata").map(|m| match param("metadata_mask") {
            Some(mask) => format!("write_metadata:{m}/{mask}"),
            None => format!("write_metadata:{m}"),
        }),
        _ if params.is_empty() => None,
        _ => Some(format!("{name}:{}", params.iter().map(|(_, v)| v).join(":"))),
    };
    rendered.unwrap_or_else(|| name.to_string())
}

/// Render the output action. Numeric ports (also `openflow:1:3`) become `output:N`, reserved
/// ports are printed by their name.
fn render_output(port: &str, max_len: Option<&str>) -> String {
    let number = port.rsplit(':').next().unwrap_or(port);
    if !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()) {
        return format!("output:{number}");
    }
    match port {
        "inport" | "in_port" => "in_port".to_string(),
        "controller" => format!("controller:{}", max_len.unwrap_or("65535")),
        other => other.to_string(),
    }
}
