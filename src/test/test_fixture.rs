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

use flow_equiv::{NormalizeError, Normalizer, XmlDocument, XmlTree};
use pretty_assertions::assert_eq;

use super::*;
use crate::fixture::{FixtureError, ResourceId, ResourceKind, Rpc};

const FILES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/src/test/files");

fn names(fixtures: &[Fixture]) -> Vec<&str> {
    fixtures.iter().map(|f| f.name.as_str()).collect()
}

#[test]
fn flow_id() {
    let f2 = fixture("f2", F2_XML);
    assert_eq!(
        f2.id,
        ResourceId::Flow {
            table: "2".to_string(),
            id: "2".to_string()
        }
    );
    assert_eq!(f2.kind(), ResourceKind::Flow);
    assert_eq!(f2.number(), Some(2));
    assert_eq!(
        f2.id.path(NODE),
        "opendaylight-inventory:nodes/node/openflow:1/table/2/flow/2"
    );
    assert_eq!(
        f2.id.collection_path(NODE),
        "opendaylight-inventory:nodes/node/openflow:1/table/2"
    );
    assert_eq!(f2.id.to_string(), "flow 2 in table 2");
}

#[test]
fn group_and_meter_id() {
    let g1 = fixture("g1", G1_XML);
    assert_eq!(g1.id, ResourceId::Group("1".to_string()));
    assert_eq!(
        g1.id.path("openflow:7"),
        "opendaylight-inventory:nodes/node/openflow:7/group/1"
    );
    assert_eq!(
        g1.id.collection_path("openflow:7"),
        "opendaylight-inventory:nodes/node/openflow:7"
    );

    let m1 = fixture("m1", M1_XML);
    assert_eq!(m1.id, ResourceId::Meter("1".to_string()));
    assert_eq!(m1.kind(), ResourceKind::Meter);
    assert_eq!(
        m1.id.path(NODE),
        "opendaylight-inventory:nodes/node/openflow:1/meter/1"
    );
}

#[test]
fn malformed_fixtures() {
    assert!(matches!(
        Fixture::parse("f9", "<flow><priority>1</priority></flow>"),
        Err(FixtureError::MissingId(ResourceKind::Flow, "table_id"))
    ));
    assert!(matches!(
        Fixture::parse("g9", "<group><group-type>group-all</group-type></group>"),
        Err(FixtureError::MissingId(ResourceKind::Group, "group-id"))
    ));
    assert!(matches!(
        Fixture::parse("x", "<node><id>1</id></node>"),
        Err(FixtureError::UnknownRoot(tag)) if tag == "node"
    ));
    assert!(matches!(
        Fixture::parse("f9", "<flow>"),
        Err(FixtureError::Xml(name, _)) if name == "f9"
    ));
    assert!(matches!(
        Fixture::parse("f9", "<flow><id>9</id><table_id>0</table_id><match>"),
        Err(FixtureError::Xml(name, NormalizeError::Unclosed(_))) if name == "f9"
    ));
    assert!(matches!(
        Fixture::load("/nonexistent/f1.xml"),
        Err(FixtureError::Io(_, _))
    ));
}

#[test]
fn load_file() {
    let f1 = Fixture::load(format!("{FILES}/f1.xml")).unwrap();
    assert_eq!(f1.name, "f1");
    assert_eq!(f1.xml, F1_XML);
    assert_eq!(f1.number(), Some(1));
}

#[test]
fn discover() {
    let all = Fixture::discover(FILES, &[], &[]).unwrap();
    assert_eq!(names(&all), vec!["f1", "f2", "f4", "g1", "m1"]);

    let some = Fixture::discover(FILES, &[ResourceKind::Meter, ResourceKind::Group], &[]).unwrap();
    assert_eq!(names(&some), vec!["g1", "m1"]);

    let some = Fixture::discover(FILES, &[], &[2, 4]).unwrap();
    assert_eq!(names(&some), vec!["f2", "f4"]);

    let some = Fixture::discover(FILES, &[ResourceKind::Group], &[2]).unwrap();
    assert!(some.is_empty());

    assert!(Fixture::discover("/nonexistent", &[], &[]).is_err());
}

#[test]
fn update_flow() {
    let normalizer = Normalizer::default();

    let f2 = fixture("f2", F2_XML);
    let updated = f2.updated().unwrap();
    assert_eq!(updated.name, "f2-updated");
    assert_eq!(updated.id, f2.id);
    assert_eq!(
        normalizer.flat(&updated.document.root).get_str("actions"),
        Some("dec_mpls_ttl, dec_mpls_ttl")
    );
    // the raw text describes the same document
    assert_eq!(fixture("x", &updated.xml).document, updated.document);

    let f1 = fixture("f1", F1_XML);
    let updated = f1.updated().unwrap();
    assert_eq!(
        normalizer.flat(&updated.document.root).get_str("actions"),
        Some("drop")
    );
}

#[test]
fn update_group() {
    let updated = fixture("g1", G1_XML).updated().unwrap();
    assert!(updated.xml.contains("<drop-action/>"));
    assert!(!updated.xml.contains("<output-node-connector>2</output-node-connector>"));
    assert!(updated.xml.contains("<output-node-connector>1</output-node-connector>"));
}

#[test]
fn update_meter() {
    let updated = fixture("m1", M1_XML).updated().unwrap();
    assert_eq!(updated.document.root.find_text("band-rate"), Some("235"));
    assert_eq!(updated.document.root.find_text("drop-rate"), Some("235"));
    assert_eq!(updated.document.root.find_text("band-burst-size"), Some("444"));

    let plain = Fixture::parse("m9", "<meter><meter-id>9</meter-id></meter>").unwrap();
    assert_eq!(plain.updated(), None);
}

/// The fields of an rpc input (or of one of its children) as a flow.
fn input_flow(input: &XmlTree) -> XmlTree {
    let fields = input
        .children()
        .iter()
        .filter(|c| c.tag() != "node")
        .cloned()
        .collect();
    XmlTree::branch("flow", fields)
}

#[test]
fn rpc_input() {
    let normalizer = Normalizer::default();
    let f2 = fixture("f2", F2_XML);
    assert_eq!(f2.kind().operation(Rpc::Add), "sal-flow:add-flow");
    assert_eq!(ResourceKind::Meter.operation(Rpc::Remove), "sal-meter:remove-meter");

    let input = XmlDocument::parse(&f2.rpc_input(NODE)).unwrap();
    assert_eq!(input.namespace.as_deref(), Some("urn:opendaylight:flow:service"));
    assert_eq!(input.root.tag(), "input");
    assert_eq!(input.root.child("id"), None);
    assert_eq!(input.root.find_text("table_id"), Some("2"));
    assert_eq!(
        input.root.find_text("node"),
        Some("/inv:nodes/inv:node[inv:id=\"openflow:1\"]")
    );
    assert_eq!(
        normalizer.nested(&input_flow(&input.root)),
        normalizer.nested(&f2.document.root)
    );
}

#[test]
fn rpc_update_input() {
    let normalizer = Normalizer::default();
    let f2 = fixture("f2", F2_XML);
    let updated = f2.updated().unwrap();
    let input = XmlDocument::parse(&f2.rpc_update_input(&updated, NODE)).unwrap();

    let original = input.root.child("original-flow").unwrap();
    let replacement = input.root.child("updated-flow").unwrap();
    assert_eq!(
        normalizer.nested(&input_flow(original)),
        normalizer.nested(&f2.document.root)
    );
    assert_eq!(
        normalizer.nested(&input_flow(replacement)),
        normalizer.nested(&updated.document.root)
    );
    assert!(input.root.child("node").is_some());
}
