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

//! Test the `keywords` module

use crate::{
    keywords::{KeywordDictionary, KeywordError, Keywords},
    normalize::Namespace,
};

use pretty_assertions::assert_eq;

#[test]
fn parse_dictionary() {
    let table = "# comment\n\n table_id ; table\npriority;priority\n";
    let dict = KeywordDictionary::parse(table).unwrap();
    assert_eq!(dict.len(), 2);
    assert_eq!(dict.lookup("table_id"), Some("table"));
    assert_eq!(dict.lookup("priority"), Some("priority"));
    assert_eq!(dict.lookup("table"), None);
}

#[test]
fn redefinition_keeps_last() {
    let dict = KeywordDictionary::parse("vlan-id;dl_vlan\nvlan-id;vlan_vid").unwrap();
    assert_eq!(dict.lookup("vlan-id"), Some("vlan_vid"));
}

#[test]
fn malformed_line() {
    match KeywordDictionary::parse("priority;priority\nfoo\n") {
        Err(KeywordError::MalformedLine(2, line)) => assert_eq!(line, "foo"),
        x => panic!("unexpected result: {x:?}"),
    }
    assert!(matches!(
        KeywordDictionary::parse("cookie;"),
        Err(KeywordError::MalformedLine(1, _))
    ));
}

#[test]
fn builtin_namespaces() {
    let kw = Keywords::builtin();
    assert_eq!(kw.dictionary(Namespace::Default).lookup("table_id"), Some("table"));
    assert_eq!(kw.dictionary(Namespace::Match).lookup("ethernet-type"), Some("dl_type"));
    assert_eq!(kw.dictionary(Namespace::Action).lookup("ethernet-type"), Some("ethertype"));
    assert_eq!(kw.dictionary(Namespace::Match).lookup("ipv4-destination"), Some("nw_dst"));
    assert_eq!(kw.dictionary(Namespace::Action).lookup("ipv4-destination"), Some("ip_dst"));
    assert!(kw.is_ignored("flow-name"));
    assert!(kw.is_ignored("n_packets"));
    assert!(!kw.is_ignored("priority"));
}

#[test]
fn load_matches_builtin() {
    let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/keywords");
    let kw = Keywords::load(dir).unwrap();
    assert_eq!(&kw, Keywords::builtin());
}

#[test]
fn load_missing_dir() {
    let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/does-not-exist");
    assert!(matches!(Keywords::load(dir), Err(KeywordError::Io(_, _))));
}

#[test]
fn ignore_table_uses_first_column() {
    let kw = Keywords::from_tables("", "", "", "# header\nid;whatever\n n_bytes \n").unwrap();
    assert_eq!(kw.ignore.len(), 2);
    assert!(kw.is_ignored("id"));
    assert!(kw.is_ignored("n_bytes"));
}
