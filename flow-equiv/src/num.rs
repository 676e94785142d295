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

//! Numeric helpers shared by the normalizers, the comparator and the validator.

use std::cmp::Ordering;

/// Parse an unsigned integer written either in decimal or in hex with a `0x` prefix.
pub(crate) fn parse_int(s: &str) -> Option<u128> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u128::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// Parse an integer in the given base. A `0x` prefix is accepted for base 16.
pub(crate) fn parse_int_radix(s: &str, base: u32) -> Option<u128> {
    if base == 16 {
        let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        u128::from_str_radix(digits, 16).ok()
    } else {
        u128::from_str_radix(s, base).ok()
    }
}

/// Parse a number of seconds, optionally followed by the unit `s`.
pub(crate) fn parse_seconds(s: &str) -> Option<f64> {
    s.strip_suffix('s').unwrap_or(s).parse().ok()
}

/// Natural ordering of sort keys: integers are ordered by value and come before all other keys,
/// which are ordered lexically. This is a total order.
pub(crate) fn natural_cmp(a: &str, b: &str) -> Ordering {
    match (a.parse::<i128>(), b.parse::<i128>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
