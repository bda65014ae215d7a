// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CIDR allow-list parsing.
//!
//! Allow-lists arrive as comma-separated strings (annotations, command-line flags).
//! A list is accepted whole or not at all: one bad entry rejects the value.

use ipnet::IpNet;

use crate::errors::{Error, Result};

/// Parse a comma-separated list of CIDRs.
///
/// Entries are returned in input order, exactly as written. Host bits are allowed
/// (`10.0.0.1/24` is accepted), matching what the Compute API accepts.
///
/// # Arguments
///
/// * `value` - Comma-separated CIDR list, e.g. `"10.0.0.0/24,192.168.0.0/16"`
///
/// # Returns
///
/// An empty list for empty input, otherwise one entry per comma-delimited token.
///
/// # Errors
///
/// Returns [`Error::InvalidCidrList`] naming the whole value if any token is not
/// a valid CIDR. Whitespace is not trimmed, so `"10.0.0.0/24 10.1.0.0/24"` fails.
///
/// # Example
///
/// ```rust
/// use capg_firewall_operator::cidr::parse_comma_separated;
///
/// let ranges = parse_comma_separated("10.0.0.0/24,172.16.0.0/12").unwrap();
/// assert_eq!(ranges, vec!["10.0.0.0/24", "172.16.0.0/12"]);
///
/// assert!(parse_comma_separated("10.0.0.0/24,nope").is_err());
/// assert!(parse_comma_separated("").unwrap().is_empty());
/// ```
pub fn parse_comma_separated(value: &str) -> Result<Vec<String>> {
    if value.is_empty() {
        return Ok(Vec::new());
    }

    value
        .split(',')
        .map(|token| {
            token
                .parse::<IpNet>()
                .map(|_| token.to_string())
                .map_err(|_| Error::invalid_cidr_list(value))
        })
        .collect()
}

#[cfg(test)]
#[path = "cidr_tests.rs"]
mod cidr_tests;
