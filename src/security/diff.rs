// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Priority-keyed diff of security policy rules.
//!
//! A remote policy is a map from priority to rule. [`plan`] compares it with the
//! desired rules and returns the operations that bring it in line:
//!
//! - a desired priority missing remotely is added
//! - a priority present on both sides is patched, but only if the rules differ
//! - a remote priority no longer desired is removed, except the default rule at
//!   [`PRIORITY_DEFAULT_RULE`], which the API does not allow to be removed
//!
//! Planning is pure; the caller executes the operations in the returned order.

use std::collections::{BTreeMap, BTreeSet};

use crate::constants::PRIORITY_DEFAULT_RULE;
use crate::gcp::types::SecurityPolicyRule;

/// One mutation of a remote policy.
#[derive(Clone, Debug, PartialEq)]
pub enum RuleOperation<'a> {
    /// Add a rule at a priority that is free remotely
    Add(&'a SecurityPolicyRule),
    /// Replace the rule at an existing priority
    Patch(&'a SecurityPolicyRule),
    /// Remove the rule at a priority
    Remove(i32),
}

impl RuleOperation<'_> {
    #[must_use]
    pub fn priority(&self) -> i32 {
        match self {
            Self::Add(rule) | Self::Patch(rule) => rule.priority,
            Self::Remove(priority) => *priority,
        }
    }
}

/// Whether two rules at the same priority differ in anything the operator manages.
///
/// Source ranges compare as sets.
#[must_use]
pub fn rules_differ(current: &SecurityPolicyRule, desired: &SecurityPolicyRule) -> bool {
    let ranges = |rule: &SecurityPolicyRule| {
        rule.matcher
            .config
            .src_ip_ranges
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
    };

    current.action != desired.action
        || current.description != desired.description
        || ranges(current) != ranges(desired)
}

/// Plan the operations turning `current` into `desired`.
///
/// Adds and patches come first in ascending priority, then removals in ascending
/// priority. If `desired` repeats a priority, the last rule wins.
#[must_use]
pub fn plan<'a>(
    current: &[SecurityPolicyRule],
    desired: &'a [SecurityPolicyRule],
) -> Vec<RuleOperation<'a>> {
    let mut to_delete: BTreeMap<i32, &SecurityPolicyRule> =
        current.iter().map(|rule| (rule.priority, rule)).collect();
    let desired: BTreeMap<i32, &'a SecurityPolicyRule> =
        desired.iter().map(|rule| (rule.priority, rule)).collect();

    let mut operations = Vec::with_capacity(desired.len() + to_delete.len());

    for (priority, rule) in desired {
        match to_delete.remove(&priority) {
            Some(remote) if rules_differ(remote, rule) => {
                operations.push(RuleOperation::Patch(rule));
            }
            Some(_) => {}
            None => operations.push(RuleOperation::Add(rule)),
        }
    }

    operations.extend(
        to_delete
            .into_keys()
            .filter(|priority| *priority != PRIORITY_DEFAULT_RULE)
            .map(RuleOperation::Remove),
    );

    operations
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod diff_tests;
