// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes API security policy.
//!
//! Every workload cluster gets one Cloud Armor policy, `allow-<cluster>-apiserver`,
//! bound to the backend service in front of its API servers. The policy is a set of
//! priority-keyed rules:
//!
//! | Priority | Source ranges | Present |
//! |---|---|---|
//! | 0 | API allow-list annotation | when the annotation is set |
//! | 1 | management cluster NAT IPs | always |
//! | 2 | operator default allow-list | when the list is non-empty |
//! | `i32::MAX` | `*` with the policy default action | always, never removed |
//!
//! - [`PolicyReconciler`] - computes the desired policy
//! - [`diff`] - turns desired rules into the minimal add/patch/remove operations
//! - [`GcpSecurityPolicyClient`] - applies policies through the Compute Engine API

pub mod client;
pub mod diff;
pub mod reconciler;

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;

use crate::constants::{
    DEFAULT_RULE_DESCRIPTION, DEFAULT_RULE_SOURCE_RANGE, PRIORITY_DEFAULT_RULE,
};
use crate::context::RequestContext;
use crate::crd::GCPCluster;
use crate::errors::{Error, Result};

pub use client::GcpSecurityPolicyClient;
pub use reconciler::PolicyReconciler;

/// What a rule does with matching requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyAction {
    Allow,
    Deny403,
}

impl PolicyAction {
    /// Value used by the Compute API.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny403 => "deny(403)",
        }
    }
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rule of a security policy, keyed by its priority.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyRule {
    pub action: PolicyAction,
    pub description: String,
    pub source_ranges: Vec<String>,
    pub priority: i32,
}

/// Desired state of a security policy.
///
/// `rules` holds the explicit rules only; the default rule at [`PRIORITY_DEFAULT_RULE`]
/// is derived from `default_action`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Policy {
    pub name: String,
    pub description: String,
    pub default_action: PolicyAction,
    pub rules: Vec<PolicyRule>,
}

impl Policy {
    /// The implicit lowest-precedence rule carrying the default action.
    #[must_use]
    pub fn default_rule(&self) -> PolicyRule {
        PolicyRule {
            action: self.default_action,
            description: DEFAULT_RULE_DESCRIPTION.to_string(),
            source_ranges: vec![DEFAULT_RULE_SOURCE_RANGE.to_string()],
            priority: PRIORITY_DEFAULT_RULE,
        }
    }

    /// Check the policy can be applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPolicy`] if the name is empty, two rules share a
    /// priority, a rule claims the default-rule priority, or a rule has no
    /// source ranges.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid_policy("policy name is empty"));
        }

        let mut seen = BTreeSet::new();
        for rule in &self.rules {
            if rule.priority == PRIORITY_DEFAULT_RULE {
                return Err(Error::invalid_policy(format!(
                    "priority {PRIORITY_DEFAULT_RULE} is reserved for the default rule"
                )));
            }
            if !seen.insert(rule.priority) {
                return Err(Error::invalid_policy(format!(
                    "duplicate rule priority {}",
                    rule.priority
                )));
            }
            if rule.source_ranges.is_empty() {
                return Err(Error::invalid_policy(format!(
                    "rule at priority {} has no source ranges",
                    rule.priority
                )));
            }
        }

        Ok(())
    }
}

/// Applies and deletes security policies for a cluster.
#[async_trait]
pub trait SecurityPolicyClient: Send + Sync {
    /// Create or update the policy and bind it to the cluster's API backend service.
    ///
    /// Fails with [`Error::MissingBackendService`] if the cluster has no backend
    /// service yet.
    async fn apply_policy(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
        policy: &Policy,
    ) -> Result<()>;

    /// Delete a policy by name. A policy that does not exist is not an error.
    ///
    /// Fails with [`Error::BackendServiceStillAttached`] while the cluster still
    /// references its backend service.
    async fn delete_policy(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
        name: &str,
    ) -> Result<()>;
}

/// Name of the API server security policy of a cluster.
#[must_use]
pub fn api_policy_name(cluster_name: &str) -> String {
    format!("allow-{cluster_name}-apiserver")
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
