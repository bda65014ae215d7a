// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Wire models of the Compute Engine resources used by the operator.
//!
//! Only the fields the operator reads or writes are modeled; everything else
//! returned by the API is ignored.

use serde::{Deserialize, Serialize};

/// A VPC firewall rule.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Firewall {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub direction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default)]
    pub allowed: Vec<FirewallAllowed>,
    #[serde(default)]
    pub target_tags: Vec<String>,
    #[serde(default)]
    pub source_ranges: Vec<String>,
}

/// One protocol/ports entry of a firewall rule.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallAllowed {
    #[serde(rename = "IPProtocol")]
    pub ip_protocol: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
}

/// A Cloud Armor security policy.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicy {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    #[serde(default)]
    pub rules: Vec<SecurityPolicyRule>,
}

/// A priority-keyed rule of a security policy.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicyRule {
    pub action: String,
    #[serde(default)]
    pub description: String,
    pub priority: i32,
    #[serde(rename = "match", default)]
    pub matcher: SecurityPolicyRuleMatcher,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicyRuleMatcher {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub versioned_expr: String,
    #[serde(default)]
    pub config: SecurityPolicyRuleMatcherConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicyRuleMatcherConfig {
    #[serde(default)]
    pub src_ip_ranges: Vec<String>,
}

/// Body of `backendServices.setSecurityPolicy`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicyReference {
    pub security_policy: String,
}

/// A Cloud Router.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Router {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub self_link: String,
    #[serde(default)]
    pub nats: Vec<RouterNat>,
}

/// A NAT gateway configured on a router.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterNat {
    #[serde(default)]
    pub name: String,
    /// Self-links of the addresses used by the gateway
    #[serde(default)]
    pub nat_ips: Vec<String>,
}

/// A reserved external IP address.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    /// Self-links of the resources using the address
    #[serde(default)]
    pub users: Vec<String>,
}

/// A long-running operation started by a mutating call.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub status: String,
    /// Region self-link, for regional operations
    #[serde(default)]
    pub region: Option<String>,
    /// Zone self-link, for zonal operations
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub target_link: Option<String>,
    #[serde(default)]
    pub http_error_status_code: Option<u16>,
    #[serde(default)]
    pub error: Option<OperationError>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub errors: Vec<OperationErrorItem>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OperationErrorItem {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// One page of a list response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}
