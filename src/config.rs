// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Process configuration.
//!
//! Every setting is a command-line flag that can also be supplied through an
//! environment variable, so the operator can be configured from a Deployment's
//! `env` without rebuilding its argument list.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;

use crate::cidr::parse_comma_separated;
use crate::cluster_store::ObjectKey;
use crate::constants::DEFAULT_COMPUTE_ENDPOINT;
use crate::errors::Error;
use crate::nat::NatIpStrategy;

/// A comma-separated CIDR list, validated when the flag is parsed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CidrList(pub Vec<String>);

impl FromStr for CidrList {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_comma_separated(s).map(Self)
    }
}

impl CidrList {
    #[must_use]
    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

/// Configuration of the operator process.
#[derive(Clone, Debug, Parser)]
#[command(
    name = "capg-firewall-operator",
    version,
    about = "Manages bastion firewall rules and API server security policies for CAPG clusters"
)]
pub struct OperatorConfig {
    /// Default GCP project, informational only; each cluster carries its own
    #[arg(long, env = "GCP_PROJECT", default_value = "")]
    pub gcp_project: String,

    /// Name of the management cluster whose NAT IPs are allowed on every API server
    #[arg(long, env = "MANAGEMENT_CLUSTER_NAME")]
    pub management_cluster_name: String,

    /// Namespace of the management cluster's GCPCluster
    #[arg(long, env = "MANAGEMENT_CLUSTER_NAMESPACE")]
    pub management_cluster_namespace: String,

    /// CIDRs allowed to reach every bastion over SSH
    #[arg(long, env = "DEFAULT_BASTION_ALLOWLIST", default_value = "")]
    pub default_bastion_allowlist: CidrList,

    /// CIDRs allowed to reach every Kubernetes API server
    #[arg(long, env = "DEFAULT_API_ALLOWLIST", default_value = "")]
    pub default_api_allowlist: CidrList,

    /// Address the `/metrics` endpoint listens on
    #[arg(long, env = "METRICS_BIND_ADDRESS", default_value = "0.0.0.0:8080")]
    pub metrics_bind_address: SocketAddr,

    /// Address the `/healthz` and `/readyz` endpoints listen on
    #[arg(long, env = "HEALTH_PROBE_BIND_ADDRESS", default_value = "0.0.0.0:8081")]
    pub health_probe_bind_address: SocketAddr,

    /// Only reconcile while holding the leader lease
    #[arg(long, env = "LEADER_ELECT")]
    pub leader_elect: bool,

    /// Namespace of the leader lease
    #[arg(long, env = "LEADER_ELECTION_NAMESPACE", default_value = "kube-system")]
    pub leader_election_namespace: String,

    /// Also wait for the cluster router before applying
    #[arg(long, env = "REQUIRE_ROUTER")]
    pub require_router: bool,

    /// How the management cluster NAT IPs are discovered
    #[arg(long, env = "NAT_IP_STRATEGY", value_enum, default_value_t = NatIpStrategy::RouterNatIps)]
    pub nat_ip_strategy: NatIpStrategy,

    /// Base URL of the Compute Engine REST API
    #[arg(long, env = "COMPUTE_ENDPOINT", default_value = DEFAULT_COMPUTE_ENDPOINT)]
    pub compute_endpoint: String,

    /// Static bearer token; tokens come from the metadata server when unset
    #[arg(long, env = "GCP_ACCESS_TOKEN", hide_env_values = true)]
    pub gcp_access_token: Option<String>,

    /// Requeue interval after a successful reconciliation (seconds)
    #[arg(long, env = "REQUEUE_INTERVAL_SECS", default_value_t = 300)]
    pub requeue_interval_secs: u64,

    /// Requeue interval after a failed reconciliation (seconds)
    #[arg(long, env = "ERROR_REQUEUE_SECS", default_value_t = 30)]
    pub error_requeue_secs: u64,
}

impl OperatorConfig {
    /// The management cluster reference.
    #[must_use]
    pub fn management_cluster(&self) -> ObjectKey {
        ObjectKey::new(
            self.management_cluster_namespace.clone(),
            self.management_cluster_name.clone(),
        )
    }

    #[must_use]
    pub fn requeue_interval(&self) -> Duration {
        Duration::from_secs(self.requeue_interval_secs)
    }

    #[must_use]
    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
