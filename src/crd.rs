// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Views of the Cluster API resources consumed by the operator.
//!
//! The operator does not own these CRDs; they are installed by Cluster API and
//! its GCP provider. The types below only model the fields the reconcilers read,
//! and unknown fields are ignored on deserialization.
//!
//! # Resource Types
//!
//! - [`GCPCluster`] - The GCP infrastructure cluster (`infrastructure.cluster.x-k8s.io/v1beta1`)
//! - [`Cluster`] - The logical Cluster API cluster owning it (`cluster.x-k8s.io/v1beta1`)

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cidr::parse_comma_separated;
use crate::constants::ANNOTATION_PAUSED;
use crate::errors::{Error, Result};

/// Specification of a GCP infrastructure cluster.
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "GCPCluster",
    namespaced,
    doc = "GCPCluster is the GCP infrastructure backing a Cluster API workload cluster."
)]
#[kube(status = "GCPClusterStatus")]
#[serde(rename_all = "camelCase")]
pub struct GCPClusterSpec {
    /// GCP project hosting the cluster resources.
    pub project: String,

    /// GCP region hosting the cluster resources.
    #[serde(default)]
    pub region: String,
}

/// Observed state of a GCP infrastructure cluster.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GCPClusterStatus {
    /// Whether the infrastructure is ready.
    #[serde(default)]
    pub ready: bool,

    /// Network resources created for the cluster.
    #[serde(default)]
    pub network: Network,
}

/// Network resources created by the GCP provider.
///
/// Every field is a self-link to a Compute Engine resource, filled in as the
/// provider creates it.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    /// Self-link of the VPC network.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,

    /// Self-link of the Cloud Router (carries the NAT gateway configuration).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router: Option<String>,

    /// Self-link of the backend service fronting the Kubernetes API servers.
    #[serde(
        rename = "apiServerBackendService",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_server_backend_service: Option<String>,
}

/// Specification of a Cluster API cluster.
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Cluster",
    namespaced,
    doc = "Cluster is the logical Cluster API cluster owning an infrastructure cluster."
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Pauses reconciliation of the cluster and everything it owns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
}

/// Returns the value if the reference is set and not empty.
fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}

impl GCPCluster {
    /// Self-link of the cluster network, if set and non-empty.
    #[must_use]
    pub fn network_self_link(&self) -> Option<&str> {
        non_empty(self.status.as_ref()?.network.self_link.as_ref())
    }

    /// Self-link of the cluster router, if set and non-empty.
    #[must_use]
    pub fn router_self_link(&self) -> Option<&str> {
        non_empty(self.status.as_ref()?.network.router.as_ref())
    }

    /// Self-link of the API server backend service, if set and non-empty.
    #[must_use]
    pub fn backend_service_self_link(&self) -> Option<&str> {
        non_empty(
            self.status
                .as_ref()?
                .network
                .api_server_backend_service
                .as_ref(),
        )
    }

    /// Whether a backend service reference is present at all.
    ///
    /// Unlike [`GCPCluster::backend_service_self_link`], an empty string counts
    /// as present: the provider has not torn the reference down yet.
    #[must_use]
    pub fn has_backend_service_reference(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.network.api_server_backend_service.is_some())
    }

    /// Whether the cluster has been marked for deletion.
    #[must_use]
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Parse a CIDR allow-list annotation.
    ///
    /// # Returns
    ///
    /// `None` if the annotation is absent, otherwise the parsed CIDRs in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyAllowList`] if the annotation is present but blank,
    /// and [`Error::InvalidCidrList`] if any entry is not a valid CIDR.
    pub fn allowlist(&self, annotation: &str) -> Result<Option<Vec<String>>> {
        let Some(value) = self.annotations().get(annotation) else {
            return Ok(None);
        };

        if value.trim().is_empty() {
            return Err(Error::EmptyAllowList {
                annotation: annotation.to_string(),
            });
        }

        parse_comma_separated(value).map(Some)
    }

    /// Whether the infrastructure cluster carries the pause annotation.
    #[must_use]
    pub fn has_paused_annotation(&self) -> bool {
        self.annotations().contains_key(ANNOTATION_PAUSED)
    }
}

impl Cluster {
    /// Whether the cluster is paused through its spec.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.spec.paused.unwrap_or(false)
    }
}

/// Whether reconciliation of an infrastructure cluster is paused, either on the
/// owning cluster or on the infrastructure cluster itself.
#[must_use]
pub fn is_paused(cluster: &Cluster, gcp_cluster: &GCPCluster) -> bool {
    cluster.is_paused() || gcp_cluster.has_paused_annotation()
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
