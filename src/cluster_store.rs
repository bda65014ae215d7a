// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Access to the Cluster API objects the operator reads and annotates.
//!
//! [`ClusterStore`] is the seam between the reconcilers and the Kubernetes API.
//! [`KubeClusterStore`] is the production implementation; finalizers are managed
//! with merge patches of `metadata.finalizers`, and both operations are no-ops
//! when the object is already in the requested state.

use std::fmt;

use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::{debug, info};

use crate::constants::{CAPI_GROUP, KIND_CLUSTER, KIND_GCP_CLUSTER};
use crate::context::RequestContext;
use crate::crd::{Cluster, GCPCluster};
use crate::errors::{Error, Result};

/// Namespaced identity of a Kubernetes object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Identity of an existing infrastructure cluster.
    #[must_use]
    pub fn of(cluster: &GCPCluster) -> Self {
        Self::new(cluster.namespace().unwrap_or_default(), cluster.name_any())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Read and finalizer access to infrastructure clusters and their owners.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Fetch an infrastructure cluster.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the object does not exist.
    async fn get(&self, ctx: &RequestContext, key: &ObjectKey) -> Result<GCPCluster>;

    /// Fetch the Cluster API `Cluster` owning an infrastructure cluster.
    ///
    /// Returns `None` when the object has no owner of kind `Cluster` yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OwnerNotFound`] if the owner reference points at a missing
    /// object.
    async fn get_owner(&self, ctx: &RequestContext, cluster: &GCPCluster)
        -> Result<Option<Cluster>>;

    /// Add a finalizer if it is not already present.
    async fn add_finalizer(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
        finalizer: &str,
    ) -> Result<()>;

    /// Remove a finalizer if it is present.
    async fn remove_finalizer(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
        finalizer: &str,
    ) -> Result<()>;
}

/// Name of the owning `Cluster`, taken from the owner references.
///
/// Only a reference of kind `Cluster` in the `cluster.x-k8s.io` group counts.
#[must_use]
pub fn owner_cluster_name(cluster: &GCPCluster) -> Option<String> {
    cluster
        .owner_references()
        .iter()
        .find(|owner| {
            owner.kind == KIND_CLUSTER
                && owner
                    .api_version
                    .split_once('/')
                    .is_some_and(|(group, _)| group == CAPI_GROUP)
        })
        .map(|owner| owner.name.clone())
}

/// Finalizer list with `finalizer` appended, or `None` if it is already there.
fn finalizers_with(cluster: &GCPCluster, finalizer: &str) -> Option<Vec<String>> {
    let current = cluster.finalizers();
    if current.iter().any(|f| f == finalizer) {
        return None;
    }
    let mut finalizers = current.to_vec();
    finalizers.push(finalizer.to_string());
    Some(finalizers)
}

/// Finalizer list with `finalizer` removed, or `None` if it was not there.
fn finalizers_without(cluster: &GCPCluster, finalizer: &str) -> Option<Vec<String>> {
    let current = cluster.finalizers();
    if !current.iter().any(|f| f == finalizer) {
        return None;
    }
    Some(
        current
            .iter()
            .filter(|f| f.as_str() != finalizer)
            .cloned()
            .collect(),
    )
}

/// [`ClusterStore`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeClusterStore {
    client: Client,
}

impl KubeClusterStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn patch_finalizers(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
        finalizers: Vec<String>,
    ) -> Result<()> {
        let key = ObjectKey::of(cluster);
        let api: Api<GCPCluster> = Api::namespaced(self.client.clone(), &key.namespace);
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        ctx.run(api.patch(&key.name, &PatchParams::default(), &Patch::Merge(&patch)))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ClusterStore for KubeClusterStore {
    async fn get(&self, ctx: &RequestContext, key: &ObjectKey) -> Result<GCPCluster> {
        let api: Api<GCPCluster> = Api::namespaced(self.client.clone(), &key.namespace);
        ctx.run(api.get_opt(&key.name))
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: KIND_GCP_CLUSTER,
                namespace: key.namespace.clone(),
                name: key.name.clone(),
            })
    }

    async fn get_owner(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
    ) -> Result<Option<Cluster>> {
        let Some(owner_name) = owner_cluster_name(cluster) else {
            return Ok(None);
        };

        let namespace = cluster.namespace().unwrap_or_default();
        debug!(cluster = %ctx.cluster, owner = %owner_name, "Fetching owner cluster");

        let api: Api<Cluster> = Api::namespaced(self.client.clone(), &namespace);
        match ctx.run(api.get_opt(&owner_name)).await? {
            Some(owner) => Ok(Some(owner)),
            None => Err(Error::OwnerNotFound {
                namespace,
                name: owner_name,
            }),
        }
    }

    async fn add_finalizer(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
        finalizer: &str,
    ) -> Result<()> {
        let Some(finalizers) = finalizers_with(cluster, finalizer) else {
            return Ok(());
        };

        info!("Adding finalizer {} to {} {}", finalizer, KIND_GCP_CLUSTER, ctx.cluster);
        self.patch_finalizers(ctx, cluster, finalizers).await?;
        info!(
            "Successfully added finalizer {} to {} {}",
            finalizer, KIND_GCP_CLUSTER, ctx.cluster
        );
        Ok(())
    }

    async fn remove_finalizer(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
        finalizer: &str,
    ) -> Result<()> {
        let Some(finalizers) = finalizers_without(cluster, finalizer) else {
            return Ok(());
        };

        info!(
            "Removing finalizer {} from {} {}",
            finalizer, KIND_GCP_CLUSTER, ctx.cluster
        );
        self.patch_finalizers(ctx, cluster, finalizers).await?;
        info!(
            "Successfully removed finalizer {} from {} {}",
            finalizer, KIND_GCP_CLUSTER, ctx.cluster
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "cluster_store_tests.rs"]
mod cluster_store_tests;
