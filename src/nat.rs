// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Resolution of the management cluster's NAT IPs.
//!
//! Traffic from the management cluster to workload API servers leaves through the
//! Cloud NAT gateway of its router, so the external addresses of that gateway must
//! be allowed by every API security policy.
//!
//! Two strategies are supported ([`NatIpStrategy`]):
//! - [`NatIpStrategy::RouterNatIps`] reads the gateway's address list from the router
//!   and fetches each address by name
//! - [`NatIpStrategy::AddressUsers`] lists every address of the region and keeps those
//!   used by the router
//!
//! Either way an empty result is an error: the NAT rule is mandatory.

use std::sync::Arc;

use async_trait::async_trait;
use clap::ValueEnum;
use tracing::{debug, info};

use crate::cluster_store::{ClusterStore, ObjectKey};
use crate::constants::ADDRESS_LIST_PAGE_SIZE;
use crate::context::RequestContext;
use crate::errors::{Error, Result};
use crate::gcp::types::{Address, Router};
use crate::gcp::{resource_name, ComputeClient};

/// Resolves the NAT IPs of a cluster.
#[async_trait]
pub trait ClusterNatIpResolver: Send + Sync {
    /// External IPs of the cluster's NAT gateway, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RouterNotReady`] if the cluster has no router yet and
    /// [`Error::NoNatIps`] if the gateway has no addresses.
    async fn get_ips(&self, ctx: &RequestContext, cluster: &ObjectKey) -> Result<Vec<String>>;
}

/// How NAT addresses are discovered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum NatIpStrategy {
    /// Fetch each address referenced by the router's NAT gateways
    #[default]
    RouterNatIps,
    /// List the region's addresses and keep those used by the router
    AddressUsers,
}

/// [`ClusterNatIpResolver`] reading routers and addresses from the Compute API.
#[derive(Clone)]
pub struct IpResolver {
    clusters: Arc<dyn ClusterStore>,
    compute: ComputeClient,
    strategy: NatIpStrategy,
}

impl IpResolver {
    pub fn new(
        clusters: Arc<dyn ClusterStore>,
        compute: ComputeClient,
        strategy: NatIpStrategy,
    ) -> Self {
        Self {
            clusters,
            compute,
            strategy,
        }
    }

    async fn router_nat_ips(
        &self,
        ctx: &RequestContext,
        project: &str,
        region: &str,
        router: &Router,
    ) -> Result<Vec<String>> {
        let mut ips = Vec::new();
        for nat_ip in router.nats.iter().flat_map(|nat| &nat.nat_ips) {
            let path = format!(
                "projects/{project}/regions/{region}/addresses/{}",
                resource_name(nat_ip)
            );
            let address: Address = ctx.run(self.compute.get(&path)).await?;
            if !address.address.is_empty() {
                ips.push(address.address);
            }
        }
        Ok(ips)
    }

    async fn address_users(
        &self,
        ctx: &RequestContext,
        project: &str,
        region: &str,
        router: &Router,
    ) -> Result<Vec<String>> {
        let path = format!("projects/{project}/regions/{region}/addresses");
        let addresses: Vec<Address> = ctx
            .run(self.compute.list_all(&path, ADDRESS_LIST_PAGE_SIZE))
            .await?;

        Ok(addresses
            .into_iter()
            .filter(|address| address.users.iter().any(|user| *user == router.self_link))
            .map(|address| address.address)
            .collect())
    }
}

#[async_trait]
impl ClusterNatIpResolver for IpResolver {
    async fn get_ips(&self, ctx: &RequestContext, key: &ObjectKey) -> Result<Vec<String>> {
        let cluster = self.clusters.get(ctx, key).await?;

        let Some(router_link) = cluster.router_self_link() else {
            return Err(Error::RouterNotReady {
                namespace: key.namespace.clone(),
                name: key.name.clone(),
            });
        };

        let project = cluster.spec.project.as_str();
        let region = cluster.spec.region.as_str();
        let path = format!(
            "projects/{project}/regions/{region}/routers/{}",
            resource_name(router_link)
        );
        let router: Router = ctx.run(self.compute.get(&path)).await?;

        debug!(
            cluster = %ctx.cluster,
            management_cluster = %key,
            router = %router.name,
            strategy = ?self.strategy,
            "Resolving NAT IPs"
        );

        let ips = match self.strategy {
            NatIpStrategy::RouterNatIps => {
                self.router_nat_ips(ctx, project, region, &router).await?
            }
            NatIpStrategy::AddressUsers => {
                self.address_users(ctx, project, region, &router).await?
            }
        };

        if ips.is_empty() {
            return Err(Error::NoNatIps {
                namespace: key.namespace.clone(),
                name: key.name.clone(),
            });
        }

        info!(
            cluster = %ctx.cluster,
            management_cluster = %key,
            count = ips.len(),
            "Resolved management cluster NAT IPs"
        );
        Ok(ips)
    }
}

#[cfg(test)]
#[path = "nat_tests.rs"]
mod nat_tests;
