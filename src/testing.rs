// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory collaborators and object builders for unit tests.
//!
//! Every fake appends to a shared [`CallLog`] so tests can assert on the order of
//! calls across collaborators, and each can be told to fail its next call to an
//! operation with [`Failures::fail_once`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kube::ResourceExt;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::cluster_store::{owner_cluster_name, ClusterStore, ObjectKey};
use crate::context::RequestContext;
use crate::crd::{Cluster, GCPCluster};
use crate::errors::{Error, GcpError, Result};
use crate::firewall::{FirewallClient, FirewallRule, RuleReconciler};
use crate::nat::ClusterNatIpResolver;
use crate::reconcilers::GCPClusterReconciler;
use crate::security::{Policy, PolicyReconciler, SecurityPolicyClient};

pub const TEST_NAMESPACE: &str = "org-acme";
pub const TEST_PROJECT: &str = "test-project";
pub const TEST_REGION: &str = "europe-west3";
const COMPUTE: &str = "https://www.googleapis.com/compute/v1";

/// Ordered record of calls made to the fakes.
pub type CallLog = Arc<Mutex<Vec<String>>>;

fn record(log: &CallLog, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

/// Errors scripted to be returned by the next call to an operation.
#[derive(Default)]
pub struct Failures(Mutex<HashMap<&'static str, Error>>);

impl Failures {
    pub fn fail_once(&self, operation: &'static str, error: Error) {
        self.0.lock().unwrap().insert(operation, error);
    }

    fn take(&self, operation: &'static str) -> Result<()> {
        match self.0.lock().unwrap().remove(operation) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Builder for `GCPCluster` test objects.
pub struct ClusterBuilder {
    name: String,
    annotations: serde_json::Map<String, Value>,
    finalizers: Vec<String>,
    owner: Option<String>,
    deleting: bool,
    network: serde_json::Map<String, Value>,
}

impl ClusterBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            annotations: serde_json::Map::new(),
            finalizers: Vec::new(),
            owner: None,
            deleting: false,
            network: serde_json::Map::new(),
        }
    }

    /// Owned, with network and backend service reported: ready for the normal path.
    pub fn ready(name: &str) -> Self {
        Self::new(name).owner(name).network().backend_service()
    }

    pub fn annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), json!(value));
        self
    }

    pub fn finalizer(mut self, finalizer: &str) -> Self {
        self.finalizers.push(finalizer.to_string());
        self
    }

    pub fn owner(mut self, cluster_name: &str) -> Self {
        self.owner = Some(cluster_name.to_string());
        self
    }

    pub fn deleting(mut self) -> Self {
        self.deleting = true;
        self
    }

    pub fn network(mut self) -> Self {
        let link = format!("{COMPUTE}/projects/{TEST_PROJECT}/global/networks/{}", self.name);
        self.network.insert("selfLink".to_string(), json!(link));
        self
    }

    pub fn backend_service(mut self) -> Self {
        let link = format!(
            "{COMPUTE}/projects/{TEST_PROJECT}/global/backendServices/{}-api",
            self.name
        );
        self.network
            .insert("apiServerBackendService".to_string(), json!(link));
        self
    }

    /// Backend service reference present but blank, as during provider teardown.
    pub fn empty_backend_service(mut self) -> Self {
        self.network
            .insert("apiServerBackendService".to_string(), json!(""));
        self
    }

    pub fn without_backend_service(mut self) -> Self {
        self.network.remove("apiServerBackendService");
        self
    }

    pub fn router(mut self) -> Self {
        let link = format!(
            "{COMPUTE}/projects/{TEST_PROJECT}/regions/{TEST_REGION}/routers/{}-router",
            self.name
        );
        self.network.insert("router".to_string(), json!(link));
        self
    }

    pub fn build(self) -> GCPCluster {
        let mut metadata = json!({
            "name": self.name,
            "namespace": TEST_NAMESPACE,
            "annotations": self.annotations,
            "finalizers": self.finalizers,
        });
        if let Some(owner) = self.owner {
            metadata["ownerReferences"] = json!([{
                "apiVersion": "cluster.x-k8s.io/v1beta1",
                "kind": "Cluster",
                "name": owner,
                "uid": format!("{owner}-uid"),
            }]);
        }
        if self.deleting {
            metadata["deletionTimestamp"] = json!("2024-01-01T00:00:00Z");
        }

        serde_json::from_value(json!({
            "apiVersion": "infrastructure.cluster.x-k8s.io/v1beta1",
            "kind": "GCPCluster",
            "metadata": metadata,
            "spec": { "project": TEST_PROJECT, "region": TEST_REGION },
            "status": { "ready": true, "network": self.network },
        }))
        .unwrap()
    }
}

/// A failure answered by the Compute API with the given status.
pub fn api_error(status: StatusCode, message: &str) -> Error {
    Error::Gcp(GcpError::Api {
        status,
        message: message.to_string(),
        reason: None,
    })
}

/// A Cluster API `Cluster` in the test namespace.
pub fn owner_cluster(name: &str, paused: bool) -> Cluster {
    serde_json::from_value(json!({
        "apiVersion": "cluster.x-k8s.io/v1beta1",
        "kind": "Cluster",
        "metadata": { "name": name, "namespace": TEST_NAMESPACE },
        "spec": { "paused": paused },
    }))
    .unwrap()
}

/// In-memory [`ClusterStore`].
#[derive(Default)]
pub struct FakeClusterStore {
    clusters: Mutex<HashMap<ObjectKey, GCPCluster>>,
    owners: Mutex<HashMap<ObjectKey, Cluster>>,
    pub failures: Failures,
    log: CallLog,
}

impl FakeClusterStore {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            ..Self::default()
        }
    }

    pub fn insert(&self, cluster: GCPCluster) {
        self.clusters
            .lock()
            .unwrap()
            .insert(ObjectKey::of(&cluster), cluster);
    }

    pub fn insert_owner(&self, owner: Cluster) {
        let key = ObjectKey::new(owner.namespace().unwrap_or_default(), owner.name_any());
        self.owners.lock().unwrap().insert(key, owner);
    }

    /// Current finalizers of a stored cluster.
    pub fn finalizers(&self, key: &ObjectKey) -> Vec<String> {
        self.clusters
            .lock()
            .unwrap()
            .get(key)
            .map(|c| c.finalizers().to_vec())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ClusterStore for FakeClusterStore {
    async fn get(&self, ctx: &RequestContext, key: &ObjectKey) -> Result<GCPCluster> {
        ctx.check()?;
        record(&self.log, format!("store.get:{key}"));
        self.failures.take("get")?;
        self.clusters
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "GCPCluster",
                namespace: key.namespace.clone(),
                name: key.name.clone(),
            })
    }

    async fn get_owner(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
    ) -> Result<Option<Cluster>> {
        ctx.check()?;
        record(&self.log, "store.get_owner");
        self.failures.take("get_owner")?;
        let Some(owner_name) = owner_cluster_name(cluster) else {
            return Ok(None);
        };
        let key = ObjectKey::new(cluster.namespace().unwrap_or_default(), owner_name);
        match self.owners.lock().unwrap().get(&key) {
            Some(owner) => Ok(Some(owner.clone())),
            None => Err(Error::OwnerNotFound {
                namespace: key.namespace,
                name: key.name,
            }),
        }
    }

    async fn add_finalizer(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
        finalizer: &str,
    ) -> Result<()> {
        ctx.check()?;
        record(&self.log, "store.add_finalizer");
        self.failures.take("add_finalizer")?;
        if let Some(stored) = self.clusters.lock().unwrap().get_mut(&ObjectKey::of(cluster)) {
            let finalizers = stored.metadata.finalizers.get_or_insert_with(Vec::new);
            if !finalizers.iter().any(|f| f == finalizer) {
                finalizers.push(finalizer.to_string());
            }
        }
        Ok(())
    }

    async fn remove_finalizer(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
        finalizer: &str,
    ) -> Result<()> {
        ctx.check()?;
        record(&self.log, "store.remove_finalizer");
        self.failures.take("remove_finalizer")?;
        if let Some(stored) = self.clusters.lock().unwrap().get_mut(&ObjectKey::of(cluster)) {
            if let Some(finalizers) = stored.metadata.finalizers.as_mut() {
                finalizers.retain(|f| f != finalizer);
            }
        }
        Ok(())
    }
}

/// In-memory [`FirewallClient`].
#[derive(Default)]
pub struct FakeFirewallClient {
    pub applied: Mutex<Vec<FirewallRule>>,
    pub deleted: Mutex<Vec<String>>,
    pub failures: Failures,
    log: CallLog,
}

impl FakeFirewallClient {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            ..Self::default()
        }
    }

    pub fn last_applied(&self) -> FirewallRule {
        self.applied.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl FirewallClient for FakeFirewallClient {
    async fn apply_rule(
        &self,
        ctx: &RequestContext,
        _cluster: &GCPCluster,
        rule: &FirewallRule,
    ) -> Result<()> {
        ctx.check()?;
        record(&self.log, format!("firewall.apply:{}", rule.name));
        self.failures.take("apply_rule")?;
        self.applied.lock().unwrap().push(rule.clone());
        Ok(())
    }

    async fn delete_rule(
        &self,
        ctx: &RequestContext,
        _cluster: &GCPCluster,
        name: &str,
    ) -> Result<()> {
        ctx.check()?;
        record(&self.log, format!("firewall.delete:{name}"));
        self.failures.take("delete_rule")?;
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

/// In-memory [`SecurityPolicyClient`] enforcing the backend service preconditions.
#[derive(Default)]
pub struct FakeSecurityPolicyClient {
    pub applied: Mutex<Vec<Policy>>,
    pub deleted: Mutex<Vec<String>>,
    pub failures: Failures,
    log: CallLog,
}

impl FakeSecurityPolicyClient {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            ..Self::default()
        }
    }

    pub fn last_applied(&self) -> Policy {
        self.applied.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl SecurityPolicyClient for FakeSecurityPolicyClient {
    async fn apply_policy(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
        policy: &Policy,
    ) -> Result<()> {
        ctx.check()?;
        record(&self.log, format!("policy.apply:{}", policy.name));
        self.failures.take("apply_policy")?;
        if cluster.backend_service_self_link().is_none() {
            return Err(Error::MissingBackendService {
                cluster: ctx.cluster.clone(),
            });
        }
        self.applied.lock().unwrap().push(policy.clone());
        Ok(())
    }

    async fn delete_policy(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
        name: &str,
    ) -> Result<()> {
        ctx.check()?;
        record(&self.log, format!("policy.delete:{name}"));
        self.failures.take("delete_policy")?;
        if cluster.has_backend_service_reference() {
            return Err(Error::BackendServiceStillAttached {
                cluster: ctx.cluster.clone(),
            });
        }
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

/// [`ClusterNatIpResolver`] returning a fixed list.
#[derive(Default)]
pub struct FakeNatResolver {
    pub ips: Mutex<Vec<String>>,
    pub failures: Failures,
    log: CallLog,
}

impl FakeNatResolver {
    pub fn new(log: &CallLog, ips: &[&str]) -> Self {
        Self {
            ips: Mutex::new(ips.iter().map(|ip| (*ip).to_string()).collect()),
            log: log.clone(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ClusterNatIpResolver for FakeNatResolver {
    async fn get_ips(&self, ctx: &RequestContext, cluster: &ObjectKey) -> Result<Vec<String>> {
        ctx.check()?;
        record(&self.log, format!("nat.get_ips:{cluster}"));
        self.failures.take("get_ips")?;
        Ok(self.ips.lock().unwrap().clone())
    }
}

/// Management cluster used by the fakes.
pub fn management_cluster() -> ObjectKey {
    ObjectKey::new("giantswarm", "mc")
}

/// All fakes wired together, sharing one call log.
pub struct Harness {
    pub log: CallLog,
    pub store: Arc<FakeClusterStore>,
    pub firewall: Arc<FakeFirewallClient>,
    pub policy: Arc<FakeSecurityPolicyClient>,
    pub nat: Arc<FakeNatResolver>,
}

impl Harness {
    pub fn new(nat_ips: &[&str]) -> Self {
        let log = CallLog::default();
        Self {
            store: Arc::new(FakeClusterStore::new(&log)),
            firewall: Arc::new(FakeFirewallClient::new(&log)),
            policy: Arc::new(FakeSecurityPolicyClient::new(&log)),
            nat: Arc::new(FakeNatResolver::new(&log, nat_ips)),
            log,
        }
    }

    pub fn rule_reconciler(&self, default_bastion_allowlist: &[&str]) -> RuleReconciler {
        RuleReconciler::new(to_strings(default_bastion_allowlist), self.firewall.clone())
    }

    pub fn policy_reconciler(&self, default_api_allowlist: &[&str]) -> PolicyReconciler {
        PolicyReconciler::new(
            to_strings(default_api_allowlist),
            management_cluster(),
            self.policy.clone(),
            self.nat.clone(),
        )
    }

    pub fn reconciler(&self, require_router: bool) -> GCPClusterReconciler {
        GCPClusterReconciler::new(
            self.store.clone(),
            self.rule_reconciler(&["10.0.0.0/8"]),
            self.policy_reconciler(&["10.128.0.0/24"]),
            require_router,
        )
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Calls that change cloud resources or finalizers.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| {
                c.starts_with("firewall.")
                    || c.starts_with("policy.")
                    || c.contains("finalizer")
            })
            .collect()
    }
}

pub fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}
