// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! [`SecurityPolicyClient`] backed by the Compute Engine securityPolicies and
//! backendServices APIs.
//!
//! Apply creates the policy with all its rules. If it already exists, the remote
//! rules are diffed by priority (see [`super::diff`]) and only the differences are
//! sent. Either way the policy is then bound to the cluster's API backend service.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use super::diff::{plan, RuleOperation};
use super::{Policy, PolicyRule, SecurityPolicyClient};
use crate::constants::SECURITY_POLICY_VERSIONED_EXPR;
use crate::context::RequestContext;
use crate::crd::GCPCluster;
use crate::errors::{Error, Result};
use crate::gcp::types::{
    SecurityPolicy, SecurityPolicyReference, SecurityPolicyRule, SecurityPolicyRuleMatcher,
    SecurityPolicyRuleMatcherConfig,
};
use crate::gcp::{resource_name, ComputeClient};
use crate::metrics;

const POLICY_RESOURCE: &str = "security_policy";
const RULE_RESOURCE: &str = "security_policy_rule";

/// Security policy client talking to the Compute Engine REST API.
#[derive(Clone, Debug)]
pub struct GcpSecurityPolicyClient {
    compute: ComputeClient,
}

impl GcpSecurityPolicyClient {
    pub fn new(compute: ComputeClient) -> Self {
        Self { compute }
    }

    /// Create the policy, or update it if it already exists. Returns its self-link.
    async fn create_or_update(
        &self,
        ctx: &RequestContext,
        project: &str,
        desired: &SecurityPolicy,
    ) -> Result<String> {
        let created = ctx
            .run(self.compute.post(&policies_path(project), &[], desired))
            .await;

        let op = match created {
            Ok(op) => op,
            Err(Error::Gcp(e)) if e.is_conflict() => {
                info!(
                    cluster = %ctx.cluster,
                    name = %desired.name,
                    "Security policy already exists. Updating"
                );
                return self.update(ctx, project, desired).await;
            }
            Err(e) => return Err(e),
        };

        match ctx.run(self.compute.wait_operation(project, op)).await {
            Ok(()) => {}
            Err(Error::Gcp(e)) if e.is_conflict() => {
                return self.update(ctx, project, desired).await;
            }
            Err(e) => return Err(e),
        }
        metrics::record_cloud_mutation(POLICY_RESOURCE, "created");

        // Only the stored policy carries the self-link.
        let stored = self.get(ctx, project, &desired.name).await?;
        self_link(stored)
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        project: &str,
        desired: &SecurityPolicy,
    ) -> Result<String> {
        let current = self.get(ctx, project, &desired.name).await?;
        let operations = plan(&current.rules, &desired.rules);

        if operations.is_empty() {
            info!(cluster = %ctx.cluster, name = %desired.name, "Security policy is up to date");
        }

        for operation in &operations {
            self.apply_operation(ctx, project, &desired.name, operation)
                .await?;
        }

        self_link(current)
    }

    async fn apply_operation(
        &self,
        ctx: &RequestContext,
        project: &str,
        policy: &str,
        operation: &RuleOperation<'_>,
    ) -> Result<()> {
        let base = policy_path(project, policy);
        let priority = operation.priority();

        debug!(
            cluster = %ctx.cluster,
            name = %policy,
            priority,
            operation = ?operation,
            "Applying security policy rule operation"
        );

        let (op, recorded) = match operation {
            RuleOperation::Add(rule) => {
                let op = ctx
                    .run(self.compute.post(&format!("{base}/addRule"), &[], *rule))
                    .await?;
                (op, "created")
            }
            RuleOperation::Patch(rule) => {
                let query = [("priority", priority.to_string())];
                let op = ctx
                    .run(self.compute.post(&format!("{base}/patchRule"), &query, *rule))
                    .await?;
                (op, "updated")
            }
            RuleOperation::Remove(_) => {
                let query = [("priority", priority.to_string())];
                let op = ctx
                    .run(self.compute.post(&format!("{base}/removeRule"), &query, &json!({})))
                    .await?;
                (op, "deleted")
            }
        };

        ctx.run(self.compute.wait_operation(project, op)).await?;
        metrics::record_cloud_mutation(RULE_RESOURCE, recorded);
        Ok(())
    }

    async fn get(&self, ctx: &RequestContext, project: &str, name: &str) -> Result<SecurityPolicy> {
        ctx.run(self.compute.get(&policy_path(project, name))).await
    }

    /// Point the backend service at the policy. Repeating the call is harmless.
    async fn bind(
        &self,
        ctx: &RequestContext,
        project: &str,
        backend_service: &str,
        policy_self_link: String,
    ) -> Result<()> {
        let path = format!(
            "projects/{project}/global/backendServices/{}/setSecurityPolicy",
            resource_name(backend_service)
        );
        let body = SecurityPolicyReference {
            security_policy: policy_self_link,
        };

        let op = ctx.run(self.compute.post(&path, &[], &body)).await?;
        ctx.run(self.compute.wait_operation(project, op)).await
    }
}

#[async_trait]
impl SecurityPolicyClient for GcpSecurityPolicyClient {
    async fn apply_policy(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
        policy: &Policy,
    ) -> Result<()> {
        info!(cluster = %ctx.cluster, name = %policy.name, "Applying security policy");

        let Some(backend_service) = cluster.backend_service_self_link() else {
            return Err(Error::MissingBackendService {
                cluster: ctx.cluster.clone(),
            });
        };
        policy.validate()?;

        let project = cluster.spec.project.as_str();
        let desired = to_gcp_security_policy(policy);

        let self_link = self.create_or_update(ctx, project, &desired).await?;
        self.bind(ctx, project, backend_service, self_link).await?;

        info!(cluster = %ctx.cluster, name = %policy.name, "Done applying security policy");
        Ok(())
    }

    async fn delete_policy(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
        name: &str,
    ) -> Result<()> {
        info!(cluster = %ctx.cluster, name = %name, "Deleting security policy");

        if cluster.has_backend_service_reference() {
            return Err(Error::BackendServiceStillAttached {
                cluster: ctx.cluster.clone(),
            });
        }

        let project = cluster.spec.project.as_str();
        let op = match ctx.run(self.compute.delete(&policy_path(project, name))).await {
            Ok(op) => op,
            Err(e) if e.is_not_found() => {
                info!(cluster = %ctx.cluster, name = %name, "Security policy already deleted");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match ctx.run(self.compute.wait_operation(project, op)).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        metrics::record_cloud_mutation(POLICY_RESOURCE, "deleted");
        info!(cluster = %ctx.cluster, name = %name, "Done deleting security policy");
        Ok(())
    }
}

fn policies_path(project: &str) -> String {
    format!("projects/{project}/global/securityPolicies")
}

fn policy_path(project: &str, name: &str) -> String {
    format!("projects/{project}/global/securityPolicies/{name}")
}

fn self_link(policy: SecurityPolicy) -> Result<String> {
    policy
        .self_link
        .filter(|link| !link.is_empty())
        .ok_or_else(|| {
            Error::invalid_policy(format!("security policy {} has no self link", policy.name))
        })
}

fn to_gcp_rule(rule: &PolicyRule) -> SecurityPolicyRule {
    SecurityPolicyRule {
        action: rule.action.as_str().to_string(),
        description: rule.description.clone(),
        priority: rule.priority,
        matcher: SecurityPolicyRuleMatcher {
            versioned_expr: SECURITY_POLICY_VERSIONED_EXPR.to_string(),
            config: SecurityPolicyRuleMatcherConfig {
                src_ip_ranges: rule.source_ranges.clone(),
            },
        },
    }
}

/// Wire representation of a policy: the default rule followed by the explicit rules.
pub(crate) fn to_gcp_security_policy(policy: &Policy) -> SecurityPolicy {
    let rules = std::iter::once(policy.default_rule())
        .chain(policy.rules.iter().cloned())
        .map(|rule| to_gcp_rule(&rule))
        .collect();

    SecurityPolicy {
        name: policy.name.clone(),
        description: policy.description.clone(),
        self_link: None,
        rules,
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;
