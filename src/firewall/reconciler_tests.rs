// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `firewall/reconciler.rs`

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::constants::ANNOTATION_BASTION_ALLOWLIST;
    use crate::context::RequestContext;
    use crate::errors::{Error, ErrorKind};
    use crate::firewall::{Allowed, Direction};
    use crate::testing::{ClusterBuilder, Harness};

    fn ctx() -> RequestContext {
        RequestContext::background("org-acme/wc1")
    }

    fn as_set(values: &[String]) -> BTreeSet<&str> {
        values.iter().map(String::as_str).collect()
    }

    #[tokio::test]
    async fn test_rule_shape() {
        let harness = Harness::new(&[]);
        let reconciler = harness.rule_reconciler(&["10.0.0.0/8"]);
        let cluster = ClusterBuilder::ready("wc1").build();

        reconciler.reconcile(&ctx(), &cluster).await.unwrap();

        let rule = harness.firewall.last_applied();
        assert_eq!(rule.name, "allow-wc1-bastion-ssh");
        assert_eq!(rule.description, "allow port 22 for SSH");
        assert_eq!(rule.direction, Direction::Ingress);
        assert_eq!(
            rule.allowed,
            vec![Allowed {
                ip_protocol: "tcp".to_string(),
                ports: vec![22],
            }]
        );
        assert_eq!(rule.target_tags, vec!["wc1-bastion"]);
    }

    #[tokio::test]
    async fn test_no_annotation_uses_exactly_default_list() {
        let harness = Harness::new(&[]);
        let reconciler = harness.rule_reconciler(&["192.168.0.0/24", "172.158.0.0/24"]);
        let cluster = ClusterBuilder::ready("wc1").build();

        reconciler.reconcile(&ctx(), &cluster).await.unwrap();

        assert_eq!(
            harness.firewall.last_applied().source_ranges,
            vec!["192.168.0.0/24", "172.158.0.0/24"]
        );
    }

    #[tokio::test]
    async fn test_annotation_is_merged_with_default_list() {
        let harness = Harness::new(&[]);
        let reconciler = harness.rule_reconciler(&["192.168.0.0/24", "172.158.0.0/24"]);
        let cluster = ClusterBuilder::ready("wc1")
            .annotation(ANNOTATION_BASTION_ALLOWLIST, "128.0.0.0/24,192.168.0.0/24")
            .build();

        reconciler.reconcile(&ctx(), &cluster).await.unwrap();

        let rule = harness.firewall.last_applied();
        assert_eq!(
            as_set(&rule.source_ranges),
            BTreeSet::from(["128.0.0.0/24", "192.168.0.0/24", "172.158.0.0/24"])
        );
    }

    #[tokio::test]
    async fn test_invalid_annotation_applies_nothing() {
        let harness = Harness::new(&[]);
        let reconciler = harness.rule_reconciler(&["10.0.0.0/8"]);
        let cluster = ClusterBuilder::ready("wc1")
            .annotation(ANNOTATION_BASTION_ALLOWLIST, "128.0.0.0/24,random-string")
            .build();

        let err = reconciler.reconcile(&ctx(), &cluster).await.unwrap_err();

        assert!(matches!(err, Error::InvalidCidrList { .. }));
        assert!(harness.calls().is_empty());
    }

    #[tokio::test]
    async fn test_blank_annotation_is_validation_error() {
        let harness = Harness::new(&[]);
        let reconciler = harness.rule_reconciler(&["10.0.0.0/8"]);
        let cluster = ClusterBuilder::ready("wc1")
            .annotation(ANNOTATION_BASTION_ALLOWLIST, "")
            .build();

        let err = reconciler.reconcile(&ctx(), &cluster).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(harness.calls().is_empty());
    }

    #[tokio::test]
    async fn test_client_error_is_propagated() {
        let harness = Harness::new(&[]);
        harness
            .firewall
            .failures
            .fail_once("apply_rule", Error::invalid_policy("boom"));
        let reconciler = harness.rule_reconciler(&["10.0.0.0/8"]);
        let cluster = ClusterBuilder::ready("wc1").build();

        let err = reconciler.reconcile(&ctx(), &cluster).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_delete_by_deterministic_name() {
        let harness = Harness::new(&[]);
        let reconciler = harness.rule_reconciler(&[]);
        let cluster = ClusterBuilder::ready("wc1").deleting().build();

        reconciler.reconcile_delete(&ctx(), &cluster).await.unwrap();

        assert_eq!(
            *harness.firewall.deleted.lock().unwrap(),
            vec!["allow-wc1-bastion-ssh"]
        );
    }
}
