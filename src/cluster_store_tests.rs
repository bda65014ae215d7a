// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `cluster_store.rs`

#[cfg(test)]
mod tests {
    use crate::cluster_store::{finalizers_with, finalizers_without, owner_cluster_name, ObjectKey};
    use crate::constants::FINALIZER_FIREWALL;
    use crate::crd::GCPCluster;
    use crate::testing::ClusterBuilder;
    use serde_json::json;

    fn with_owner(api_version: &str, kind: &str) -> GCPCluster {
        serde_json::from_value(json!({
            "apiVersion": "infrastructure.cluster.x-k8s.io/v1beta1",
            "kind": "GCPCluster",
            "metadata": {
                "name": "wc1",
                "namespace": "org-acme",
                "ownerReferences": [{
                    "apiVersion": api_version,
                    "kind": kind,
                    "name": "owner",
                    "uid": "uid-1"
                }]
            },
            "spec": {"project": "p"}
        }))
        .unwrap()
    }

    #[test]
    fn test_object_key_display() {
        assert_eq!(ObjectKey::new("org-acme", "wc1").to_string(), "org-acme/wc1");
    }

    #[test]
    fn test_object_key_of_cluster() {
        let cluster = ClusterBuilder::new("wc1").build();
        assert_eq!(ObjectKey::of(&cluster), ObjectKey::new("org-acme", "wc1"));
    }

    #[test]
    fn test_owner_cluster_name_from_capi_cluster() {
        let cluster = with_owner("cluster.x-k8s.io/v1beta1", "Cluster");
        assert_eq!(owner_cluster_name(&cluster).as_deref(), Some("owner"));
    }

    #[test]
    fn test_owner_ignores_other_groups_and_kinds() {
        assert_eq!(owner_cluster_name(&with_owner("example.com/v1", "Cluster")), None);
        assert_eq!(
            owner_cluster_name(&with_owner("cluster.x-k8s.io/v1beta1", "MachineDeployment")),
            None
        );
    }

    #[test]
    fn test_owner_absent() {
        assert_eq!(owner_cluster_name(&ClusterBuilder::new("wc1").build()), None);
    }

    #[test]
    fn test_finalizers_with_appends_once() {
        let cluster = ClusterBuilder::new("wc1").finalizer("other").build();
        assert_eq!(
            finalizers_with(&cluster, FINALIZER_FIREWALL),
            Some(vec!["other".to_string(), FINALIZER_FIREWALL.to_string()])
        );

        let cluster = ClusterBuilder::new("wc1").finalizer(FINALIZER_FIREWALL).build();
        assert_eq!(finalizers_with(&cluster, FINALIZER_FIREWALL), None);
    }

    #[test]
    fn test_finalizers_without_keeps_others() {
        let cluster = ClusterBuilder::new("wc1")
            .finalizer("other")
            .finalizer(FINALIZER_FIREWALL)
            .build();
        assert_eq!(
            finalizers_without(&cluster, FINALIZER_FIREWALL),
            Some(vec!["other".to_string()])
        );

        let cluster = ClusterBuilder::new("wc1").finalizer("other").build();
        assert_eq!(finalizers_without(&cluster, FINALIZER_FIREWALL), None);
    }
}
