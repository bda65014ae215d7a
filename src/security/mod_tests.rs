// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `security/mod.rs`

#[cfg(test)]
mod tests {
    use crate::errors::Error;
    use crate::security::{api_policy_name, Policy, PolicyAction, PolicyRule};

    fn rule(priority: i32, ranges: &[&str]) -> PolicyRule {
        PolicyRule {
            action: PolicyAction::Allow,
            description: format!("rule {priority}"),
            source_ranges: ranges.iter().map(|r| (*r).to_string()).collect(),
            priority,
        }
    }

    fn policy(rules: Vec<PolicyRule>) -> Policy {
        Policy {
            name: "allow-wc1-apiserver".to_string(),
            description: "test".to_string(),
            default_action: PolicyAction::Deny403,
            rules,
        }
    }

    #[test]
    fn test_action_values() {
        assert_eq!(PolicyAction::Allow.as_str(), "allow");
        assert_eq!(PolicyAction::Deny403.to_string(), "deny(403)");
    }

    #[test]
    fn test_policy_name() {
        assert_eq!(api_policy_name("wc1"), "allow-wc1-apiserver");
    }

    #[test]
    fn test_default_rule_carries_default_action() {
        let default = policy(vec![]).default_rule();
        assert_eq!(default.priority, i32::MAX);
        assert_eq!(default.action, PolicyAction::Deny403);
        assert_eq!(default.source_ranges, vec!["*"]);
        assert_eq!(default.description, "Default rule, higher priority overrides it");
    }

    #[test]
    fn test_validate_accepts_tiered_rules() {
        let p = policy(vec![
            rule(0, &["10.0.0.0/24"]),
            rule(1, &["10.1.1.24"]),
            rule(2, &["10.128.0.0/24"]),
        ]);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let mut p = policy(vec![]);
        p.name.clear();
        assert!(matches!(p.validate(), Err(Error::InvalidPolicy { .. })));
    }

    #[test]
    fn test_validate_rejects_duplicate_priority() {
        let p = policy(vec![rule(1, &["10.0.0.0/24"]), rule(1, &["10.1.0.0/24"])]);
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate rule priority 1"));
    }

    #[test]
    fn test_validate_rejects_reserved_priority() {
        let p = policy(vec![rule(i32::MAX, &["10.0.0.0/24"])]);
        assert!(matches!(p.validate(), Err(Error::InvalidPolicy { .. })));
    }

    #[test]
    fn test_validate_rejects_rule_without_ranges() {
        let p = policy(vec![rule(2, &[])]);
        assert!(matches!(p.validate(), Err(Error::InvalidPolicy { .. })));
    }
}
