//! Policy and rule data model.

use super::condition::Condition;
use super::ids::PolicyId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Effect a matched rule (or a policy's default) asserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn is_allow(self) -> bool {
        matches!(self, Effect::Allow)
    }
}

/// Policy lifecycle status. Only `Active` policies are considered by the rule loop (§4.7 step 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    Draft,
    Active,
    Deprecated,
    Archived,
}

/// Policy scope — determines whether `client_id`/`agent_id` are required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyScope {
    Global,
    Client,
    Agent,
}

/// A named, versioned, scoped set of rules with a default effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub name: String,
    pub version: u32,
    pub status: PolicyStatus,
    pub scope: PolicyScope,
    pub client_id: Option<String>,
    pub agent_id: Option<String>,
    pub rules: Vec<PolicyRule>,
    pub default_effect: Effect,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    /// Cache key per §4.4: `(client_id, agent_id ∨ "")`, falling back to `"global"` when the
    /// policy carries no `client_id` (mirrors `putAll`'s `policy.clientId ?? "global"`).
    pub fn cache_key(&self) -> (String, String) {
        (
            self.client_id.clone().unwrap_or_else(|| "global".to_string()),
            self.agent_id.clone().unwrap_or_default(),
        )
    }
}

/// One clause of a policy mapping (actions × resources × conditions) to an effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub constraints: Option<RuleConstraints>,
}

fn default_enabled() -> bool {
    true
}

/// Optional side-effect constraints carried by a rule, projected onto the decision when it
/// matches (§3 "constraints").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleConstraints {
    pub rate_limit: Option<RateLimitConstraint>,
    #[serde(default)]
    pub require_approval: Option<ApprovalConstraint>,
    pub budget: Option<BudgetConstraint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConstraint {
    pub requests: u32,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConstraint {
    pub required_role: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConstraint {
    pub max_amount: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyMetadata(pub HashMap<String, String>);

/// A small set of illustrative starter policies for a tenant with nothing configured yet.
/// Convenience data only — never wired into the engine's decision path — mirroring the
/// teacher's own treatment of its bundled default-policies constant as sample data rather than
/// engine behavior.
pub fn default_policies() -> Vec<Policy> {
    let now = Utc::now();
    vec![Policy {
        id: PolicyId::new(),
        name: "default-allow-read-deny-write".to_string(),
        version: 1,
        status: PolicyStatus::Active,
        scope: PolicyScope::Global,
        client_id: None,
        agent_id: None,
        default_effect: Effect::Deny,
        created_at: now,
        updated_at: now,
        rules: vec![
            PolicyRule {
                id: "default-deny-destructive".to_string(),
                name: "deny destructive actions".to_string(),
                description: "deny delete/purge actions unless a more specific rule allows them"
                    .to_string(),
                enabled: true,
                effect: Effect::Deny,
                actions: vec!["delete:*".to_string(), "purge:*".to_string()],
                resources: vec!["*".to_string()],
                conditions: vec![],
                priority: 100,
                constraints: None,
            },
            PolicyRule {
                id: "default-allow-read".to_string(),
                name: "allow read-only actions".to_string(),
                description: "allow get/list/view actions on any resource".to_string(),
                enabled: true,
                effect: Effect::Allow,
                actions: vec!["get:*".to_string(), "list:*".to_string(), "view:*".to_string()],
                resources: vec!["*".to_string()],
                conditions: vec![],
                priority: 0,
                constraints: None,
            },
        ],
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(client_id: Option<&str>, agent_id: Option<&str>) -> Policy {
        Policy {
            id: PolicyId::new(),
            name: "p".to_string(),
            version: 1,
            status: PolicyStatus::Active,
            scope: PolicyScope::Client,
            client_id: client_id.map(str::to_string),
            agent_id: agent_id.map(str::to_string),
            rules: vec![],
            default_effect: Effect::Deny,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn cache_key_falls_back_to_global() {
        let p = policy(None, None);
        assert_eq!(p.cache_key(), ("global".to_string(), "".to_string()));
    }

    #[test]
    fn cache_key_uses_client_and_agent() {
        let p = policy(Some("acme"), Some("bot-1"));
        assert_eq!(p.cache_key(), ("acme".to_string(), "bot-1".to_string()));
    }

    #[test]
    fn default_policies_are_active_and_non_empty() {
        let policies = default_policies();
        assert!(!policies.is_empty());
        assert!(policies.iter().all(|p| p.status == PolicyStatus::Active));
        assert!(policies.iter().all(|p| !p.rules.is_empty()));
    }
}
