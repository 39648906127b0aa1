//! Evaluation context: the per-request bundle of tenant, action, resource, and ambient fields.

use super::value::FieldValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Input to [`crate::engine::PolicyEngine::evaluate`]. Immutable for the duration of a single
/// evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationContext {
    /// Tenant identifier. Required, non-empty.
    pub client_id: String,
    /// Colon-separated action token, e.g. `post:publish`. Required.
    pub action: String,
    /// Colon-separated resource token, e.g. `social:meta`. Required.
    pub resource: String,
    pub agent_id: Option<String>,
    pub platform: Option<String>,
    /// Defaults to "now at evaluation" when absent.
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
    pub episode_id: Option<String>,
    pub request_id: Option<String>,
}

impl EvaluationContext {
    pub fn new(
        client_id: impl Into<String>,
        action: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            action: action.into(),
            resource: resource.into(),
            agent_id: None,
            platform: None,
            timestamp: None,
            fields: BTreeMap::new(),
            episode_id: None,
            request_id: None,
        }
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// The effective timestamp used by time conditions and for the decision record: the
    /// context's own timestamp, or "now" if absent.
    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        self.timestamp.unwrap_or_else(Utc::now)
    }

    /// Validates required shape: non-empty `client_id`, `action`, `resource`.
    pub fn validate(&self) -> Result<(), String> {
        if self.client_id.trim().is_empty() {
            return Err("client_id is required and must be non-empty".to_string());
        }
        if self.action.trim().is_empty() {
            return Err("action is required and must be non-empty".to_string());
        }
        if self.resource.trim().is_empty() {
            return Err("resource is required and must be non-empty".to_string());
        }
        Ok(())
    }

    /// Resolves a field by the lookup order in spec §4.2:
    /// 1. known top-level fields, 2. direct key in `fields`, 3. dot-notation descent.
    pub fn resolve_field(&self, field: &str) -> Option<FieldValue> {
        match field {
            "clientId" | "client_id" => return Some(FieldValue::String(self.client_id.clone())),
            "agentId" | "agent_id" => {
                return self.agent_id.clone().map(FieldValue::String);
            }
            "action" => return Some(FieldValue::String(self.action.clone())),
            "resource" => return Some(FieldValue::String(self.resource.clone())),
            "platform" => return self.platform.clone().map(FieldValue::String),
            "timestamp" => {
                return Some(FieldValue::String(self.effective_timestamp().to_rfc3339()))
            }
            _ => {}
        }

        if let Some(value) = self.fields.get(field) {
            return Some(value.clone());
        }

        if field.contains('.') {
            let mut segments = field.split('.');
            let first = segments.next()?;
            let mut current = self.fields.get(first)?.clone();
            for segment in segments {
                let map = current.as_map()?;
                current = map.get(segment)?.clone();
            }
            return Some(current);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_required_fields() {
        let ctx = EvaluationContext::new("", "post:publish", "social:meta");
        assert!(ctx.validate().is_err());
    }

    #[test]
    fn resolve_field_descends_dot_notation() {
        let mut nested = BTreeMap::new();
        nested.insert("tier".to_string(), FieldValue::String("gold".to_string()));
        let ctx = EvaluationContext::new("c1", "post:publish", "social:meta")
            .with_field("account", FieldValue::Map(nested));
        assert_eq!(
            ctx.resolve_field("account.tier"),
            Some(FieldValue::String("gold".to_string()))
        );
        assert_eq!(ctx.resolve_field("account.missing"), None);
    }

    #[test]
    fn resolve_field_prefers_known_top_level_fields() {
        let ctx = EvaluationContext::new("c1", "post:publish", "social:meta")
            .with_field("client_id", FieldValue::String("other".to_string()));
        assert_eq!(
            ctx.resolve_field("client_id"),
            Some(FieldValue::String("c1".to_string()))
        );
    }
}
