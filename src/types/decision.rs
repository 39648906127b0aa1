//! The single record returned by the engine per evaluation (spec §3 "Policy Decision").

use super::ids::{ApprovalRequestId, PolicyId};
use super::policy::{Effect, RuleConstraints};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Uniquely identifies which pipeline stage produced a [`PolicyDecision`] (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    KillSwitchTripped,
    RateLimitExceeded,
    RuleAllowed,
    RuleDenied,
    /// Reserved: the reference implementation never emits this reason (see DESIGN.md).
    ApprovalRequired,
    ApprovalPending,
    ApprovalDenied,
    DefaultEffect,
    NoMatchingRules,
    EvaluationError,
}

/// Opaque result from the kill-switch collaborator, echoed onto the decision when that stage
/// runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillSwitchOutcome {
    pub tripped: bool,
    pub switch: Option<String>,
    pub reason: Option<String>,
    pub check_duration_ms: f64,
}

/// Opaque result from the rate-limiter collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitOutcome {
    pub allowed: bool,
    pub policy: Option<String>,
    pub usage: Option<f64>,
    pub retry_after_ms: Option<u64>,
    pub check_duration_ms: f64,
}

/// Echoes the caller-supplied trace identifiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trace {
    pub request_id: Option<String>,
    pub episode_id: Option<String>,
}

/// The single structured decision returned by [`crate::engine::PolicyEngine::evaluate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub effect: Effect,
    pub reason: DecisionReason,
    pub message: String,
    pub policy_id: Option<PolicyId>,
    pub rule_id: Option<String>,
    pub rule_name: Option<String>,
    pub kill_switch: Option<KillSwitchOutcome>,
    pub rate_limit: Option<RateLimitOutcome>,
    pub approval_request_id: Option<ApprovalRequestId>,
    pub approval_status: Option<String>,
    pub constraints: Option<RuleConstraints>,
    pub evaluation_duration_ms: f64,
    pub decided_at: DateTime<Utc>,
    pub trace: Trace,
}

impl PolicyDecision {
    /// Builds a base decision for an effect/reason pair; callers fill in stage-specific fields.
    /// Enforces invariant 1 (spec §3): `allowed == (effect == allow)`.
    pub fn new(effect: Effect, reason: DecisionReason, message: impl Into<String>) -> Self {
        Self {
            allowed: effect.is_allow(),
            effect,
            reason,
            message: message.into(),
            policy_id: None,
            rule_id: None,
            rule_name: None,
            kill_switch: None,
            rate_limit: None,
            approval_request_id: None,
            approval_status: None,
            constraints: None,
            evaluation_duration_ms: 0.0,
            decided_at: Utc::now(),
            trace: Trace::default(),
        }
    }

    pub fn deny(reason: DecisionReason, message: impl Into<String>) -> Self {
        Self::new(Effect::Deny, reason, message)
    }

    pub fn allow(reason: DecisionReason, message: impl Into<String>) -> Self {
        Self::new(Effect::Allow, reason, message)
    }

    pub fn evaluation_error(message: impl std::fmt::Display) -> Self {
        Self::deny(
            DecisionReason::EvaluationError,
            format!("Evaluation error: {message}"),
        )
    }

    pub fn with_trace(mut self, request_id: Option<String>, episode_id: Option<String>) -> Self {
        self.trace = Trace {
            request_id,
            episode_id,
        };
        self
    }
}
