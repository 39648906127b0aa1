//! Collaborator traits the engine delegates to: kill switch, rate limiter, approval gate, and
//! policy provider (spec §4, §6 "External Interfaces"). Each has a null-object default so
//! `PolicyEngine` never branches on `Option<Arc<dyn Trait>>` internally (spec §9 design note).

use crate::error::Result;
use crate::types::{ApprovalRequestId, EvaluationContext, KillSwitchOutcome, Policy, RateLimitOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inputs to [`KillSwitchService::is_tripped`] (spec §6).
#[derive(Debug, Clone)]
pub struct KillSwitchQuery {
    pub client_id: String,
    pub action: String,
    pub platform: Option<String>,
}

/// Inputs to [`RateLimiterService::check`] (spec §6).
#[derive(Debug, Clone)]
pub struct RateLimitQuery {
    pub client_id: String,
    pub platform: Option<String>,
    pub action: String,
}

/// A pending or resolved human-in-the-loop approval (spec §4 "Approval Gate").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: ApprovalRequestId,
    pub client_id: String,
    pub action_type: String,
    pub status: ApprovalStatus,
    pub required_role: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

/// Inputs to [`ApprovalGate::create_request`].
#[derive(Debug, Clone)]
pub struct ApprovalRequestInput {
    pub client_id: String,
    pub action_type: String,
    pub required_role: String,
    pub timeout_seconds: u64,
}

/// Queries whether a kill switch is tripped for a tenant/action/platform. Checked before rule
/// evaluation; a tripped switch denies unconditionally (spec §4.7 step 2).
#[async_trait]
pub trait KillSwitchService: Send + Sync {
    async fn is_tripped(&self, query: KillSwitchQuery) -> Result<KillSwitchOutcome>;
}

/// Checks whether a tenant/platform/action is within its rate limit (spec §4.7 step 3).
#[async_trait]
pub trait RateLimiterService: Send + Sync {
    async fn check(&self, query: RateLimitQuery) -> Result<RateLimitOutcome>;
}

/// Human-in-the-loop approval workflow (spec §4 "Approval Gate").
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn list_pending_requests(
        &self,
        client_id: &str,
        action_type: &str,
    ) -> Result<Vec<ApprovalRequest>>;

    async fn create_request(&self, input: ApprovalRequestInput) -> Result<ApprovalRequest>;
}

/// Supplies the active policy set for a tenant/agent (spec §4.7 step 5).
#[async_trait]
pub trait PolicyProvider: Send + Sync {
    async fn get_policies_for_context(&self, context: &EvaluationContext) -> Result<Vec<Policy>>;

    async fn get_policy_by_id(&self, _id: &str) -> Result<Option<Policy>> {
        Ok(None)
    }

    async fn invalidate_cache(&self, _client_id: &str) {}
}

/// Always reports "not tripped". The default when no kill-switch service is configured.
pub struct NullKillSwitch;

#[async_trait]
impl KillSwitchService for NullKillSwitch {
    async fn is_tripped(&self, _query: KillSwitchQuery) -> Result<KillSwitchOutcome> {
        Ok(KillSwitchOutcome {
            tripped: false,
            switch: None,
            reason: None,
            check_duration_ms: 0.0,
        })
    }
}

/// Always reports "within limit". The default when no rate limiter is configured.
pub struct NullRateLimiter;

#[async_trait]
impl RateLimiterService for NullRateLimiter {
    async fn check(&self, _query: RateLimitQuery) -> Result<RateLimitOutcome> {
        Ok(RateLimitOutcome {
            allowed: true,
            policy: None,
            usage: None,
            retry_after_ms: None,
            check_duration_ms: 0.0,
        })
    }
}

/// Never has pending requests and refuses to create new ones. The default when no approval gate
/// is configured; rules requiring approval fall through to their matched effect (see DESIGN.md).
pub struct NullApprovalGate;

#[async_trait]
impl ApprovalGate for NullApprovalGate {
    async fn list_pending_requests(
        &self,
        _client_id: &str,
        _action_type: &str,
    ) -> Result<Vec<ApprovalRequest>> {
        Ok(Vec::new())
    }

    async fn create_request(&self, _input: ApprovalRequestInput) -> Result<ApprovalRequest> {
        Err(crate::error::CollaboratorError::ApprovalGate(
            "no approval gate configured".to_string(),
        )
        .into())
    }
}

/// Supplies no policies for any context. The default when no policy provider is configured,
/// which drives every evaluation to `DefaultEffect` via the empty rule set (spec §4.7 step 6).
pub struct NullPolicyProvider;

#[async_trait]
impl PolicyProvider for NullPolicyProvider {
    async fn get_policies_for_context(&self, _context: &EvaluationContext) -> Result<Vec<Policy>> {
        Ok(Vec::new())
    }
}
