//! Best-effort audit emission (spec §4.6). The emitted record is a side channel: constructing or
//! delivering it must never affect the decision already computed, so every handler error is
//! logged and swallowed (spec invariant: "audit failures are non-fatal").

use crate::rules::RuleMatchResult;
use crate::types::{EvaluationContext, PolicyDecision, PolicyId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One rule considered during evaluation, win or lose, recorded for the audit trail
/// (spec §4.6 "matchedRules").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditedRule {
    pub rule_id: String,
    pub rule_name: String,
    pub effect: crate::types::Effect,
    pub matched: bool,
    pub policy_id: Option<PolicyId>,
}

impl AuditedRule {
    pub fn from_match(result: &RuleMatchResult, policy_id: PolicyId) -> Self {
        Self {
            rule_id: result.rule.id.clone(),
            rule_name: result.rule.name.clone(),
            effect: result.rule.effect,
            matched: result.matched,
            policy_id: Some(policy_id),
        }
    }
}

/// The record handed to an [`AuditHandler`] after every evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    #[serde(rename = "type")]
    pub record_type: &'static str,
    pub timestamp: DateTime<Utc>,
    pub context: EvaluationContext,
    pub decision: PolicyDecision,
    #[serde(rename = "matchedRules")]
    pub matched_rules: Vec<AuditedRule>,
}

/// A pluggable sink for audit records (e.g. writing to a log stream or message queue). Matches
/// the teacher's collaborator-trait shape in `integrations/policy_engine`.
#[async_trait]
pub trait AuditHandler: Send + Sync {
    async fn handle(&self, record: AuditRecord) -> crate::error::Result<()>;
}

/// Emits audit records best-effort: any handler failure is logged and discarded.
pub struct AuditEmitter {
    handler: Option<Box<dyn AuditHandler>>,
}

impl AuditEmitter {
    pub fn new(handler: Option<Box<dyn AuditHandler>>) -> Self {
        Self { handler }
    }

    pub fn disabled() -> Self {
        Self { handler: None }
    }

    /// Builds and dispatches an audit record. Never returns an error to the caller; a handler
    /// failure is logged at `warn` and otherwise ignored.
    pub async fn emit(
        &self,
        context: &EvaluationContext,
        decision: &PolicyDecision,
        matched_rules: Vec<AuditedRule>,
    ) {
        let Some(handler) = &self.handler else {
            return;
        };

        let record = AuditRecord {
            record_type: "policy_evaluation",
            timestamp: Utc::now(),
            context: context.clone(),
            decision: decision.clone(),
            matched_rules,
        };

        if let Err(err) = handler.handle(record).await {
            tracing::warn!(error = %err, "audit handler failed; evaluation result unaffected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DecisionReason, Effect};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FailingHandler;

    #[async_trait]
    impl AuditHandler for FailingHandler {
        async fn handle(&self, _record: AuditRecord) -> crate::error::Result<()> {
            Err(crate::error::AuthzError::Internal("boom".to_string()))
        }
    }

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl AuditHandler for CountingHandler {
        async fn handle(&self, _record: AuditRecord) -> crate::error::Result<()> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    #[tokio::test]
    async fn failing_handler_does_not_propagate() {
        let emitter = AuditEmitter::new(Some(Box::new(FailingHandler)));
        let ctx = EvaluationContext::new("client", "post:publish", "social:meta");
        let decision = PolicyDecision::allow(DecisionReason::RuleAllowed, "ok");
        emitter.emit(&ctx, &decision, vec![]).await;
    }

    #[tokio::test]
    async fn disabled_emitter_is_a_no_op() {
        let emitter = AuditEmitter::disabled();
        let ctx = EvaluationContext::new("client", "post:publish", "social:meta");
        let decision = PolicyDecision::allow(DecisionReason::RuleAllowed, "ok");
        emitter.emit(&ctx, &decision, vec![]).await;
    }

    #[tokio::test]
    async fn handler_is_invoked_exactly_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let emitter = AuditEmitter::new(Some(Box::new(CountingHandler(count.clone()))));
        let ctx = EvaluationContext::new("client", "post:publish", "social:meta");
        let decision = PolicyDecision::allow(DecisionReason::RuleAllowed, "ok");
        emitter.emit(&ctx, &decision, vec![]).await;
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
