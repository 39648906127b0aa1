//! End-to-end decision-pipeline scenarios against the public `PolicyEngine` API.

use async_trait::async_trait;
use authz_core::collaborators::{
    ApprovalGate, ApprovalRequest, ApprovalRequestInput, ApprovalStatus, KillSwitchQuery,
    KillSwitchService, PolicyProvider, RateLimitQuery, RateLimiterService,
};
use authz_core::engine::{EngineConfig, PolicyEngine};
use authz_core::error::Result;
use authz_core::types::{
    ApprovalConstraint, Condition, DecisionReason, Effect, EvaluationContext, FieldOperator,
    FieldValue, KillSwitchOutcome, Policy, PolicyId, PolicyRule, PolicyScope, PolicyStatus,
    RateLimitOutcome, RuleConstraints,
};
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn base_rule(name: &str, priority: i64, effect: Effect) -> PolicyRule {
    PolicyRule {
        id: name.to_string(),
        name: name.to_string(),
        description: String::new(),
        enabled: true,
        effect,
        actions: vec!["*".to_string()],
        resources: vec!["*".to_string()],
        conditions: vec![],
        priority,
        constraints: None,
    }
}

fn policy_with_rules(rules: Vec<PolicyRule>) -> Policy {
    Policy {
        id: PolicyId::new(),
        name: "test-policy".to_string(),
        version: 1,
        status: PolicyStatus::Active,
        scope: PolicyScope::Global,
        client_id: None,
        agent_id: None,
        rules,
        default_effect: Effect::Deny,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn ctx() -> EvaluationContext {
    EvaluationContext::new("client_123", "post:publish", "social:meta")
}

struct StaticProvider(Vec<Policy>);

#[async_trait]
impl PolicyProvider for StaticProvider {
    async fn get_policies_for_context(&self, _context: &EvaluationContext) -> Result<Vec<Policy>> {
        Ok(self.0.clone())
    }
}

struct TrippedKillSwitch;

#[async_trait]
impl KillSwitchService for TrippedKillSwitch {
    async fn is_tripped(&self, _query: KillSwitchQuery) -> Result<KillSwitchOutcome> {
        Ok(KillSwitchOutcome {
            tripped: true,
            switch: Some("emergency_stop".to_string()),
            reason: Some("manual override".to_string()),
            check_duration_ms: 0.0,
        })
    }
}

struct FailingProvider;

#[async_trait]
impl PolicyProvider for FailingProvider {
    async fn get_policies_for_context(&self, _context: &EvaluationContext) -> Result<Vec<Policy>> {
        Err(authz_core::error::CollaboratorError::PolicyProvider(
            "upstream unavailable".to_string(),
        )
        .into())
    }
}

#[tokio::test]
async fn s1_kill_switch_wins_over_allow_all() {
    let engine = PolicyEngine::builder()
        .policy_provider(Arc::new(StaticProvider(vec![policy_with_rules(vec![base_rule(
            "allow-all",
            0,
            Effect::Allow,
        )])])))
        .kill_switch(Arc::new(TrippedKillSwitch))
        .build();

    let decision = engine.evaluate(&ctx()).await;
    assert!(!decision.allowed);
    assert_eq!(decision.effect, Effect::Deny);
    assert_eq!(decision.reason, DecisionReason::KillSwitchTripped);
}

#[tokio::test]
async fn s2_priority_beats_ordering() {
    let policy = policy_with_rules(vec![
        base_rule("low", 10, Effect::Allow),
        base_rule("high", 100, Effect::Deny),
    ]);
    let engine = PolicyEngine::builder()
        .policy_provider(Arc::new(StaticProvider(vec![policy])))
        .build();

    let decision = engine.evaluate(&ctx()).await;
    assert!(!decision.allowed);
    assert_eq!(decision.rule_name.as_deref(), Some("high"));
    assert_eq!(decision.reason, DecisionReason::RuleDenied);
}

#[tokio::test]
async fn s3_platform_condition_gates_deny() {
    let mut deny_on_tiktok = base_rule("tiktok-deny", 100, Effect::Deny);
    deny_on_tiktok.conditions = vec![Condition::Field {
        field: "platform".to_string(),
        operator: FieldOperator::Equals,
        value: FieldValue::String("tiktok".to_string()),
    }];
    let allow_rest = base_rule("allow-rest", 10, Effect::Allow);
    let policy = policy_with_rules(vec![deny_on_tiktok, allow_rest]);

    let engine = PolicyEngine::builder()
        .policy_provider(Arc::new(StaticProvider(vec![policy])))
        .build();

    let tiktok_decision = engine.evaluate(&ctx().with_platform("tiktok")).await;
    assert!(!tiktok_decision.allowed);

    let facebook_decision = engine.evaluate(&ctx().with_platform("facebook")).await;
    assert!(facebook_decision.allowed);
    assert_eq!(facebook_decision.reason, DecisionReason::RuleAllowed);
}

#[tokio::test]
async fn s4_default_effect_on_empty_policy_set() {
    let deny_engine = PolicyEngine::builder().build();
    let decision = deny_engine.evaluate(&ctx()).await;
    assert!(!decision.allowed);
    assert_eq!(decision.reason, DecisionReason::NoMatchingRules);

    let allow_engine = PolicyEngine::builder()
        .config(EngineConfig {
            default_effect: Effect::Allow,
            ..EngineConfig::default()
        })
        .build();
    let decision = allow_engine.evaluate(&ctx()).await;
    assert!(decision.allowed);
    assert_eq!(decision.reason, DecisionReason::NoMatchingRules);
}

#[tokio::test]
async fn s5_fail_closed_vs_fail_open_on_provider_error() {
    let fail_closed_engine = PolicyEngine::builder()
        .policy_provider(Arc::new(FailingProvider))
        .build();
    let decision = fail_closed_engine.evaluate(&ctx()).await;
    assert!(!decision.allowed);
    assert_eq!(decision.reason, DecisionReason::EvaluationError);

    let fail_open_engine = PolicyEngine::builder()
        .config(EngineConfig {
            fail_closed: false,
            ..EngineConfig::default()
        })
        .policy_provider(Arc::new(FailingProvider))
        .build();
    let result = fail_open_engine.try_evaluate(&ctx()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn s6_cache_hit_increments_hits_and_total_evaluations() {
    let engine = PolicyEngine::builder()
        .policy_provider(Arc::new(StaticProvider(vec![policy_with_rules(vec![base_rule(
            "allow-all",
            0,
            Effect::Allow,
        )])])))
        .build();

    engine.evaluate(&ctx()).await;
    engine.evaluate(&ctx()).await;

    let snapshot = engine.metrics_snapshot();
    assert_eq!(snapshot.total_evaluations, 2);
    assert!(snapshot.cache_hits > 0);
}

#[tokio::test]
async fn rate_limit_denial_short_circuits_rule_evaluation() {
    struct DenyingRateLimiter;
    #[async_trait]
    impl RateLimiterService for DenyingRateLimiter {
        async fn check(&self, _query: RateLimitQuery) -> Result<RateLimitOutcome> {
            Ok(RateLimitOutcome {
                allowed: false,
                policy: Some("per_minute".to_string()),
                usage: Some(1.0),
                retry_after_ms: Some(5_000),
                check_duration_ms: 0.0,
            })
        }
    }

    let engine = PolicyEngine::builder()
        .policy_provider(Arc::new(StaticProvider(vec![policy_with_rules(vec![base_rule(
            "allow-all",
            0,
            Effect::Allow,
        )])])))
        .rate_limiter(Arc::new(DenyingRateLimiter))
        .build();

    let decision = engine.evaluate(&ctx()).await;
    assert!(!decision.allowed);
    assert_eq!(decision.reason, DecisionReason::RateLimitExceeded);
    assert!(decision.rate_limit.is_some());
}

#[tokio::test]
async fn approval_required_rule_creates_a_pending_request() {
    struct RecordingApprovalGate {
        created: AtomicUsize,
    }

    #[async_trait]
    impl ApprovalGate for RecordingApprovalGate {
        async fn list_pending_requests(
            &self,
            _client_id: &str,
            _action_type: &str,
        ) -> Result<Vec<ApprovalRequest>> {
            Ok(Vec::new())
        }

        async fn create_request(&self, input: ApprovalRequestInput) -> Result<ApprovalRequest> {
            self.created.fetch_add(1, Ordering::Relaxed);
            Ok(ApprovalRequest {
                id: authz_core::types::ApprovalRequestId::new(),
                client_id: input.client_id,
                action_type: input.action_type,
                status: ApprovalStatus::Pending,
                required_role: input.required_role,
                created_at: Utc::now(),
                expires_at: Utc::now() + chrono::Duration::seconds(input.timeout_seconds as i64),
            })
        }
    }

    let mut rule = base_rule("needs-approval", 0, Effect::Allow);
    rule.constraints = Some(RuleConstraints {
        rate_limit: None,
        require_approval: Some(ApprovalConstraint {
            required_role: "admin".to_string(),
            timeout_seconds: 300,
        }),
        budget: None,
    });

    let gate = Arc::new(RecordingApprovalGate {
        created: AtomicUsize::new(0),
    });
    let engine = PolicyEngine::builder()
        .policy_provider(Arc::new(StaticProvider(vec![policy_with_rules(vec![rule])])))
        .approval_gate(gate.clone())
        .build();

    let decision = engine.evaluate(&ctx()).await;
    assert!(!decision.allowed);
    assert_eq!(decision.reason, DecisionReason::ApprovalPending);
    assert_eq!(decision.approval_status.as_deref(), Some("pending"));
    assert_eq!(gate.created.load(Ordering::Relaxed), 1);
}
