//! The policy engine: orchestrates validate → kill-switch → rate-limit → rules → approval →
//! decision (spec §4.7).

use crate::audit::{AuditedRule, AuditEmitter};
use crate::cache::{CacheConfig, PolicyCache};
use crate::collaborators::{
    ApprovalGate, ApprovalRequestInput, ApprovalStatus, KillSwitchQuery, KillSwitchService,
    NullApprovalGate, NullKillSwitch, NullPolicyProvider, NullRateLimiter, PolicyProvider,
    RateLimitQuery, RateLimiterService,
};
use crate::metrics::{MetricsSink, MetricsSnapshot};
use crate::rules;
use crate::types::{
    DecisionReason, Effect, EvaluationContext, PolicyDecision, PolicyStatus, RuleConstraints,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Engine-wide configuration (spec §4.7, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_true")]
    pub fail_closed: bool,
    #[serde(default = "default_effect")]
    pub default_effect: Effect,
    #[serde(default = "default_true")]
    pub enable_kill_switch: bool,
    #[serde(default = "default_true")]
    pub enable_rate_limit: bool,
    #[serde(default = "default_true")]
    pub enable_approval_gates: bool,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default = "default_timeout_ms")]
    pub evaluation_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}
fn default_effect() -> Effect {
    Effect::Deny
}
fn default_timeout_ms() -> u64 {
    5000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fail_closed: true,
            default_effect: Effect::Deny,
            enable_kill_switch: true,
            enable_rate_limit: true,
            enable_approval_gates: true,
            cache: CacheConfig::default(),
            evaluation_timeout_ms: default_timeout_ms(),
        }
    }
}

/// Builds a [`PolicyEngine`], substituting null-object collaborators for any that are never set
/// (spec §9 "Collaborators as interfaces").
pub struct PolicyEngineBuilder {
    config: EngineConfig,
    policy_provider: Option<Arc<dyn PolicyProvider>>,
    kill_switch: Option<Arc<dyn KillSwitchService>>,
    rate_limiter: Option<Arc<dyn RateLimiterService>>,
    approval_gate: Option<Arc<dyn ApprovalGate>>,
    audit: Option<AuditEmitter>,
}

impl Default for PolicyEngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            policy_provider: None,
            kill_switch: None,
            rate_limiter: None,
            approval_gate: None,
            audit: None,
        }
    }
}

impl PolicyEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn policy_provider(mut self, provider: Arc<dyn PolicyProvider>) -> Self {
        self.policy_provider = Some(provider);
        self
    }

    pub fn kill_switch(mut self, service: Arc<dyn KillSwitchService>) -> Self {
        self.kill_switch = Some(service);
        self
    }

    pub fn rate_limiter(mut self, service: Arc<dyn RateLimiterService>) -> Self {
        self.rate_limiter = Some(service);
        self
    }

    pub fn approval_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.approval_gate = Some(gate);
        self
    }

    pub fn audit(mut self, audit: AuditEmitter) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn build(self) -> PolicyEngine {
        PolicyEngine {
            cache: PolicyCache::new(self.config.cache.clone()),
            metrics: MetricsSink::default(),
            policy_provider: self.policy_provider.unwrap_or_else(|| Arc::new(NullPolicyProvider)),
            kill_switch: self.kill_switch.unwrap_or_else(|| Arc::new(NullKillSwitch)),
            rate_limiter: self.rate_limiter.unwrap_or_else(|| Arc::new(NullRateLimiter)),
            approval_gate: self.approval_gate.unwrap_or_else(|| Arc::new(NullApprovalGate)),
            audit: self.audit.unwrap_or_else(AuditEmitter::disabled),
            config: self.config,
        }
    }
}

/// The authorization engine. Safe for concurrent `evaluate` calls (spec §5).
pub struct PolicyEngine {
    config: EngineConfig,
    cache: PolicyCache,
    metrics: MetricsSink,
    policy_provider: Arc<dyn PolicyProvider>,
    kill_switch: Arc<dyn KillSwitchService>,
    rate_limiter: Arc<dyn RateLimiterService>,
    approval_gate: Arc<dyn ApprovalGate>,
    audit: AuditEmitter,
}

impl PolicyEngine {
    pub fn builder() -> PolicyEngineBuilder {
        PolicyEngineBuilder::new()
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics
            .snapshot(self.cache.hit_count(), self.cache.miss_count(), self.cache.size())
    }

    /// A single combined view of metrics, cache state, and the active configuration, suited to a
    /// status/health endpoint in an embedding application.
    pub fn statistics(&self) -> EngineStatistics {
        EngineStatistics {
            metrics: self.metrics_snapshot(),
            config: self.config.clone(),
        }
    }

    /// `evaluate(context).allowed` (spec §4.7 "Quick check").
    pub async fn is_allowed(&self, context: &EvaluationContext) -> bool {
        self.evaluate(context).await.allowed
    }

    /// Evaluates every context concurrently, preserving input order (spec §4.7 "Batch").
    pub async fn evaluate_batch(&self, contexts: &[EvaluationContext]) -> Vec<PolicyDecision> {
        join_all(contexts.iter().map(|context| self.evaluate(context))).await
    }

    /// Drops cached policies for `client_id` and notifies the policy provider, if it supports
    /// invalidation hints (spec §4.4: "also notify the policy provider if it supports
    /// invalidation hints").
    pub async fn invalidate(&self, client_id: &str) {
        self.cache.invalidate(client_id);
        self.policy_provider.invalidate_cache(client_id).await;
    }

    /// Runs the full decision pipeline for one context (spec §4.7). Always fail-closed,
    /// regardless of `config.fail_closed`: a stage error becomes a `deny/evaluation_error`
    /// decision rather than a propagated error. Use [`Self::try_evaluate`] to honor
    /// `fail_closed = false` and observe the underlying error.
    pub async fn evaluate(&self, context: &EvaluationContext) -> PolicyDecision {
        let start = Instant::now();
        self.metrics.record_start();

        let mut matched_rules: Vec<AuditedRule> = Vec::new();
        let decision = match self.run_pipeline_within_budget(context, &mut matched_rules).await {
            Ok(decision) => decision,
            Err(err) => PolicyDecision::evaluation_error(err),
        };

        self.finish(context, decision, matched_rules, start).await
    }

    /// Like [`Self::evaluate`], but when `config.fail_closed` is false a stage error is
    /// propagated to the caller instead of folded into a decision (spec §4.7 step 8, testable
    /// scenario S5).
    pub async fn try_evaluate(&self, context: &EvaluationContext) -> crate::error::Result<PolicyDecision> {
        let start = Instant::now();
        self.metrics.record_start();

        let mut matched_rules: Vec<AuditedRule> = Vec::new();
        let decision = match self.run_pipeline_within_budget(context, &mut matched_rules).await {
            Ok(decision) => decision,
            Err(err) if self.config.fail_closed => PolicyDecision::evaluation_error(err),
            Err(err) => return Err(err),
        };

        Ok(self.finish(context, decision, matched_rules, start).await)
    }

    /// Runs the pipeline under `config.evaluation_timeout_ms` (spec §4.7, §5: "the engine is
    /// expected to honor `evaluationTimeoutMs` as an upper bound"). An elapsed budget surfaces as
    /// [`crate::error::AuthzError::Timeout`], handled by the caller exactly like any other stage
    /// error.
    async fn run_pipeline_within_budget(
        &self,
        context: &EvaluationContext,
        matched_rules: &mut Vec<AuditedRule>,
    ) -> crate::error::Result<PolicyDecision> {
        let budget = Duration::from_millis(self.config.evaluation_timeout_ms);
        match timeout(budget, self.run_pipeline(context, matched_rules)).await {
            Ok(result) => result,
            Err(_) => Err(crate::error::AuthzError::Timeout(self.config.evaluation_timeout_ms)),
        }
    }

    /// Stamps duration/trace, records metrics, and fires the audit emitter. Shared by both
    /// entry points so every returned decision goes through the same bookkeeping exactly once
    /// (spec §4.7 step 9).
    async fn finish(
        &self,
        context: &EvaluationContext,
        mut decision: PolicyDecision,
        matched_rules: Vec<AuditedRule>,
        start: Instant,
    ) -> PolicyDecision {
        let duration_ms = elapsed_ms(start);
        decision.evaluation_duration_ms = duration_ms;
        let decision = decision.with_trace(context.request_id.clone(), context.episode_id.clone());

        self.metrics.record_decision(decision.allowed, decision.reason, duration_ms);
        self.audit.emit(context, &decision, matched_rules).await;

        decision
    }

    async fn run_pipeline(
        &self,
        context: &EvaluationContext,
        matched_rules: &mut Vec<AuditedRule>,
    ) -> crate::error::Result<PolicyDecision> {
        if let Err(message) = context.validate() {
            return Ok(PolicyDecision::evaluation_error(message));
        }

        if self.config.enable_kill_switch {
            if let Some(decision) = self.check_kill_switch(context).await? {
                return Ok(decision);
            }
        }

        if self.config.enable_rate_limit {
            if let Some(decision) = self.check_rate_limit(context).await? {
                return Ok(decision);
            }
        }

        let policies = self.fetch_policies(context).await?;

        if policies.is_empty() {
            return Ok(PolicyDecision::new(
                self.config.default_effect,
                DecisionReason::NoMatchingRules,
                "no policies apply to this context",
            ));
        }

        for policy in policies.iter().filter(|p| p.status == PolicyStatus::Active) {
            for result in rules::find_all_matching_rules(&policy.rules, context) {
                matched_rules.push(AuditedRule::from_match(&result, policy.id));
            }

            if let Some(result) = rules::find_matching_rule(&policy.rules, context) {
                let constraints = result.rule.constraints.clone();
                if self.config.enable_approval_gates {
                    if let Some(approval) = constraints.as_ref().and_then(|c| c.require_approval.as_ref()) {
                        let decision = self
                            .run_approval_stage(context, policy.id, &result.rule, approval.clone(), constraints.clone())
                            .await?;
                        return Ok(decision);
                    }
                }

                let reason = if result.rule.effect.is_allow() {
                    DecisionReason::RuleAllowed
                } else {
                    DecisionReason::RuleDenied
                };
                let mut decision = PolicyDecision::new(
                    result.rule.effect,
                    reason,
                    format!("matched rule '{}'", result.rule.name),
                );
                decision.policy_id = Some(policy.id);
                decision.rule_id = Some(result.rule.id.clone());
                decision.rule_name = Some(result.rule.name.clone());
                decision.constraints = constraints;
                return Ok(decision);
            }
        }

        Ok(PolicyDecision::new(
            self.config.default_effect,
            DecisionReason::DefaultEffect,
            "no rule matched; applying default effect",
        ))
    }

    async fn check_kill_switch(
        &self,
        context: &EvaluationContext,
    ) -> crate::error::Result<Option<PolicyDecision>> {
        let start = Instant::now();
        let outcome = self
            .kill_switch
            .is_tripped(KillSwitchQuery {
                client_id: context.client_id.clone(),
                action: context.action.clone(),
                platform: context.platform.clone(),
            })
            .await?;
        let mut outcome = outcome;
        outcome.check_duration_ms = elapsed_ms(start);

        if outcome.tripped {
            let mut decision = PolicyDecision::deny(
                DecisionReason::KillSwitchTripped,
                outcome
                    .reason
                    .clone()
                    .unwrap_or_else(|| "kill switch tripped".to_string()),
            );
            decision.kill_switch = Some(outcome);
            return Ok(Some(decision));
        }
        Ok(None)
    }

    async fn check_rate_limit(
        &self,
        context: &EvaluationContext,
    ) -> crate::error::Result<Option<PolicyDecision>> {
        let start = Instant::now();
        let outcome = self
            .rate_limiter
            .check(RateLimitQuery {
                client_id: context.client_id.clone(),
                platform: Some(map_platform(context.platform.as_deref())),
                action: map_action(&context.action),
            })
            .await?;
        let mut outcome = outcome;
        outcome.check_duration_ms = elapsed_ms(start);

        if !outcome.allowed {
            let message = match outcome.retry_after_ms {
                Some(ms) => format!("rate limit exceeded; retry after {ms}ms"),
                None => "rate limit exceeded".to_string(),
            };
            let mut decision = PolicyDecision::deny(DecisionReason::RateLimitExceeded, message);
            decision.rate_limit = Some(outcome);
            return Ok(Some(decision));
        }
        Ok(None)
    }

    async fn fetch_policies(
        &self,
        context: &EvaluationContext,
    ) -> crate::error::Result<Vec<crate::types::Policy>> {
        let agent_key = context.agent_id.clone().unwrap_or_default();
        let client_key = (context.client_id.clone(), agent_key.clone());
        let global_key = ("global".to_string(), agent_key);

        let mut cached = Vec::new();
        if let Some(policy) = self.cache.get(&client_key) {
            cached.push(policy);
        }
        if global_key != client_key {
            if let Some(policy) = self.cache.get(&global_key) {
                cached.push(policy);
            }
        }
        if !cached.is_empty() {
            return Ok(cached);
        }

        let policies = self.policy_provider.get_policies_for_context(context).await?;
        self.cache.put_all(&policies);
        Ok(policies)
    }

    async fn run_approval_stage(
        &self,
        context: &EvaluationContext,
        policy_id: crate::types::PolicyId,
        rule: &crate::types::PolicyRule,
        approval: crate::types::ApprovalConstraint,
        constraints: Option<RuleConstraints>,
    ) -> crate::error::Result<PolicyDecision> {
        self.metrics.record_approval_gate_triggered();

        let pending = self
            .approval_gate
            .list_pending_requests(&context.client_id, &context.action)
            .await?;

        let existing = pending.into_iter().next();

        let request = match existing {
            Some(request) => request,
            None => {
                self.approval_gate
                    .create_request(ApprovalRequestInput {
                        client_id: context.client_id.clone(),
                        action_type: context.action.clone(),
                        required_role: approval.required_role.clone(),
                        timeout_seconds: approval.timeout_seconds,
                    })
                    .await?
            }
        };

        let decision = match request.status {
            ApprovalStatus::Pending => {
                let mut decision = PolicyDecision::deny(
                    DecisionReason::ApprovalPending,
                    "approval request is pending",
                );
                decision.approval_request_id = Some(request.id);
                decision.approval_status = Some("pending".to_string());
                decision.policy_id = Some(policy_id);
                decision.rule_id = Some(rule.id.clone());
                decision.rule_name = Some(rule.name.clone());
                decision
            }
            ApprovalStatus::Denied => {
                let mut decision = PolicyDecision::deny(
                    DecisionReason::ApprovalDenied,
                    "approval request was denied",
                );
                decision.approval_request_id = Some(request.id);
                decision.approval_status = Some("denied".to_string());
                decision.policy_id = Some(policy_id);
                decision.rule_id = Some(rule.id.clone());
                decision.rule_name = Some(rule.name.clone());
                decision
            }
            ApprovalStatus::Approved | ApprovalStatus::Expired => {
                let reason = if rule.effect.is_allow() {
                    DecisionReason::RuleAllowed
                } else {
                    DecisionReason::RuleDenied
                };
                let mut decision = PolicyDecision::new(
                    rule.effect,
                    reason,
                    format!("matched rule '{}' (approved)", rule.name),
                );
                decision.policy_id = Some(policy_id);
                decision.rule_id = Some(rule.id.clone());
                decision.rule_name = Some(rule.name.clone());
                decision.approval_request_id = Some(request.id);
                decision.approval_status = Some("approved".to_string());
                decision.constraints = constraints;
                decision
            }
        };

        Ok(decision)
    }
}

/// Maps a free-form platform string to the rate limiter's recognized set (spec §6).
fn map_platform(platform: Option<&str>) -> String {
    match platform.map(str::to_lowercase).as_deref() {
        Some("facebook") => "facebook".to_string(),
        Some("instagram") => "instagram".to_string(),
        Some("tiktok") => "tiktok".to_string(),
        Some("youtube") => "youtube".to_string(),
        Some("linkedin") => "linkedin".to_string(),
        Some("x") | Some("twitter") => "x".to_string(),
        Some("skool") => "skool".to_string(),
        _ => "facebook".to_string(),
    }
}

/// Maps a colon-separated action token to the rate limiter's recognized set (spec §6).
fn map_action(action: &str) -> String {
    let candidate = action.split_once(':').map(|(_, rest)| rest).unwrap_or(action);
    match candidate.to_lowercase().as_str() {
        "publish" => "publish".to_string(),
        "engage" => "engage".to_string(),
        "api_call" => "api_call".to_string(),
        "upload" => "upload".to_string(),
        "schedule" => "schedule".to_string(),
        _ => "api_call".to_string(),
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Aggregate status view: metrics plus the config that produced them (spec.md §9 supplement,
/// grounded in the teacher's `EnforcementStatistics`/`PerformanceMetrics` types).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatistics {
    pub metrics: MetricsSnapshot,
    pub config: EngineConfig,
}
