//! Rule evaluator: selects the first matching enabled rule in priority order (spec §4.3).

use crate::conditions;
use crate::matcher;
use crate::types::{ConditionResult, EvaluationContext, PolicyRule};
use std::time::Instant;

/// Outcome of evaluating a single rule against a context.
#[derive(Debug, Clone)]
pub struct RuleMatchResult {
    pub matched: bool,
    pub rule: PolicyRule,
    pub matched_action: Option<String>,
    pub matched_resource: Option<String>,
    pub condition_results: Vec<ConditionResult>,
    pub match_duration_ms: f64,
}

/// Evaluates one rule against a context. Short-circuits on the first unmet gate — disabled →
/// action → resource → conditions — but *all* conditions are still evaluated when reached, so
/// the result records how far matching progressed and carries a full condition trail for
/// debugging (spec §4.3).
pub fn evaluate_rule(rule: &PolicyRule, context: &EvaluationContext) -> RuleMatchResult {
    let start = Instant::now();

    if !rule.enabled {
        return RuleMatchResult {
            matched: false,
            rule: rule.clone(),
            matched_action: None,
            matched_resource: None,
            condition_results: Vec::new(),
            match_duration_ms: elapsed_ms(start),
        };
    }

    let matched_action = matcher::find_matching_pattern(&context.action, &rule.actions)
        .map(str::to_string);
    if matched_action.is_none() {
        return RuleMatchResult {
            matched: false,
            rule: rule.clone(),
            matched_action: None,
            matched_resource: None,
            condition_results: Vec::new(),
            match_duration_ms: elapsed_ms(start),
        };
    }

    let matched_resource = matcher::find_matching_pattern(&context.resource, &rule.resources)
        .map(str::to_string);
    if matched_resource.is_none() {
        return RuleMatchResult {
            matched: false,
            rule: rule.clone(),
            matched_action,
            matched_resource: None,
            condition_results: Vec::new(),
            match_duration_ms: elapsed_ms(start),
        };
    }

    let (conditions_passed, condition_results) = conditions::evaluate_all(&rule.conditions, context);

    RuleMatchResult {
        matched: conditions_passed,
        rule: rule.clone(),
        matched_action,
        matched_resource,
        condition_results,
        match_duration_ms: elapsed_ms(start),
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Returns a new, stably-sorted sequence of rules in strictly descending `priority` order
/// (spec invariant 4: ties broken by input position).
pub fn sort_by_priority(rules: &[PolicyRule]) -> Vec<PolicyRule> {
    let mut sorted: Vec<PolicyRule> = rules.to_vec();
    sorted.sort_by(|a, b| b.priority.cmp(&a.priority));
    sorted
}

/// Returns the first matching rule after sorting by priority, or `None`.
pub fn find_matching_rule(rules: &[PolicyRule], context: &EvaluationContext) -> Option<RuleMatchResult> {
    sort_by_priority(rules)
        .iter()
        .map(|rule| evaluate_rule(rule, context))
        .find(|result| result.matched)
}

/// Returns every matching rule, in priority order.
pub fn find_all_matching_rules(
    rules: &[PolicyRule],
    context: &EvaluationContext,
) -> Vec<RuleMatchResult> {
    sort_by_priority(rules)
        .iter()
        .map(|rule| evaluate_rule(rule, context))
        .filter(|result| result.matched)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Effect;

    fn rule(name: &str, priority: i64, effect: Effect, enabled: bool) -> PolicyRule {
        PolicyRule {
            id: name.to_string(),
            name: name.to_string(),
            description: String::new(),
            enabled,
            effect,
            actions: vec!["post:*".to_string()],
            resources: vec!["social:*".to_string()],
            conditions: vec![],
            priority,
            constraints: None,
        }
    }

    fn ctx() -> EvaluationContext {
        EvaluationContext::new("client_123", "post:publish", "social:meta")
    }

    #[test]
    fn disabled_rule_never_matches() {
        let r = rule("disabled", 100, Effect::Allow, false);
        assert!(!evaluate_rule(&r, &ctx()).matched);
    }

    #[test]
    fn priority_sort_is_stable_and_descending() {
        let rules = vec![
            rule("a", 10, Effect::Allow, true),
            rule("b", 100, Effect::Deny, true),
            rule("c", 100, Effect::Allow, true),
        ];
        let sorted = sort_by_priority(&rules);
        assert_eq!(sorted[0].name, "b"); // first at priority 100, stable order preserved
        assert_eq!(sorted[1].name, "c");
        assert_eq!(sorted[2].name, "a");
    }

    #[test]
    fn sort_by_priority_is_idempotent() {
        let rules = vec![
            rule("a", 10, Effect::Allow, true),
            rule("b", 100, Effect::Deny, true),
        ];
        let once = sort_by_priority(&rules);
        let twice = sort_by_priority(&once);
        assert_eq!(
            once.iter().map(|r| r.name.clone()).collect::<Vec<_>>(),
            twice.iter().map(|r| r.name.clone()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn first_match_wins_by_priority() {
        let rules = vec![
            rule("low", 10, Effect::Allow, true),
            rule("high", 100, Effect::Deny, true),
        ];
        let result = find_matching_rule(&rules, &ctx()).unwrap();
        assert_eq!(result.rule.name, "high");
    }

    #[test]
    fn no_rules_means_no_match() {
        assert!(find_matching_rule(&[], &ctx()).is_none());
    }

    #[test]
    fn find_all_matching_rules_returns_every_match_in_priority_order() {
        let rules = vec![
            rule("low", 10, Effect::Allow, true),
            rule("high", 100, Effect::Deny, true),
        ];
        let matches = find_all_matching_rules(&rules, &ctx());
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].rule.name, "high");
        assert_eq!(matches[1].rule.name, "low");
    }
}
