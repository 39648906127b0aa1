//! Condition evaluator: resolves field values out of a context and evaluates the condition
//! tree against them (spec §4.2).

use crate::types::{
    Condition, ConditionResult, CompoundOperator, EvaluationContext, FieldOperator, FieldValue,
    TimeOperator, MAX_CONDITION_DEPTH,
};
use chrono::{DateTime, Datelike, Timelike, Utc};
use regex::Regex;

/// Evaluates a condition tree against a context. Never panics: any internal failure (bad regex,
/// type mismatch, missing field) is captured as a failed [`ConditionResult`] with an error
/// annotation, per spec §4.2's failure policy ("any exception in a single condition yields a
/// false result for that condition... evaluation of remaining conditions continues").
pub fn evaluate(condition: &Condition, context: &EvaluationContext) -> ConditionResult {
    evaluate_depth(condition, context, 0)
}

fn evaluate_depth(condition: &Condition, context: &EvaluationContext, depth: usize) -> ConditionResult {
    if depth >= MAX_CONDITION_DEPTH {
        return ConditionResult::failed("condition tree exceeds maximum nesting depth");
    }

    match condition {
        Condition::Field {
            field,
            operator,
            value,
        } => evaluate_field(field, *operator, value, context),
        Condition::Time {
            field,
            operator,
            value,
        } => evaluate_time(field, *operator, value, context),
        Condition::Compound {
            operator,
            conditions,
        } => evaluate_compound(*operator, conditions, context, depth),
    }
}

fn evaluate_field(
    field: &str,
    operator: FieldOperator,
    expected: &FieldValue,
    context: &EvaluationContext,
) -> ConditionResult {
    let actual = context.resolve_field(field).unwrap_or(FieldValue::Null);
    match compare_field(operator, &actual, expected) {
        Ok(passed) => ConditionResult::ok(passed),
        Err(message) => ConditionResult::failed(message),
    }
}

fn compare_field(
    operator: FieldOperator,
    actual: &FieldValue,
    expected: &FieldValue,
) -> Result<bool, String> {
    match operator {
        FieldOperator::Equals => Ok(values_equal(actual, expected)),
        FieldOperator::NotEquals => Ok(!values_equal(actual, expected)),
        FieldOperator::Gt => Ok(ordered_compare(actual, expected, |o| o == std::cmp::Ordering::Greater)),
        FieldOperator::Gte => Ok(ordered_compare(actual, expected, |o| o != std::cmp::Ordering::Less)),
        FieldOperator::Lt => Ok(ordered_compare(actual, expected, |o| o == std::cmp::Ordering::Less)),
        FieldOperator::Lte => Ok(ordered_compare(actual, expected, |o| o != std::cmp::Ordering::Greater)),
        FieldOperator::In => Ok(membership(actual, expected)),
        FieldOperator::NotIn => Ok(!membership(actual, expected)),
        FieldOperator::Contains => Ok(string_pair(actual, expected)
            .map(|(a, b)| a.contains(&b))
            .unwrap_or(false)),
        FieldOperator::StartsWith => Ok(string_pair(actual, expected)
            .map(|(a, b)| a.starts_with(&b))
            .unwrap_or(false)),
        FieldOperator::EndsWith => Ok(string_pair(actual, expected)
            .map(|(a, b)| a.ends_with(&b))
            .unwrap_or(false)),
        FieldOperator::Matches => Ok(actual
            .as_str()
            .zip(expected.as_str())
            .and_then(|(a, pattern)| Regex::new(pattern).ok().map(|re| re.is_match(a)))
            .unwrap_or(false)),
        FieldOperator::Between => Ok(between(actual, expected)),
    }
}

fn values_equal(a: &FieldValue, b: &FieldValue) -> bool {
    a == b
}

/// Numeric comparison when both sides are numeric, otherwise lexicographic on the stringified
/// value (spec §4.2, and the documented foot-gun in spec §9: "mixing numeric and non-numeric
/// operands yields string comparison").
fn ordered_compare(
    a: &FieldValue,
    b: &FieldValue,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> bool {
    let ordering = match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => a.to_comparable_string().partial_cmp(&b.to_comparable_string()),
    };
    ordering.map(accept).unwrap_or(false)
}

fn membership(actual: &FieldValue, expected: &FieldValue) -> bool {
    match expected.as_array() {
        Some(items) => items.iter().any(|item| values_equal(item, actual)),
        None => false,
    }
}

fn string_pair(a: &FieldValue, b: &FieldValue) -> Option<(String, String)> {
    Some((a.as_str()?.to_string(), b.as_str()?.to_string()))
}

fn between(actual: &FieldValue, bounds: &FieldValue) -> bool {
    let Some(map) = bounds.as_map() else {
        return false;
    };
    let (Some(start), Some(end)) = (map.get("start"), map.get("end")) else {
        return false;
    };

    if let (Some(v), Some(s), Some(e)) = (actual.as_f64(), start.as_f64(), end.as_f64()) {
        return v >= s && v <= e;
    }

    let v = actual.to_comparable_string();
    let s = start.to_comparable_string();
    let e = end.to_comparable_string();
    v >= s && v <= e
}

// ---------------------------------------------------------------------------
// Time conditions
// ---------------------------------------------------------------------------

fn evaluate_time(
    field: &str,
    operator: TimeOperator,
    value: &FieldValue,
    context: &EvaluationContext,
) -> ConditionResult {
    let now = context.effective_timestamp();
    match evaluate_time_inner(field, operator, value, now) {
        Ok(passed) => ConditionResult::ok(passed),
        Err(message) => ConditionResult::failed(message),
    }
}

fn evaluate_time_inner(
    field: &str,
    operator: TimeOperator,
    value: &FieldValue,
    now: DateTime<Utc>,
) -> Result<bool, String> {
    match operator {
        TimeOperator::Between => {
            let map = value
                .as_map()
                .ok_or_else(|| "between requires a {start, end} object".to_string())?;
            let start = map
                .get("start")
                .and_then(FieldValue::as_str)
                .ok_or_else(|| "between requires a start bound".to_string())?;
            let end = map
                .get("end")
                .and_then(FieldValue::as_str)
                .ok_or_else(|| "between requires an end bound".to_string())?;
            let current = current_time_string(field, now);
            Ok(time_in_range(&current, start, end))
        }
        TimeOperator::After => {
            let bound = value
                .as_str()
                .ok_or_else(|| "after requires a HH:MM string".to_string())?;
            Ok(current_time_string(field, now).as_str() > bound)
        }
        TimeOperator::Before => {
            let bound = value
                .as_str()
                .ok_or_else(|| "before requires a HH:MM string".to_string())?;
            Ok(current_time_string(field, now).as_str() < bound)
        }
        TimeOperator::DayOfWeek => {
            let days = value
                .as_array()
                .ok_or_else(|| "day_of_week requires an array of day numbers".to_string())?;
            let today = sunday_based_weekday(now);
            Ok(days.iter().any(|d| d.as_f64() == Some(today as f64)))
        }
    }
}

/// `HH:MM` if `start <= end`; overnight wrap (`now >= start OR now <= end`) otherwise
/// (spec §4.2, boundary behavior in spec §8: `22:00→06:00` matches `23:30` and `04:30`).
fn time_in_range(current: &str, start: &str, end: &str) -> bool {
    if start <= end {
        current >= start && current <= end
    } else {
        current >= start || current <= end
    }
}

fn sunday_based_weekday(now: DateTime<Utc>) -> u32 {
    // chrono's `Weekday::num_days_from_sunday` already gives Sunday=0.
    now.weekday().num_days_from_sunday()
}

fn current_time_string(field: &str, now: DateTime<Utc>) -> String {
    match field {
        "current_date" | "date" => now.format("%Y-%m-%d").to_string(),
        "day_of_week" => sunday_based_weekday(now).to_string(),
        "hour" => now.hour().to_string(),
        "minute" => now.minute().to_string(),
        // "current_time" | "time" | anything else: HH:MM is the common case used by
        // between/after/before.
        _ => now.format("%H:%M").to_string(),
    }
}

// ---------------------------------------------------------------------------
// Compound conditions
// ---------------------------------------------------------------------------

fn evaluate_compound(
    operator: CompoundOperator,
    conditions: &[Condition],
    context: &EvaluationContext,
    depth: usize,
) -> ConditionResult {
    // All children are evaluated regardless of short-circuiting, so the audit trail records
    // every sub-condition's outcome (spec §4.2: "not... remaining children are evaluated but
    // ignored for the result").
    let children: Vec<ConditionResult> = conditions
        .iter()
        .map(|c| evaluate_depth(c, context, depth + 1))
        .collect();

    let passed = match operator {
        CompoundOperator::And => children.iter().all(|c| c.passed),
        CompoundOperator::Or => children.iter().any(|c| c.passed),
        CompoundOperator::Not => children.first().map(|c| !c.passed).unwrap_or(true),
    };

    ConditionResult::ok(passed).with_children(children)
}

/// Convenience: evaluates every condition in a rule's list, requiring all to pass
/// (spec §3: "conditions (sequence of conditions; all must pass; empty ⇒ trivially true)").
pub fn evaluate_all(conditions: &[Condition], context: &EvaluationContext) -> (bool, Vec<ConditionResult>) {
    let results: Vec<ConditionResult> = conditions.iter().map(|c| evaluate(c, context)).collect();
    let passed = results.iter().all(|r| r.passed);
    (passed, results)
}
