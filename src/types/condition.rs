//! Condition tree: field / time / compound conditions (spec §3, §4.2, §9 "Recursive
//! discriminated conditions").

use super::value::FieldValue;
use serde::{Deserialize, Serialize};

/// A condition evaluates to true or false against an [`super::context::EvaluationContext`].
/// Conditions form a tree: leaves are [`Condition::Field`]/[`Condition::Time`], and
/// [`Condition::Compound`] recurses over its children.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Field {
        field: String,
        operator: FieldOperator,
        value: FieldValue,
    },
    Time {
        field: String,
        operator: TimeOperator,
        value: FieldValue,
    },
    Compound {
        operator: CompoundOperator,
        conditions: Vec<Condition>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOperator {
    Equals,
    NotEquals,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
    Between,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOperator {
    Between,
    After,
    Before,
    DayOfWeek,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompoundOperator {
    And,
    Or,
    Not,
}

/// Maximum recursion depth guarded against stack abuse in hand-crafted policies
/// (spec §9: "Keep depth guarded to avoid stack abuse").
pub const MAX_CONDITION_DEPTH: usize = 32;

/// Result of evaluating a single condition node, retained for the audit trail
/// (spec §4.3 "conditionResults", §4.2 failure policy).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionResult {
    pub passed: bool,
    pub error: Option<String>,
    /// For `Compound` conditions: the per-child results, including children whose outcome was
    /// ignored for the compound's own result (e.g. the non-first children of a `not`). Empty for
    /// leaf conditions.
    #[serde(default)]
    pub children: Vec<ConditionResult>,
}

impl ConditionResult {
    pub fn ok(passed: bool) -> Self {
        Self {
            passed,
            error: None,
            children: Vec::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            error: Some(message.into()),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<ConditionResult>) -> Self {
        self.children = children;
        self
    }
}
