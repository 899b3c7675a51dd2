use super::condition;
use super::error::EvalError;
use super::types::{Combinator, Rule};
use crate::email::EmailRecord;
use chrono::{DateTime, Utc};

/// A condition that errored during evaluation and was counted as false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionFailure {
    pub rule_name: String,
    /// Zero-based position of the condition within its rule.
    pub index: usize,
    pub error: EvalError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEvaluation {
    /// One entry per condition, in rule order.
    pub results: Vec<bool>,
    pub failures: Vec<ConditionFailure>,
    pub matched: bool,
}

/// Evaluate every condition of `rule` and combine the results. All
/// conditions are evaluated, even after the verdict is known, so the result
/// list is complete.
pub fn matches(rule: &Rule, email: &EmailRecord, now: DateTime<Utc>) -> RuleEvaluation {
    let mut results = Vec::with_capacity(rule.conditions.len());
    let mut failures = Vec::new();

    for (index, cond) in rule.conditions.iter().enumerate() {
        match condition::evaluate(cond, email, now) {
            Ok(result) => results.push(result),
            Err(error) => {
                log_warn!(
                    "[Rules] Email {} rule '{}' condition {} ({}) failed: {}",
                    email.id,
                    rule.name,
                    index + 1,
                    cond,
                    error
                );
                failures.push(ConditionFailure {
                    rule_name: rule.name.clone(),
                    index,
                    error,
                });
                results.push(false);
            }
        }
    }

    let matched = match rule.combinator {
        Combinator::All => results.iter().all(|r| *r),
        Combinator::Any => results.iter().any(|r| *r),
    };

    RuleEvaluation {
        results,
        failures,
        matched,
    }
}
