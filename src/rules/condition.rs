use super::error::EvalError;
use super::types::{Condition, Field, Predicate};
use crate::email::EmailRecord;
use chrono::{DateTime, TimeDelta, Utc};
use std::borrow::Cow;

/// Evaluate one condition against one email. `now` is the reference instant
/// for relative date predicates.
pub fn evaluate(
    condition: &Condition,
    email: &EmailRecord,
    now: DateTime<Utc>,
) -> Result<bool, EvalError> {
    if !condition.is_valid_pairing() {
        return Err(EvalError::InvalidPairing {
            field: condition.field.name(),
            predicate: condition.predicate.name(),
        });
    }

    match condition.field {
        Field::DateReceived => evaluate_date(condition, email, now),
        Field::Attachment => Ok(evaluate_attachment(condition, email)),
        field => Ok(compare_text(
            condition.predicate,
            &field_text(field, email),
            &condition.value.as_text(),
        )),
    }
}

fn field_text(field: Field, email: &EmailRecord) -> Cow<'_, str> {
    match field {
        Field::Sender => Cow::Borrowed(&email.sender),
        Field::Recipient => Cow::Borrowed(&email.recipient),
        Field::Subject => Cow::Borrowed(&email.subject),
        Field::Body => Cow::Borrowed(&email.body),
        Field::Folder => Cow::Borrowed(&email.folder_name),
        Field::DateReceived => Cow::Borrowed(&email.date),
        Field::Attachment => Cow::Owned(email.attachment_types.join(", ")),
    }
}

fn compare_text(predicate: Predicate, stored: &str, wanted: &str) -> bool {
    let stored = stored.to_lowercase();
    let wanted = wanted.to_lowercase();
    match predicate {
        Predicate::Contains => stored.contains(&wanted),
        Predicate::DoesNotContain => !stored.contains(&wanted),
        Predicate::Equals => stored == wanted,
        Predicate::DoesNotEqual => stored != wanted,
        Predicate::LessThan | Predicate::GreaterThan => false,
    }
}

/// `equals true` / `does_not_equal no` test presence; anything else is a
/// text comparison against the attachment MIME types.
fn evaluate_attachment(condition: &Condition, email: &EmailRecord) -> bool {
    let wanted = condition.value.as_text();
    let presence = match wanted.trim().to_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    };
    match (condition.predicate, presence) {
        (Predicate::Equals, Some(present)) => email.has_attachment == present,
        (Predicate::DoesNotEqual, Some(present)) => email.has_attachment != present,
        (predicate, _) => compare_text(
            predicate,
            &field_text(Field::Attachment, email),
            &wanted,
        ),
    }
}

/// less_than N: received strictly after `now - N days`.
/// greater_than N: received strictly before `now - N days`.
fn evaluate_date(
    condition: &Condition,
    email: &EmailRecord,
    now: DateTime<Utc>,
) -> Result<bool, EvalError> {
    let received = email.received_at().map_err(|e| EvalError::Parse {
        value: email.date.clone(),
        reason: e.to_string(),
    })?;
    let days = condition
        .value
        .as_days()
        .ok_or_else(|| EvalError::Value(condition.value.as_text()))?;
    let window = TimeDelta::try_days(days).ok_or_else(|| EvalError::Value(days.to_string()))?;
    let threshold = now
        .with_timezone(received.offset())
        .checked_sub_signed(window)
        .ok_or_else(|| EvalError::Value(days.to_string()))?;

    match condition.predicate {
        Predicate::LessThan => Ok(received > threshold),
        Predicate::GreaterThan => Ok(received < threshold),
        _ => Err(EvalError::InvalidPairing {
            field: condition.field.name(),
            predicate: condition.predicate.name(),
        }),
    }
}
