use super::error::RuleSetError;
use serde::{Deserialize, Serialize};

/// Email attribute a condition inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    #[serde(alias = "from")]
    Sender,
    #[serde(alias = "to")]
    Recipient,
    Subject,
    #[serde(alias = "message")]
    Body,
    #[serde(alias = "date", alias = "date received")]
    DateReceived,
    #[serde(alias = "has_attachment", alias = "attachments")]
    Attachment,
    #[serde(alias = "folder_name")]
    Folder,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::Sender => "sender",
            Field::Recipient => "recipient",
            Field::Subject => "subject",
            Field::Body => "body",
            Field::DateReceived => "date_received",
            Field::Attachment => "attachment",
            Field::Folder => "folder",
        }
    }

    pub fn is_date(self) -> bool {
        matches!(self, Field::DateReceived)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Contains,
    #[serde(alias = "does not contain")]
    DoesNotContain,
    Equals,
    #[serde(alias = "does not equal")]
    DoesNotEqual,
    /// On dates: received within the last N days.
    #[serde(alias = "less than")]
    LessThan,
    /// On dates: received more than N days ago.
    #[serde(alias = "greater than")]
    GreaterThan,
}

impl Predicate {
    pub fn name(self) -> &'static str {
        match self {
            Predicate::Contains => "contains",
            Predicate::DoesNotContain => "does_not_contain",
            Predicate::Equals => "equals",
            Predicate::DoesNotEqual => "does_not_equal",
            Predicate::LessThan => "less_than",
            Predicate::GreaterThan => "greater_than",
        }
    }

    pub fn is_date(self) -> bool {
        matches!(self, Predicate::LessThan | Predicate::GreaterThan)
    }
}

/// Comparison operand. Day counts may be written as integers or as numeric
/// strings; non-numeric strings surface as an evaluation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Integer(i64),
    Text(String),
}

impl ConditionValue {
    pub fn as_text(&self) -> String {
        match self {
            ConditionValue::Integer(n) => n.to_string(),
            ConditionValue::Text(s) => s.clone(),
        }
    }

    pub fn as_days(&self) -> Option<i64> {
        match self {
            ConditionValue::Integer(n) => Some(*n),
            ConditionValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl From<&str> for ConditionValue {
    fn from(s: &str) -> Self {
        ConditionValue::Text(s.to_string())
    }
}

impl From<i64> for ConditionValue {
    fn from(n: i64) -> Self {
        ConditionValue::Integer(n)
    }
}

impl From<i32> for ConditionValue {
    fn from(n: i32) -> Self {
        ConditionValue::Integer(n.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(alias = "field_name")]
    pub field: Field,
    pub predicate: Predicate,
    pub value: ConditionValue,
}

impl Condition {
    pub fn new(field: Field, predicate: Predicate, value: impl Into<ConditionValue>) -> Self {
        Condition {
            field,
            predicate,
            value: value.into(),
        }
    }

    /// Date fields take only less_than/greater_than; every other field takes
    /// only the text predicates.
    pub fn is_valid_pairing(&self) -> bool {
        self.field.is_date() == self.predicate.is_date()
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {:?}",
            self.field.name(),
            self.predicate.name(),
            self.value.as_text()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    #[serde(alias = "ALL")]
    All,
    #[serde(alias = "ANY")]
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    #[serde(rename = "mark_as_read", alias = "mark_read")]
    MarkRead,
    #[serde(rename = "mark_as_unread", alias = "mark_unread")]
    MarkUnread,
    #[serde(rename = "move_message", alias = "move_to_folder")]
    MoveToFolder { folder: String },
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::MarkRead => write!(f, "mark_as_read"),
            Action::MarkUnread => write!(f, "mark_as_unread"),
            Action::MoveToFolder { folder } => write!(f, "move_message={}", folder),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(rename = "predicate_type", alias = "combinator")]
    pub combinator: Combinator,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Rule {
    pub fn validate(&self) -> Result<(), RuleSetError> {
        if self.name.trim().is_empty() {
            return Err(self.invalid("rule name must not be empty".to_string()));
        }
        for (idx, condition) in self.conditions.iter().enumerate() {
            if !condition.is_valid_pairing() {
                return Err(self.invalid(format!(
                    "condition {}: predicate '{}' is not valid for field '{}'",
                    idx + 1,
                    condition.predicate.name(),
                    condition.field.name()
                )));
            }
        }
        for (idx, action) in self.actions.iter().enumerate() {
            if let Action::MoveToFolder { folder } = action {
                if folder.trim().is_empty() {
                    return Err(self.invalid(format!(
                        "action {}: move_message requires a folder name",
                        idx + 1
                    )));
                }
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> RuleSetError {
        RuleSetError::InvalidRule {
            rule: self.name.clone(),
            reason,
        }
    }
}

/// Ordered rules. Every matching rule fires, in this order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        RuleSet { rules }
    }

    pub fn validate(&self) -> Result<(), RuleSetError> {
        self.rules.iter().try_for_each(Rule::validate)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

pub fn format_rules_for_display(rules: &RuleSet) -> String {
    if rules.is_empty() {
        return "No rules defined.".to_string();
    }

    let mut out = String::new();
    for (idx, rule) in rules.rules.iter().enumerate() {
        out.push_str(&format!("Rule {}: {}\n", idx + 1, rule.name));
        let combinator = match rule.combinator {
            Combinator::All => "all",
            Combinator::Any => "any",
        };
        let conditions: Vec<String> = rule.conditions.iter().map(|c| c.to_string()).collect();
        out.push_str(&format!("  Match: {}({})\n", combinator, conditions.join(", ")));
        let actions: Vec<String> = rule.actions.iter().map(|a| a.to_string()).collect();
        if actions.is_empty() {
            out.push_str("  Actions: (none)\n");
        } else {
            out.push_str(&format!("  Actions: {}\n", actions.join(", ")));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_original_json_shape() {
        let json = r#"{
            "rules": [{
                "name": "newsletters",
                "predicate_type": "any",
                "conditions": [
                    {"field": "from", "predicate": "contains", "value": "newsletter@"},
                    {"field": "date_received", "predicate": "less_than", "value": "7"}
                ],
                "actions": [
                    {"type": "mark_as_read"},
                    {"type": "move_message", "folder": "Newsletters"}
                ]
            }]
        }"#;
        let set: RuleSet = serde_json::from_str(json).unwrap();
        let rule = &set.rules[0];
        assert_eq!(rule.combinator, Combinator::Any);
        assert_eq!(rule.conditions[0].field, Field::Sender);
        assert_eq!(rule.conditions[1].value.as_days(), Some(7));
        assert_eq!(
            rule.actions,
            vec![
                Action::MarkRead,
                Action::MoveToFolder {
                    folder: "Newsletters".to_string()
                }
            ]
        );
        assert!(set.validate().is_ok());
    }

    #[test]
    fn test_field_and_action_aliases() {
        let json = r#"{
            "name": "aliases",
            "predicate_type": "all",
            "conditions": [
                {"field": "message", "predicate": "does not contain", "value": "unsubscribe"},
                {"field": "to", "predicate": "equals", "value": "me@example.com"}
            ],
            "actions": [{"type": "mark_unread"}, {"type": "move_to_folder", "folder": "X"}]
        }"#;
        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.conditions[0].field, Field::Body);
        assert_eq!(rule.conditions[0].predicate, Predicate::DoesNotContain);
        assert_eq!(rule.conditions[1].field, Field::Recipient);
        assert_eq!(rule.actions[0], Action::MarkUnread);
    }

    #[test]
    fn test_unknown_combinator_is_rejected() {
        let json = r#"{"name": "bad", "predicate_type": "most", "conditions": [], "actions": []}"#;
        assert!(serde_json::from_str::<Rule>(json).is_err());
    }

    #[test]
    fn test_unknown_action_type_is_rejected() {
        let json = r#"{"name": "bad", "predicate_type": "all", "actions": [{"type": "delete"}]}"#;
        assert!(serde_json::from_str::<Rule>(json).is_err());
    }

    #[test]
    fn test_move_without_folder_is_rejected() {
        let json = r#"{"name": "bad", "predicate_type": "all", "actions": [{"type": "move_message"}]}"#;
        assert!(serde_json::from_str::<Rule>(json).is_err());
    }

    #[test]
    fn test_invalid_pairing_fails_validation() {
        let rule = Rule {
            name: "date contains".to_string(),
            combinator: Combinator::All,
            conditions: vec![Condition::new(
                Field::DateReceived,
                Predicate::Contains,
                "2024",
            )],
            actions: vec![Action::MarkRead],
        };
        let err = rule.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("date contains"), "got: {}", msg);
        assert!(msg.contains("not valid for field 'date_received'"), "got: {}", msg);

        let rule = Rule {
            conditions: vec![Condition::new(Field::Subject, Predicate::LessThan, 3)],
            ..rule
        };
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_empty_move_folder_fails_validation() {
        let rule = Rule {
            name: "empty folder".to_string(),
            combinator: Combinator::Any,
            conditions: vec![],
            actions: vec![Action::MoveToFolder {
                folder: "  ".to_string(),
            }],
        };
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_format_rules_for_display() {
        let set = RuleSet::new(vec![Rule {
            name: "archive old".to_string(),
            combinator: Combinator::All,
            conditions: vec![Condition::new(
                Field::DateReceived,
                Predicate::GreaterThan,
                30,
            )],
            actions: vec![Action::MoveToFolder {
                folder: "Archive".to_string(),
            }],
        }]);
        let out = format_rules_for_display(&set);
        assert!(out.contains("Rule 1: archive old"));
        assert!(out.contains("all(date_received greater_than \"30\")"));
        assert!(out.contains("move_message=Archive"));
        assert_eq!(
            format_rules_for_display(&RuleSet::default()),
            "No rules defined."
        );
    }
}
