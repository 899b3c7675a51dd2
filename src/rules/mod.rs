mod condition;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod store;
pub mod types;

pub use engine::RuleEngine;
pub use error::RuleSetError;
pub use store::load_rules;
pub use types::{format_rules_for_display, RuleSet};
