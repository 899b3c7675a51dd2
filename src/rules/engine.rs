use super::error::RuleSetError;
use super::evaluator::{self, ConditionFailure};
use super::executor::{ActionExecutor, ActionOutcome};
use super::types::RuleSet;
use crate::mailbox::MailboxClient;
use crate::store::{EmailRepository, StoreError};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub rule_name: String,
    pub outcomes: Vec<ActionOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailReport {
    pub email_id: String,
    pub subject: String,
    pub condition_failures: Vec<ConditionFailure>,
    /// Matching rules in rule-set order.
    pub matches: Vec<RuleMatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub emails: Vec<EmailReport>,
    /// True when the run stopped early on a cancellation request.
    pub cancelled: bool,
}

impl RunReport {
    pub fn matched_emails(&self) -> usize {
        self.emails.iter().filter(|e| !e.matches.is_empty()).count()
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &ActionOutcome> {
        self.emails
            .iter()
            .flat_map(|e| e.matches.iter())
            .flat_map(|m| m.outcomes.iter())
    }

    pub fn failed_actions(&self) -> usize {
        self.outcomes().filter(|o| !o.is_applied()).count()
    }

    pub fn condition_failures(&self) -> usize {
        self.emails.iter().map(|e| e.condition_failures.len()).sum()
    }
}

/// Applies a validated rule set to the emails held in a repository.
pub struct RuleEngine<'a, M: MailboxClient + ?Sized, R: EmailRepository + ?Sized> {
    rules: RuleSet,
    mailbox: &'a M,
    repository: &'a R,
}

impl<'a, M: MailboxClient + ?Sized, R: EmailRepository + ?Sized> RuleEngine<'a, M, R> {
    pub fn new(rules: RuleSet, mailbox: &'a M, repository: &'a R) -> Result<Self, RuleSetError> {
        rules.validate()?;
        Ok(RuleEngine {
            rules,
            mailbox,
            repository,
        })
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn run(&self, limit: Option<usize>, cancel: &AtomicBool) -> Result<RunReport, StoreError> {
        self.run_at(limit, cancel, Utc::now())
    }

    /// Run with an explicit reference time for date conditions.
    pub fn run_at(
        &self,
        limit: Option<usize>,
        cancel: &AtomicBool,
        now: DateTime<Utc>,
    ) -> Result<RunReport, StoreError> {
        let mut candidates = self.repository.get_all_emails()?;
        if let Some(limit) = limit {
            candidates.truncate(limit);
        }
        log_info!(
            "[Rules] Applying {} rule(s) to {} email(s)",
            self.rules.len(),
            candidates.len()
        );

        let executor = ActionExecutor::new(self.mailbox, self.repository);
        let mut report = RunReport::default();

        for email in &candidates {
            if cancel.load(Ordering::SeqCst) {
                log_warn!(
                    "[Rules] Cancelled after {} of {} email(s)",
                    report.emails.len(),
                    candidates.len()
                );
                report.cancelled = true;
                break;
            }

            let mut email_report = EmailReport {
                email_id: email.id.clone(),
                subject: email.subject.clone(),
                condition_failures: Vec::new(),
                matches: Vec::new(),
            };

            for rule in &self.rules.rules {
                let evaluation = evaluator::matches(rule, email, now);
                email_report.condition_failures.extend(evaluation.failures);
                if !evaluation.matched {
                    continue;
                }
                log_info!("[Rules] Email {} matched rule '{}'", email.id, rule.name);
                email_report.matches.push(RuleMatch {
                    rule_name: rule.name.clone(),
                    outcomes: executor.apply(&rule.actions, email),
                });
            }

            report.emails.push(email_report);
        }

        log_info!(
            "[Rules] Done: {} email(s) processed, {} matched, {} action failure(s)",
            report.emails.len(),
            report.matched_emails(),
            report.failed_actions()
        );
        Ok(report)
    }
}
