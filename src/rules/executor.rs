use super::types::Action;
use crate::email::EmailRecord;
use crate::mailbox::{MailboxClient, MailboxError};
use crate::store::EmailRepository;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionStatus {
    /// Remote change made and mirrored locally.
    Applied,
    /// Remote call failed; the local record was left alone.
    RemoteFailed(String),
    /// Remote change made but the local record could not be updated.
    PartiallyApplied(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub action: Action,
    pub status: ActionStatus,
}

impl ActionOutcome {
    pub fn is_applied(&self) -> bool {
        self.status == ActionStatus::Applied
    }
}

/// Applies actions to one email against the remote mailbox, mirroring each
/// success into the local repository.
pub struct ActionExecutor<'a, M: MailboxClient + ?Sized, R: EmailRepository + ?Sized> {
    mailbox: &'a M,
    repository: &'a R,
}

impl<'a, M: MailboxClient + ?Sized, R: EmailRepository + ?Sized> ActionExecutor<'a, M, R> {
    pub fn new(mailbox: &'a M, repository: &'a R) -> Self {
        ActionExecutor {
            mailbox,
            repository,
        }
    }

    /// Apply `actions` in order. A failure never stops the remaining actions.
    pub fn apply(&self, actions: &[Action], email: &EmailRecord) -> Vec<ActionOutcome> {
        actions
            .iter()
            .map(|action| ActionOutcome {
                action: action.clone(),
                status: self.apply_one(action, &email.id),
            })
            .collect()
    }

    fn apply_one(&self, action: &Action, id: &str) -> ActionStatus {
        let remote: Result<(), MailboxError> = match action {
            Action::MarkRead => self.mailbox.mark_read(id),
            Action::MarkUnread => self.mailbox.mark_unread(id),
            Action::MoveToFolder { folder } => self.mailbox.move_message(id, folder),
        };
        if let Err(e) = remote {
            log_error!("[Rules] {} on {} failed remotely: {}", action, id, e);
            return ActionStatus::RemoteFailed(e.to_string());
        }

        let local = match action {
            Action::MarkRead => self.repository.update_status(id, Some(true), None),
            Action::MarkUnread => self.repository.update_status(id, Some(false), None),
            Action::MoveToFolder { folder } => {
                self.repository.update_status(id, None, Some(folder))
            }
        };
        match local {
            Ok(true) => {
                log_info!("[Rules] {} applied to {}", action, id);
                ActionStatus::Applied
            }
            Ok(false) => {
                log_warn!("[Rules] {} applied to {} remotely, but it is not stored", action, id);
                ActionStatus::PartiallyApplied(format!("no stored record for {}", id))
            }
            Err(e) => {
                log_error!("[Rules] {} applied to {} remotely, store update failed: {}", action, id, e);
                ActionStatus::PartiallyApplied(e.to_string())
            }
        }
    }
}
