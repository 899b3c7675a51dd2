use crate::email::{EmailRecord, DEFAULT_FOLDER};
use crate::jmap::client::{JmapClient, JmapError};
use crate::jmap::types::{Email, EmailAddress, Mailbox};
use chrono::DateTime;
use std::cell::RefCell;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error(transparent)]
    Jmap(#[from] JmapError),
    #[error("mailbox '{0}' not found")]
    UnknownMailbox(String),
}

/// Remote mailbox operations the rule engine and CLI rely on.
pub trait MailboxClient {
    /// Newest messages first. An empty mailbox is an empty list, not an error.
    fn fetch_emails(&self, count: usize) -> Result<Vec<EmailRecord>, MailboxError>;
    fn mark_read(&self, id: &str) -> Result<(), MailboxError>;
    fn mark_unread(&self, id: &str) -> Result<(), MailboxError>;
    /// Move `id` into `folder`, creating the folder if it does not exist.
    fn move_message(&self, id: &str, folder: &str) -> Result<(), MailboxError>;
}

/// `MailboxClient` over a JMAP account.
pub struct JmapMailbox {
    client: JmapClient,
    fetch_mailbox: String,
    mailboxes: RefCell<Option<Vec<Mailbox>>>,
}

impl JmapMailbox {
    pub fn new(client: JmapClient, fetch_mailbox: impl Into<String>) -> Self {
        JmapMailbox {
            client,
            fetch_mailbox: fetch_mailbox.into(),
            mailboxes: RefCell::new(None),
        }
    }

    fn mailboxes(&self) -> Result<Vec<Mailbox>, MailboxError> {
        if let Some(cached) = self.mailboxes.borrow().as_ref() {
            return Ok(cached.clone());
        }
        let fetched = self.client.get_mailboxes()?;
        *self.mailboxes.borrow_mut() = Some(fetched.clone());
        Ok(fetched)
    }

    fn invalidate_mailboxes(&self) {
        *self.mailboxes.borrow_mut() = None;
    }

    /// Resolve `folder` to a mailbox id, creating the mailbox when no
    /// existing one matches.
    fn resolve_or_create(&self, folder: &str) -> Result<String, MailboxError> {
        if let Some(id) = resolve_mailbox_id(folder, &self.mailboxes()?) {
            return Ok(id);
        }
        log_info!("[JMAP] Mailbox '{}' not found, creating it", folder);
        let id = self.client.create_mailbox(folder)?;
        self.invalidate_mailboxes();
        Ok(id)
    }
}

impl MailboxClient for JmapMailbox {
    fn fetch_emails(&self, count: usize) -> Result<Vec<EmailRecord>, MailboxError> {
        let mailboxes = self.mailboxes()?;
        let mailbox_id = resolve_mailbox_id(&self.fetch_mailbox, &mailboxes)
            .ok_or_else(|| MailboxError::UnknownMailbox(self.fetch_mailbox.clone()))?;

        let limit = u32::try_from(count).unwrap_or(u32::MAX);
        let query = self.client.query_emails(&mailbox_id, limit, 0)?;
        if query.ids.is_empty() {
            log_info!("[JMAP] No messages found in '{}'", self.fetch_mailbox);
            return Ok(Vec::new());
        }

        let emails = self.client.get_emails(&query.ids)?;
        log_info!("[JMAP] {} message(s) found", emails.len());
        Ok(emails
            .iter()
            .map(|email| to_record(email, &mailboxes, Some(mailbox_id.as_str())))
            .collect())
    }

    fn mark_read(&self, id: &str) -> Result<(), MailboxError> {
        self.client.mark_email_read(id)?;
        Ok(())
    }

    fn mark_unread(&self, id: &str) -> Result<(), MailboxError> {
        self.client.mark_email_unread(id)?;
        Ok(())
    }

    fn move_message(&self, id: &str, folder: &str) -> Result<(), MailboxError> {
        let mailbox_id = self.resolve_or_create(folder)?;
        self.client.move_email(id, &mailbox_id)?;
        Ok(())
    }
}

/// Resolve a mailbox name/path to a JMAP mailbox ID.
/// Tries exact name, case-insensitive name, role, then "Parent/Child" path.
pub fn resolve_mailbox_id(name: &str, mailboxes: &[Mailbox]) -> Option<String> {
    if let Some(mbox) = mailboxes.iter().find(|m| m.name == name) {
        return Some(mbox.id.clone());
    }

    let lower = name.to_lowercase();
    if let Some(mbox) = mailboxes.iter().find(|m| m.name.to_lowercase() == lower) {
        log_debug!(
            "[JMAP] Resolved mailbox '{}' by case-insensitive name -> {}",
            name,
            mbox.id
        );
        return Some(mbox.id.clone());
    }

    if let Some(mbox) = mailboxes
        .iter()
        .find(|m| m.role.as_deref().map(str::to_lowercase).as_deref() == Some(lower.as_str()))
    {
        log_debug!("[JMAP] Resolved mailbox '{}' by role -> {}", name, mbox.id);
        return Some(mbox.id.clone());
    }

    if name.contains('/') {
        let by_id: HashMap<&str, &Mailbox> =
            mailboxes.iter().map(|m| (m.id.as_str(), m)).collect();
        for mbox in mailboxes {
            let mut path = vec![mbox.name.as_str()];
            let mut current = mbox;
            while let Some(parent) = current
                .parent_id
                .as_deref()
                .and_then(|p| by_id.get(p).copied())
            {
                if path.len() > mailboxes.len() {
                    break;
                }
                path.push(parent.name.as_str());
                current = parent;
            }
            path.reverse();
            if path.join("/") == name {
                log_debug!("[JMAP] Resolved mailbox '{}' by path -> {}", name, mbox.id);
                return Some(mbox.id.clone());
            }
        }
    }

    None
}

fn format_addresses(addrs: &Option<Vec<EmailAddress>>) -> String {
    addrs
        .as_ref()
        .map(|list| {
            list.iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

/// Prefer the raw Date header; otherwise render the JMAP timestamps as
/// RFC 2822 so every stored date has the same shape.
fn extract_date(email: &Email) -> String {
    if let Some(raw) = email
        .extra
        .get("header:Date:asText")
        .and_then(|v| v.as_str())
    {
        let raw = raw.trim();
        if !raw.is_empty() {
            return raw.to_string();
        }
    }
    email
        .sent_at
        .as_deref()
        .or(email.received_at.as_deref())
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| dt.to_rfc2822())
        .unwrap_or_default()
}

fn extract_body(email: &Email) -> String {
    if let Some(ref parts) = email.text_body {
        for part in parts {
            if let Some(value) = email.body_values.get(&part.part_id) {
                if !value.value.trim().is_empty() {
                    return value.value.clone();
                }
            }
        }
    }
    if let Some(ref parts) = email.html_body {
        for part in parts {
            if let Some(value) = email.body_values.get(&part.part_id) {
                match html2text::from_read(value.value.as_bytes(), 100) {
                    Ok(text) => return text,
                    Err(e) => log_warn!("[JMAP] Failed to convert HTML body of {}: {}", email.id, e),
                }
            }
        }
    }
    email.preview.clone().unwrap_or_default()
}

/// Convert a JMAP email into the record stored locally. The folder is the
/// fetched mailbox when the email is in it, otherwise its first mailbox.
pub fn to_record(email: &Email, mailboxes: &[Mailbox], fetched_from: Option<&str>) -> EmailRecord {
    let folder_id = fetched_from
        .filter(|id| email.mailbox_ids.contains_key(*id))
        .map(str::to_string)
        .or_else(|| {
            let mut ids: Vec<&String> = email.mailbox_ids.keys().collect();
            ids.sort();
            ids.first().map(|id| id.to_string())
        });
    let folder_name = folder_id
        .and_then(|id| mailboxes.iter().find(|m| m.id == id))
        .map(|m| m.name.clone())
        .unwrap_or_else(|| DEFAULT_FOLDER.to_string());

    let attachment_types: Vec<String> = email
        .attachments
        .as_ref()
        .map(|parts| parts.iter().filter_map(|p| p.r#type.clone()).collect())
        .unwrap_or_default();
    let has_attachment = email.attachments.as_ref().is_some_and(|a| !a.is_empty());

    EmailRecord {
        id: email.id.clone(),
        sender: format_addresses(&email.from),
        recipient: format_addresses(&email.to),
        subject: email.subject.clone().unwrap_or_default(),
        snippet: email.preview.clone().unwrap_or_default(),
        body: extract_body(email),
        date: extract_date(email),
        has_attachment,
        attachment_types,
        is_read: email.keywords.contains_key("$seen"),
        folder_name,
    }
}
