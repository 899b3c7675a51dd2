use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

pub const DEFAULT_FOLDER: &str = "INBOX";

/// One message as the rule engine sees it. `id` is the join key between the
/// remote mailbox and the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRecord {
    pub id: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub recipient: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub body: String,
    /// RFC 2822 date string, e.g. `Mon, 1 Jan 2024 10:00:00 +0000`.
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub has_attachment: bool,
    #[serde(default)]
    pub attachment_types: Vec<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default = "default_folder")]
    pub folder_name: String,
}

fn default_folder() -> String {
    DEFAULT_FOLDER.to_string()
}

impl EmailRecord {
    pub fn new(id: impl Into<String>) -> Self {
        EmailRecord {
            id: id.into(),
            sender: String::new(),
            recipient: String::new(),
            subject: String::new(),
            snippet: String::new(),
            body: String::new(),
            date: String::new(),
            has_attachment: false,
            attachment_types: Vec::new(),
            is_read: false,
            folder_name: default_folder(),
        }
    }

    pub fn received_at(&self) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
        DateTime::parse_from_rfc2822(self.date.trim())
    }
}

impl std::fmt::Display for EmailRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "From: {}", self.sender)?;
        writeln!(f, "To: {}", self.recipient)?;
        writeln!(f, "Subject: {}", self.subject)?;
        writeln!(f, "Date: {}", self.date)?;
        writeln!(f, "Folder: {}", self.folder_name)?;
        writeln!(f, "Is Read: {}", self.is_read)?;
        writeln!(f, "Snippet: {}", self.snippet)?;
        if self.has_attachment {
            writeln!(f, "Attachment Types: {}", self.attachment_types.join(", "))?;
        }
        write!(f, "{}", "-".repeat(50))
    }
}
