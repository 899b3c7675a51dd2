use base64::Engine;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

use super::types::*;

const USING: [&str; 2] = ["urn:ietf:params:jmap:core", "urn:ietf:params:jmap:mail"];

/// Properties requested by `Email/get`. The raw Date header is fetched so
/// stored dates keep the sender's offset.
const EMAIL_PROPERTIES: [&str; 15] = [
    "id",
    "threadId",
    "from",
    "to",
    "subject",
    "receivedAt",
    "sentAt",
    "preview",
    "textBody",
    "htmlBody",
    "bodyValues",
    "keywords",
    "mailboxIds",
    "attachments",
    "header:Date:asText",
];

pub struct JmapClient {
    username: String,
    password: String,
    api_url: String,
    account_id: String,
}

#[derive(Debug, Error)]
pub enum JmapError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("API error: {0}")]
    Api(String),
}

impl JmapClient {
    fn auth_header(username: &str, password: &str) -> String {
        let credentials = format!("{}:{}", username, password);
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        format!("Basic {}", encoded)
    }

    /// GET `url`, following redirects by hand so the Authorization header
    /// survives cross-host hops.
    fn get_following_redirects(
        url: &str,
        auth: &str,
        max_redirects: u32,
    ) -> Result<String, JmapError> {
        let agent = ureq::AgentBuilder::new().redirects(0).build();
        let mut current_url = url.to_string();

        for hop in 0..max_redirects {
            log_debug!("[JMAP] Session request {} to: {}", hop + 1, current_url);

            let (status, resp) = match agent.get(&current_url).set("Authorization", auth).call() {
                Ok(resp) => (resp.status(), resp),
                Err(ureq::Error::Status(code, resp)) => (code, resp),
                Err(e) => {
                    log_error!("[JMAP] Connection error: {}", e);
                    return Err(JmapError::Http(e.to_string()));
                }
            };

            if (300..400).contains(&status) {
                let location = resp.header("location").ok_or_else(|| {
                    JmapError::Http(format!("Redirect {} without Location header", status))
                })?;
                log_debug!("[JMAP] Following redirect {} -> {}", status, location);
                current_url = Self::resolve_redirect(&current_url, location);
                continue;
            }

            let body = resp
                .into_string()
                .map_err(|e| JmapError::Parse(format!("Failed to read response: {}", e)))?;

            if status == 401 {
                return Err(JmapError::Http(
                    "Authentication failed (401 Unauthorized)".to_string(),
                ));
            }
            if status >= 400 {
                log_error!("[JMAP] HTTP error {}: {}", status, truncate_str(&body, 200));
                return Err(JmapError::Http(format!("HTTP {} from {}", status, current_url)));
            }
            if body.is_empty() {
                return Err(JmapError::Http(format!(
                    "Server returned empty response (status {})",
                    status
                )));
            }
            return Ok(body);
        }

        Err(JmapError::Http("Too many redirects".to_string()))
    }

    fn resolve_redirect(base_url: &str, location: &str) -> String {
        if location.starts_with("http://") || location.starts_with("https://") {
            return location.to_string();
        }
        let Some(scheme_end) = base_url.find("://").map(|i| i + 3) else {
            return location.to_string();
        };
        if location.starts_with('/') {
            let host_end = base_url[scheme_end..]
                .find('/')
                .map(|i| scheme_end + i)
                .unwrap_or(base_url.len());
            format!("{}{}", &base_url[..host_end], location)
        } else {
            match base_url.rfind('/') {
                Some(slash) if slash >= scheme_end => {
                    format!("{}/{}", &base_url[..slash], location)
                }
                _ => format!("{}/{}", base_url, location),
            }
        }
    }

    /// Fetch the session resource and build a client bound to the primary
    /// mail account.
    pub fn discover(
        well_known_url: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, JmapError> {
        log_info!("[JMAP] Discovering session from: {}", well_known_url);
        let auth = Self::auth_header(username, password);
        let body = Self::get_following_redirects(well_known_url, &auth, 5)?;

        let session: JmapSession = serde_json::from_str(&body).map_err(|e| {
            JmapError::Parse(format!(
                "Failed to parse session: {}. Response was: {}",
                e,
                truncate_str(&body, 500)
            ))
        })?;

        let account_id = session
            .mail_account_id()
            .ok_or_else(|| JmapError::Api("No mail account in session".to_string()))?
            .to_string();

        log_info!(
            "[JMAP] Session for {} ready, account_id: {}",
            session.username,
            account_id
        );

        Ok(JmapClient {
            username: username.to_string(),
            password: password.to_string(),
            api_url: session.api_url,
            account_id,
        })
    }

    fn call(&self, method: &'static str, args: Value) -> Result<Value, JmapError> {
        let request = JmapRequest {
            using: USING.to_vec(),
            method_calls: vec![MethodCall(method, args, "0".to_string())],
        };
        let auth = Self::auth_header(&self.username, &self.password);

        let response = ureq::post(&self.api_url)
            .set("Authorization", &auth)
            .set("Content-Type", "application/json")
            .send_json(&request)
            .map_err(|e| {
                log_error!("[JMAP] {} failed: {}", method, e);
                JmapError::Http(e.to_string())
            })?;

        let text = response
            .into_string()
            .map_err(|e| JmapError::Parse(format!("Failed to read response: {}", e)))?;
        log_debug!(
            "[JMAP] {} response ({} bytes): {}",
            method,
            text.len(),
            truncate_str(&text, 1000)
        );

        let parsed: JmapResponse = serde_json::from_str(&text)
            .map_err(|e| JmapError::Parse(format!("Failed to parse response: {}", e)))?;

        match parsed.method_responses.into_iter().next() {
            Some(MethodResponse(name, args, _)) if name == method => Ok(args),
            Some(MethodResponse(name, args, _)) if name == "error" => Err(JmapError::Api(format!(
                "{} rejected: {}",
                method,
                args.get("type").and_then(Value::as_str).unwrap_or("unknown")
            ))),
            Some(MethodResponse(name, _, _)) => Err(JmapError::Api(format!(
                "Unexpected response {} for {}",
                name, method
            ))),
            None => Err(JmapError::Api(format!("Empty response for {}", method))),
        }
    }

    fn call_as<T: DeserializeOwned>(
        &self,
        method: &'static str,
        args: Value,
    ) -> Result<T, JmapError> {
        let value = self.call(method, args)?;
        serde_json::from_value(value).map_err(|e| JmapError::Parse(e.to_string()))
    }

    pub fn get_mailboxes(&self) -> Result<Vec<Mailbox>, JmapError> {
        let response: MailboxGetResponse = self.call_as(
            "Mailbox/get",
            json!({ "accountId": self.account_id, "ids": null }),
        )?;
        log_info!("[JMAP] Mailbox/get returned {} mailboxes", response.list.len());
        Ok(response.list)
    }

    /// Create a top-level mailbox and return its server id.
    pub fn create_mailbox(&self, name: &str) -> Result<String, JmapError> {
        log_info!("[JMAP] Mailbox/set creating mailbox: {}", name);
        let args = self.call(
            "Mailbox/set",
            json!({
                "accountId": self.account_id,
                "create": { "newMailbox": { "name": name } }
            }),
        )?;

        if let Some(reason) = args.get("notCreated").and_then(|n| n.get("newMailbox")) {
            return Err(JmapError::Api(format!(
                "Failed to create mailbox '{}': {}",
                name, reason
            )));
        }
        args.get("created")
            .and_then(|c| c.get("newMailbox"))
            .and_then(|m| m.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| JmapError::Api("Mailbox/set did not return a created id".to_string()))
    }

    /// Newest-first ids in `mailbox_id`.
    pub fn query_emails(
        &self,
        mailbox_id: &str,
        limit: u32,
        position: u32,
    ) -> Result<EmailQueryResponse, JmapError> {
        log_info!(
            "[JMAP] Email/query for mailbox: {} (limit: {}, position: {})",
            mailbox_id,
            limit,
            position
        );
        let response: EmailQueryResponse = self.call_as(
            "Email/query",
            json!({
                "accountId": self.account_id,
                "filter": { "inMailbox": mailbox_id },
                "sort": [{ "property": "receivedAt", "isAscending": false }],
                "collapseThreads": false,
                "limit": limit,
                "position": position
            }),
        )?;
        log_debug!(
            "[JMAP] Email/query returned {} ids (total: {:?})",
            response.ids.len(),
            response.total
        );
        Ok(response)
    }

    pub fn get_emails(&self, ids: &[String]) -> Result<Vec<Email>, JmapError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        log_info!("[JMAP] Email/get for {} email IDs", ids.len());
        let response: EmailGetResponse = self.call_as(
            "Email/get",
            json!({
                "accountId": self.account_id,
                "ids": ids,
                "properties": EMAIL_PROPERTIES,
                "fetchTextBodyValues": true,
                "fetchHTMLBodyValues": true,
                "maxBodyValueBytes": 256 * 1024
            }),
        )?;
        Ok(response.list)
    }

    pub fn mark_email_read(&self, id: &str) -> Result<(), JmapError> {
        log_info!("[JMAP] Email/set marking as read: {}", id);
        self.update_email(id, json!({ "keywords/$seen": true }))
    }

    pub fn mark_email_unread(&self, id: &str) -> Result<(), JmapError> {
        log_info!("[JMAP] Email/set marking as unread: {}", id);
        self.update_email(id, json!({ "keywords/$seen": null }))
    }

    /// Replace the email's mailboxes with `to_mailbox_id`.
    pub fn move_email(&self, id: &str, to_mailbox_id: &str) -> Result<(), JmapError> {
        log_info!("[JMAP] Email/set moving {} to mailbox {}", id, to_mailbox_id);
        self.update_email(id, json!({ "mailboxIds": { to_mailbox_id: true } }))
    }

    fn update_email(&self, id: &str, patch: Value) -> Result<(), JmapError> {
        let args = self.call(
            "Email/set",
            json!({
                "accountId": self.account_id,
                "update": { id: patch }
            }),
        )?;
        match args.get("notUpdated").and_then(|n| n.get(id)) {
            Some(reason) => Err(JmapError::Api(format!(
                "Email/set rejected {}: {}",
                id, reason
            ))),
            None => Ok(()),
        }
    }
}

fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
