use crate::email::EmailRecord;
use redb::{Database, ReadableTable, TableDefinition};
use std::cmp::Reverse;
use std::path::{Path, PathBuf};
use thiserror::Error;

const EMAILS: TableDefinition<&str, &[u8]> = TableDefinition::new("emails");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create store dir {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("store database: {0}")]
    Database(#[from] redb::DatabaseError),
    #[error("store transaction: {0}")]
    Transaction(#[from] redb::TransactionError),
    #[error("store table: {0}")]
    Table(#[from] redb::TableError),
    #[error("store storage: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("store commit: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("store record encoding: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Local persistence of fetched emails, keyed by id.
pub trait EmailRepository {
    /// Every stored email, newest first.
    fn get_all_emails(&self) -> Result<Vec<EmailRecord>, StoreError>;
    /// Apply a read-state and/or folder change. Returns false when no record
    /// with `id` exists.
    fn update_status(
        &self,
        id: &str,
        is_read: Option<bool>,
        folder: Option<&str>,
    ) -> Result<bool, StoreError>;
    /// Insert or replace the record with the same id.
    fn store_email(&self, email: &EmailRecord) -> Result<(), StoreError>;
}

pub struct Store {
    db: Database,
}

/// `$XDG_CACHE_HOME/mailrules/emails.redb`, falling back to `~/.cache`.
pub fn default_path() -> PathBuf {
    let dir = if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("mailrules")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("mailrules")
    } else {
        PathBuf::from("/tmp").join("mailrules-cache")
    };
    dir.join("emails.redb")
}

impl Store {
    pub fn open(path: &Path) -> Result<Store, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(EMAILS)?;
        txn.commit()?;

        log_debug!("[Store] Opened {}", path.display());
        Ok(Store { db })
    }

    pub fn get_email(&self, id: &str) -> Result<Option<EmailRecord>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(EMAILS)?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }
}

impl EmailRepository for Store {
    fn get_all_emails(&self) -> Result<Vec<EmailRecord>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(EMAILS)?;
        let mut emails = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            match serde_json::from_slice::<EmailRecord>(value.value()) {
                Ok(email) => emails.push(email),
                Err(e) => log_warn!("[Store] Skipping unreadable record {}: {}", key.value(), e),
            }
        }
        // Undated or unparsable records sort after every dated one.
        emails.sort_by_key(|e| Reverse(e.received_at().ok()));
        Ok(emails)
    }

    fn update_status(
        &self,
        id: &str,
        is_read: Option<bool>,
        folder: Option<&str>,
    ) -> Result<bool, StoreError> {
        let txn = self.db.begin_write()?;
        let updated = {
            let mut table = txn.open_table(EMAILS)?;
            let existing = table.get(id)?.map(|v| v.value().to_vec());
            match existing {
                Some(bytes) => {
                    let mut email: EmailRecord = serde_json::from_slice(&bytes)?;
                    if let Some(read) = is_read {
                        email.is_read = read;
                    }
                    if let Some(folder) = folder {
                        email.folder_name = folder.to_string();
                    }
                    let bytes = serde_json::to_vec(&email)?;
                    table.insert(id, bytes.as_slice())?;
                    true
                }
                None => false,
            }
        };
        txn.commit()?;
        if !updated {
            log_warn!("[Store] update_status: no record with id {}", id);
        }
        Ok(updated)
    }

    fn store_email(&self, email: &EmailRecord) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(email)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(EMAILS)?;
            table.insert(email.id.as_str(), bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_email(id: &str, date: &str) -> EmailRecord {
        let mut email = EmailRecord::new(id);
        email.subject = format!("Subject {}", id);
        email.date = date.to_string();
        email
    }

    fn open_temp() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("nested").join("emails.redb")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_store_and_get_email() {
        let (_dir, store) = open_temp();
        assert!(store.get_email("e1").unwrap().is_none());

        let email = make_test_email("e1", "Thu, 13 Jun 2024 09:00:00 +0000");
        store.store_email(&email).unwrap();
        assert_eq!(store.get_email("e1").unwrap(), Some(email));
    }

    #[test]
    fn test_store_email_upserts_by_id() {
        let (_dir, store) = open_temp();
        let mut email = make_test_email("e1", "Thu, 13 Jun 2024 09:00:00 +0000");
        store.store_email(&email).unwrap();
        email.subject = "Changed".to_string();
        store.store_email(&email).unwrap();

        let all = store.get_all_emails().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].subject, "Changed");
    }

    #[test]
    fn test_get_all_emails_newest_first() {
        let (_dir, store) = open_temp();
        store
            .store_email(&make_test_email("old", "Wed, 12 Jun 2024 08:30:00 +0200"))
            .unwrap();
        store
            .store_email(&make_test_email("undated", "sometime"))
            .unwrap();
        store
            .store_email(&make_test_email("new", "Fri, 14 Jun 2024 10:00:00 +0000"))
            .unwrap();
        store
            .store_email(&make_test_email("mid", "Thu, 13 Jun 2024 09:00:00 +0000"))
            .unwrap();

        let ids: Vec<String> = store
            .get_all_emails()
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old", "undated"]);
    }

    #[test]
    fn test_update_status() {
        let (_dir, store) = open_temp();
        store
            .store_email(&make_test_email("e1", "Thu, 13 Jun 2024 09:00:00 +0000"))
            .unwrap();

        assert!(store.update_status("e1", Some(true), None).unwrap());
        let email = store.get_email("e1").unwrap().unwrap();
        assert!(email.is_read);
        assert_eq!(email.folder_name, "INBOX");

        assert!(store.update_status("e1", None, Some("Archive")).unwrap());
        let email = store.get_email("e1").unwrap().unwrap();
        assert!(email.is_read);
        assert_eq!(email.folder_name, "Archive");
    }

    #[test]
    fn test_update_status_missing_record() {
        let (_dir, store) = open_temp();
        assert!(!store.update_status("nope", Some(true), None).unwrap());
        assert!(store.get_email("nope").unwrap().is_none());
    }

    #[test]
    fn test_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emails.redb");
        {
            let store = Store::open(&path).unwrap();
            store
                .store_email(&make_test_email("e1", "Thu, 13 Jun 2024 09:00:00 +0000"))
                .unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert!(store.get_email("e1").unwrap().is_some());
    }
}
