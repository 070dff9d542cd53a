//! Inbound message log
//!
//! One JSON-lines file per tenant. Direct messages are recorded as
//! conversation entries: `lead` for the contact, `business` for messages
//! the tenant sent from another device.

use crate::config::{schema::Config, ConfigManager};
use crate::error::{SessiondError, SessiondResult};
use crate::tenant::TenantId;
use crate::transport::InboundMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    Business,
    Lead,
}

/// A recorded message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxEntry {
    pub id: String,
    pub from: Author,
    pub phone: String,
    pub content: String,
    pub at: DateTime<Utc>,
}

pub struct Inbox {
    dir: PathBuf,
    skip_groups: bool,
}

impl Inbox {
    pub fn new(config: &Config) -> Self {
        Self::at(ConfigManager::inbox_dir(), config.inbox.skip_groups)
    }

    pub fn at(dir: impl Into<PathBuf>, skip_groups: bool) -> Self {
        Self {
            dir: dir.into(),
            skip_groups,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file(&self, tenant: &TenantId) -> PathBuf {
        self.dir.join(format!("{}.jsonl", tenant))
    }

    /// Append a message. Returns false when the message is not recorded
    /// (group chats, messages without content).
    pub async fn record(
        &self,
        tenant: &TenantId,
        message: &InboundMessage,
    ) -> SessiondResult<bool> {
        if self.skip_groups && message.is_group() {
            debug!(tenant = %tenant, "Skipping group message");
            return Ok(false);
        }
        let Some(content) = message.content() else {
            return Ok(false);
        };

        let entry = InboxEntry {
            id: message.id.clone(),
            from: if message.from_me {
                Author::Business
            } else {
                Author::Lead
            },
            phone: message.remote.user().to_string(),
            content: content.to_string(),
            at: message.received_at,
        };

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let path = self.file(tenant);
        let write = async {
            tokio::fs::create_dir_all(&self.dir).await?;
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        };
        write
            .await
            .map_err(|e| SessiondError::io(format!("appending to {}", path.display()), e))?;

        Ok(true)
    }

    /// Most recent entries for a tenant, oldest first
    pub async fn recent(&self, tenant: &TenantId, limit: usize) -> SessiondResult<Vec<InboxEntry>> {
        let path = self.file(tenant);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SessiondError::io(
                    format!("reading {}", path.display()),
                    e,
                ))
            }
        };

        let mut entries: Vec<InboxEntry> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(path = %path.display(), "Skipping unreadable inbox line: {}", e);
                    None
                }
            })
            .collect();

        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use tempfile::TempDir;

    fn acme() -> TenantId {
        TenantId::parse("acme").unwrap()
    }

    fn message(remote: &str, from_me: bool, text: &str) -> InboundMessage {
        InboundMessage {
            id: format!("MSG-{}", text),
            remote: Address::from_network(remote),
            from_me,
            text: Some(text.to_string()),
            has_media: false,
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn records_direct_messages() {
        let temp = TempDir::new().unwrap();
        let inbox = Inbox::at(temp.path(), true);

        let lead = message("5215512345678@s.whatsapp.net", false, "hola");
        let reply = message("5215512345678@s.whatsapp.net", true, "buen dia");
        assert!(inbox.record(&acme(), &lead).await.unwrap());
        assert!(inbox.record(&acme(), &reply).await.unwrap());

        let entries = inbox.recent(&acme(), 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].from, Author::Lead);
        assert_eq!(entries[0].phone, "5215512345678");
        assert_eq!(entries[0].content, "hola");
        assert_eq!(entries[1].from, Author::Business);
    }

    #[tokio::test]
    async fn skips_groups_and_empty_messages() {
        let temp = TempDir::new().unwrap();
        let inbox = Inbox::at(temp.path(), true);

        let group = message("1203630@g.us", false, "hi all");
        let mut empty = message("5215512345678@s.whatsapp.net", false, "x");
        empty.text = None;

        assert!(!inbox.record(&acme(), &group).await.unwrap());
        assert!(!inbox.record(&acme(), &empty).await.unwrap());
        assert!(inbox.recent(&acme(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn group_messages_kept_when_configured() {
        let temp = TempDir::new().unwrap();
        let inbox = Inbox::at(temp.path(), false);

        let group = message("1203630@g.us", false, "hi all");
        assert!(inbox.record(&acme(), &group).await.unwrap());
    }

    #[tokio::test]
    async fn recent_returns_tail() {
        let temp = TempDir::new().unwrap();
        let inbox = Inbox::at(temp.path(), true);

        for text in ["one", "two", "three"] {
            let msg = message("5215512345678@s.whatsapp.net", false, text);
            inbox.record(&acme(), &msg).await.unwrap();
        }

        let entries = inbox.recent(&acme(), 2).await.unwrap();
        let contents: Vec<&str> = entries.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, ["two", "three"]);
    }

    #[tokio::test]
    async fn tenants_have_separate_files() {
        let temp = TempDir::new().unwrap();
        let inbox = Inbox::at(temp.path(), true);
        let globex = TenantId::parse("globex").unwrap();

        let msg = message("5215512345678@s.whatsapp.net", false, "hola");
        inbox.record(&acme(), &msg).await.unwrap();

        assert!(inbox.recent(&globex, 10).await.unwrap().is_empty());
        assert!(temp.path().join("acme.jsonl").exists());
    }
}
