//! Mail spool stored in `.circulation/outbox.jsonl`
//!
//! Stands in for a mail relay: every accepted envelope becomes one line
//! that an external mailer can pick up.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::jsonl::JsonlLog;
use super::{Envelope, NotifierGateway, StoreResult};

/// One spooled message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub address: String,
    pub subject: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// [`NotifierGateway`] that writes accepted envelopes to a JSONL outbox
pub struct OutboxNotifier {
    log: JsonlLog<SentMessage>,
}

impl OutboxNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            log: JsonlLog::new(path),
        }
    }

    pub fn for_desk(desk_root: &Path) -> Self {
        Self::new(desk_root.join(".circulation").join("outbox.jsonl"))
    }

    pub fn path(&self) -> &Path {
        self.log.path()
    }

    /// Every spooled message, oldest first
    pub fn sent(&self) -> StoreResult<Vec<SentMessage>> {
        self.log.read_all()
    }
}

/// Checks the `local@domain.tld` shape; deliverability is the relay's problem
fn check_address(address: &str) -> Result<(), String> {
    let (local, domain) = address
        .split_once('@')
        .ok_or_else(|| format!("invalid address '{}'", address))?;

    let plausible = !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !address.chars().any(char::is_whitespace);

    if plausible {
        Ok(())
    } else {
        Err(format!("invalid address '{}'", address))
    }
}

impl NotifierGateway for OutboxNotifier {
    fn send_batch(&self, batch: &[Envelope]) -> Vec<Result<(), String>> {
        let now = Utc::now();
        let checked: Vec<Result<(), String>> =
            batch.iter().map(|e| check_address(&e.address)).collect();

        let accepted: Vec<SentMessage> = batch
            .iter()
            .zip(&checked)
            .filter(|(_, check)| check.is_ok())
            .map(|(envelope, _)| SentMessage {
                address: envelope.address.clone(),
                subject: envelope.subject.clone(),
                body: envelope.body.clone(),
                sent_at: now,
            })
            .collect();

        if accepted.is_empty() {
            return checked;
        }

        match self.log.append_all(&accepted) {
            Ok(()) => checked,
            Err(e) => {
                let reason = format!("outbox write failed: {}", e);
                checked
                    .into_iter()
                    .map(|check| check.and(Err(reason.clone())))
                    .collect()
            }
        }
    }
}
