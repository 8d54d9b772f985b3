//! Warning escalation.
//!
//! Per chat and user, warnings accumulate until the `THRESHOLD`th one. That
//! warning is never stored: the log is cleared in the same save and a ban is
//! requested from the platform. A failing ban does not bring the warnings
//! back, it is logged so that an operator can ban by hand.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use teloxide::types::{ChatId, UserId};

use crate::platform::{Platform, PlatformError};
use crate::store::{Record, Store};

pub const THRESHOLD: usize = 3;
pub const DEFAULT_REASON: &str = "no reason given";

pub fn reason_or_default(reason: &str) -> &str {
    match reason.trim() {
        "" => DEFAULT_REASON,
        reason => reason,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningEntry {
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub issued_by: UserId,
}

impl WarningEntry {
    pub fn day(&self) -> String {
        self.timestamp.format("%Y-%m-%d").to_string()
    }
}

#[derive(Debug)]
pub enum IssueOutcome {
    /// The warning was recorded; `count` warnings are now on file.
    Warned { count: usize },
    /// The threshold was reached. The log is already cleared; `ban` holds
    /// the result of the ban request.
    Escalated { ban: Result<(), PlatformError> },
}

#[derive(Clone)]
pub struct Warnings {
    store: Arc<Store>,
    platform: Arc<dyn Platform>,
}

impl Warnings {
    pub fn new(store: Arc<Store>, platform: Arc<dyn Platform>) -> Self {
        Self { store, platform }
    }

    pub async fn issue(
        &self,
        chat: ChatId,
        user: UserId,
        reason: &str,
        issuer: UserId,
    ) -> IssueOutcome {
        let entry = WarningEntry {
            reason: reason_or_default(reason).to_owned(),
            timestamp: Utc::now(),
            issued_by: issuer,
        };

        let count = {
            let mut guard = self.store.lock().await;
            let chat_log = guard.warnings.entry(chat).or_default();
            let log = chat_log.entry(user).or_default();
            log.push(entry);
            let count = log.len();
            if count >= THRESHOLD {
                chat_log.remove(&user);
            }
            guard.commit(Record::Warnings).await;
            count
        };

        if count < THRESHOLD {
            log::info!("{issuer} warned {user} in {chat} ({count}/{THRESHOLD})");
            return IssueOutcome::Warned { count };
        }

        log::info!("{user} reached {THRESHOLD} warnings in {chat}, banning");
        let ban = self.platform.ban(chat, user).await;
        if let Err(e) = &ban {
            log::error!(
                "Escalation ban of {user} in {chat} failed after clearing their warnings, \
                 ban manually: {e}"
            );
        }

        IssueOutcome::Escalated { ban }
    }

    pub async fn list(&self, chat: ChatId, user: UserId) -> Vec<WarningEntry> {
        self.store
            .lock()
            .await
            .warnings
            .get(&chat)
            .and_then(|users| users.get(&user))
            .cloned()
            .unwrap_or_default()
    }

    /// Clears all warnings of `user` in `chat`, returning how many there
    /// were. Zero means there was nothing to clear.
    pub async fn reset(&self, chat: ChatId, user: UserId) -> usize {
        let mut guard = self.store.lock().await;
        let removed = guard
            .warnings
            .get_mut(&chat)
            .and_then(|users| users.remove(&user))
            .map_or(0, |log| log.len());

        if removed > 0 {
            guard.commit(Record::Warnings).await;
        }
        removed
    }

    /// Number of warnings currently on file, across every chat.
    pub async fn total(&self) -> usize {
        self.store
            .lock()
            .await
            .warnings
            .values()
            .flat_map(|users| users.values())
            .map(Vec::len)
            .sum()
    }
}
