//! Durable moderation state.
//!
//! Every logical structure lives in its own JSON record inside the data
//! directory and is replaced atomically (write to a temporary file, then
//! rename over the target). All structures are loaded once at startup and
//! mutated in memory behind a single lock; whoever mutates a structure
//! commits exactly that record before releasing the lock.

use std::collections::{BTreeSet, HashMap};
use std::io::ErrorKind;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use teloxide::types::{ChatId, UserId};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

use crate::warnings::WarningEntry;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    Owner,
    BotAdmins,
    Warnings,
    Welcome,
    Rules,
    Stats,
}

impl Record {
    pub const ALL: [Record; 6] = [
        Record::Owner,
        Record::BotAdmins,
        Record::Warnings,
        Record::Welcome,
        Record::Rules,
        Record::Stats,
    ];

    fn file_name(self) -> &'static str {
        match self {
            Record::Owner => "owner.json",
            Record::BotAdmins => "admins.json",
            Record::Warnings => "warnings.json",
            Record::Welcome => "welcome.json",
            Record::Rules => "rules.json",
            Record::Stats => "stats.json",
        }
    }

    fn path(self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRecord {
    pub owner: Option<UserId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub chats: BTreeSet<ChatId>,
    pub users: BTreeSet<UserId>,
}

pub type BotAdmins = HashMap<ChatId, BTreeSet<UserId>>;
pub type WarningLog = HashMap<ChatId, HashMap<UserId, Vec<WarningEntry>>>;

#[derive(Debug, Default)]
pub struct State {
    pub owner: OwnerRecord,
    pub bot_admins: BotAdmins,
    pub warnings: WarningLog,
    pub welcome: HashMap<ChatId, String>,
    pub rules: HashMap<ChatId, String>,
    pub stats: UsageStats,
}

impl State {
    fn encode(&self, record: Record) -> Result<Vec<u8>, serde_json::Error> {
        match record {
            Record::Owner => serde_json::to_vec_pretty(&self.owner),
            Record::BotAdmins => serde_json::to_vec_pretty(&self.bot_admins),
            Record::Warnings => serde_json::to_vec_pretty(&self.warnings),
            Record::Welcome => serde_json::to_vec_pretty(&self.welcome),
            Record::Rules => serde_json::to_vec_pretty(&self.rules),
            Record::Stats => serde_json::to_vec_pretty(&self.stats),
        }
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    let io_err = |source| StoreError::Io {
        path: path.to_owned(),
        source,
    };

    tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)
}

async fn load_record<T>(dir: &Path, record: Record) -> T
where
    T: DeserializeOwned + Serialize + Default,
{
    let path = record.path(dir);

    match tokio::fs::read(&path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(value) => {
                log::info!("Loaded {}", path.display());
                value
            }
            Err(e) => {
                log::error!("Corrupt record {}, falling back to default: {e}", path.display());
                T::default()
            }
        },
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let value = T::default();
            let created = match serde_json::to_vec_pretty(&value) {
                Ok(bytes) => write_atomic(&path, &bytes).await,
                Err(e) => Err(e.into()),
            };
            match created {
                Ok(()) => log::info!("Created {}", path.display()),
                Err(e) => log::error!("Couldn't create {}: {e}", path.display()),
            }
            value
        }
        Err(e) => {
            log::error!("Couldn't read {}, falling back to default: {e}", path.display());
            T::default()
        }
    }
}

pub struct Store {
    dir: PathBuf,
    state: Mutex<State>,
}

impl Store {
    /// Loads every record from `dir`, creating the directory if needed.
    /// Missing or unreadable records start out empty.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;

        let state = State {
            owner: load_record(&dir, Record::Owner).await,
            bot_admins: load_record(&dir, Record::BotAdmins).await,
            warnings: load_record(&dir, Record::Warnings).await,
            welcome: load_record(&dir, Record::Welcome).await,
            rules: load_record(&dir, Record::Rules).await,
            stats: load_record(&dir, Record::Stats).await,
        };

        Ok(Self {
            dir,
            state: Mutex::new(state),
        })
    }

    pub async fn lock(&self) -> StoreGuard<'_> {
        StoreGuard {
            state: self.state.lock().await,
            dir: &self.dir,
        }
    }

    /// Writes every record back; used at shutdown. A failing record doesn't
    /// keep the others from being written, the first error is returned.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let guard = self.lock().await;
        let mut first_error = None;
        for record in Record::ALL {
            if let Err(e) = guard.save(record).await {
                log::error!("Flushing {} failed: {e}", record.file_name());
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                log::info!("State flushed to {}", self.dir.display());
                Ok(())
            }
        }
    }

    pub async fn owner(&self) -> Option<UserId> {
        self.lock().await.owner.owner
    }

    pub async fn is_bot_admin(&self, chat: ChatId, user: UserId) -> bool {
        self.lock()
            .await
            .bot_admins
            .get(&chat)
            .is_some_and(|admins| admins.contains(&user))
    }

    /// Remembers that `chat` and `users` have been seen. Only saves when
    /// something new was added.
    pub async fn record_usage(&self, chat: Option<ChatId>, users: &[UserId]) {
        let mut guard = self.lock().await;
        let mut changed = false;
        if let Some(chat) = chat {
            changed |= guard.stats.chats.insert(chat);
        }
        for user in users {
            changed |= guard.stats.users.insert(*user);
        }
        if changed {
            guard.commit(Record::Stats).await;
        }
    }
}

pub struct StoreGuard<'a> {
    state: MutexGuard<'a, State>,
    dir: &'a Path,
}

impl StoreGuard<'_> {
    async fn save(&self, record: Record) -> Result<(), StoreError> {
        let bytes = self.state.encode(record)?;
        write_atomic(&record.path(self.dir), &bytes).await
    }

    /// Persists `record` from the in-memory state. A failed save is logged
    /// and otherwise ignored: the in-memory mutation stands and the durable
    /// copy catches up on the next successful save of the same record.
    pub async fn commit(&self, record: Record) {
        match self.save(record).await {
            Ok(()) => log::debug!("Saved {}", record.file_name()),
            Err(e) => log::error!(
                "Saving {} failed, in-memory state is ahead of disk: {e}",
                record.file_name()
            ),
        }
    }
}

impl Deref for StoreGuard<'_> {
    type Target = State;

    fn deref(&self) -> &State {
        &self.state
    }
}

impl DerefMut for StoreGuard<'_> {
    fn deref_mut(&mut self) -> &mut State {
        &mut self.state
    }
}
