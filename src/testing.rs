//! Recording platform double for unit tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_core::future::BoxFuture;
use teloxide::types::{ChatId, ChatPermissions, MessageId, UserId};

use crate::platform::{
    Member, MemberStatus, Person, Platform, PlatformError, PlatformResult, Rights,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Member(ChatId, UserId),
    Administrators(ChatId),
    OwnRights(ChatId),
    Promote(ChatId, UserId, Rights),
    Demote(ChatId, UserId),
    Restrict(ChatId, UserId, ChatPermissions, Option<DateTime<Utc>>),
    Ban(ChatId, UserId),
    Unban(ChatId, UserId),
    DeleteMessage(ChatId, MessageId),
    PinMessage(ChatId, MessageId),
}

impl Call {
    pub fn is_action(&self) -> bool {
        !matches!(
            self,
            Call::Member(..) | Call::Administrators(_) | Call::OwnRights(_)
        )
    }
}

#[derive(Default)]
struct Inner {
    members: HashMap<(ChatId, UserId), Member>,
    own_rights: Rights,
    unreachable: bool,
    failing_bans: bool,
    calls: Vec<Call>,
}

#[derive(Default)]
pub struct MockPlatform {
    inner: Mutex<Inner>,
}

pub fn person(id: UserId) -> Person {
    Person {
        id,
        name: format!("User {}", id.0),
        username: None,
        is_bot: false,
    }
}

fn unreachable_error() -> PlatformError {
    PlatformError::Timeout(Duration::from_secs(10))
}

impl MockPlatform {
    pub fn new() -> Self {
        let platform = Self::default();
        platform.inner().own_rights = Rights::MODERATOR;
        platform
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn set_status(&self, chat: ChatId, user: UserId, status: MemberStatus) {
        let rights = if status.is_privileged() {
            Rights::MODERATOR
        } else {
            Rights::default()
        };
        self.inner().members.insert(
            (chat, user),
            Member {
                person: person(user),
                status,
                rights,
            },
        );
    }

    pub fn set_own_rights(&self, rights: Rights) {
        self.inner().own_rights = rights;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner().unreachable = unreachable;
    }

    pub fn fail_bans(&self, failing: bool) {
        self.inner().failing_bans = failing;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner().calls.clone()
    }

    pub fn actions(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_action).collect()
    }

    fn record(&self, call: Call) -> PlatformResult<()> {
        let mut inner = self.inner();
        inner.calls.push(call);
        if inner.unreachable {
            Err(unreachable_error())
        } else {
            Ok(())
        }
    }

    fn update_status(&self, chat: ChatId, user: UserId, status: MemberStatus, rights: Rights) {
        let mut inner = self.inner();
        let member = inner.members.entry((chat, user)).or_insert_with(|| Member {
            person: person(user),
            status,
            rights,
        });
        member.status = status;
        member.rights = rights;
    }
}

impl Platform for MockPlatform {
    fn member(&self, chat: ChatId, user: UserId) -> BoxFuture<'_, PlatformResult<Member>> {
        Box::pin(async move {
            self.record(Call::Member(chat, user))?;
            self.inner()
                .members
                .get(&(chat, user))
                .cloned()
                .ok_or(PlatformError::UnknownMember)
        })
    }

    fn administrators(&self, chat: ChatId) -> BoxFuture<'_, PlatformResult<Vec<Member>>> {
        Box::pin(async move {
            self.record(Call::Administrators(chat))?;
            let mut admins: Vec<Member> = self
                .inner()
                .members
                .iter()
                .filter(|((c, _), m)| *c == chat && m.status.is_privileged())
                .map(|(_, m)| m.clone())
                .collect();
            admins.sort_by_key(|m| m.person.id);
            Ok(admins)
        })
    }

    fn own_rights(&self, chat: ChatId) -> BoxFuture<'_, PlatformResult<Rights>> {
        Box::pin(async move {
            self.record(Call::OwnRights(chat))?;
            Ok(self.inner().own_rights)
        })
    }

    fn promote(
        &self,
        chat: ChatId,
        user: UserId,
        rights: Rights,
    ) -> BoxFuture<'_, PlatformResult<()>> {
        Box::pin(async move {
            self.record(Call::Promote(chat, user, rights))?;
            self.update_status(chat, user, MemberStatus::Administrator, rights);
            Ok(())
        })
    }

    fn demote(&self, chat: ChatId, user: UserId) -> BoxFuture<'_, PlatformResult<()>> {
        Box::pin(async move {
            self.record(Call::Demote(chat, user))?;
            self.update_status(chat, user, MemberStatus::Member, Rights::default());
            Ok(())
        })
    }

    fn restrict(
        &self,
        chat: ChatId,
        user: UserId,
        permissions: ChatPermissions,
        until: Option<DateTime<Utc>>,
    ) -> BoxFuture<'_, PlatformResult<()>> {
        Box::pin(async move { self.record(Call::Restrict(chat, user, permissions, until)) })
    }

    fn ban(&self, chat: ChatId, user: UserId) -> BoxFuture<'_, PlatformResult<()>> {
        Box::pin(async move {
            self.record(Call::Ban(chat, user))?;
            if self.inner().failing_bans {
                return Err(unreachable_error());
            }
            self.update_status(chat, user, MemberStatus::Banned, Rights::default());
            Ok(())
        })
    }

    fn unban(&self, chat: ChatId, user: UserId) -> BoxFuture<'_, PlatformResult<()>> {
        Box::pin(async move {
            self.record(Call::Unban(chat, user))?;
            self.update_status(chat, user, MemberStatus::Left, Rights::default());
            Ok(())
        })
    }

    fn delete_message(
        &self,
        chat: ChatId,
        message: MessageId,
    ) -> BoxFuture<'_, PlatformResult<()>> {
        Box::pin(async move { self.record(Call::DeleteMessage(chat, message)) })
    }

    fn pin_message(&self, chat: ChatId, message: MessageId) -> BoxFuture<'_, PlatformResult<()>> {
        Box::pin(async move { self.record(Call::PinMessage(chat, message)) })
    }
}
