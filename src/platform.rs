//! Access to the chat platform: membership lookups and moderation actions.

use std::future::IntoFuture;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_core::future::BoxFuture;
use teloxide::prelude::*;
use teloxide::types::{ChatMember, ChatMemberKind, ChatPermissions, MessageId, User};
use teloxide::{ApiError, RequestError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    /// The platform answered, and the user is not a member it knows of.
    #[error("no such member")]
    UnknownMember,
    #[error("request failed: {0}")]
    Request(#[from] RequestError),
    #[error("no response within {0:?}")]
    Timeout(Duration),
}

impl PlatformError {
    fn from_member_lookup(e: PlatformError) -> PlatformError {
        match e {
            PlatformError::Request(RequestError::Api(ApiError::UserNotFound)) => {
                PlatformError::UnknownMember
            }
            PlatformError::Request(RequestError::Api(ApiError::Unknown(msg)))
                if msg.contains("PARTICIPANT_ID_INVALID") =>
            {
                PlatformError::UnknownMember
            }
            e => e,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub id: UserId,
    pub name: String,
    pub username: Option<String>,
    pub is_bot: bool,
}

impl From<&User> for Person {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.full_name(),
            username: user.username.clone(),
            is_bot: user.is_bot,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Owner,
    Administrator,
    Member,
    Restricted,
    Left,
    Banned,
}

impl MemberStatus {
    pub fn is_privileged(self) -> bool {
        matches!(self, MemberStatus::Owner | MemberStatus::Administrator)
    }

    pub fn is_present(self) -> bool {
        !matches!(self, MemberStatus::Left | MemberStatus::Banned)
    }
}

/// Administrative rights that can be handed out by promotion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rights {
    pub delete_messages: bool,
    pub restrict_members: bool,
    pub pin_messages: bool,
    pub invite_users: bool,
}

impl Rights {
    pub const MODERATOR: Rights = Rights {
        delete_messages: true,
        restrict_members: true,
        pin_messages: true,
        invite_users: true,
    };

    /// Never grants anything `ceiling` lacks.
    pub fn clamp(self, ceiling: Rights) -> Rights {
        Rights {
            delete_messages: self.delete_messages && ceiling.delete_messages,
            restrict_members: self.restrict_members && ceiling.restrict_members,
            pin_messages: self.pin_messages && ceiling.pin_messages,
            invite_users: self.invite_users && ceiling.invite_users,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub person: Person,
    pub status: MemberStatus,
    pub rights: Rights,
}

impl From<&ChatMember> for Member {
    fn from(member: &ChatMember) -> Self {
        let kind = &member.kind;
        let (status, rights) = match kind {
            ChatMemberKind::Owner(_) => (MemberStatus::Owner, Rights::MODERATOR),
            ChatMemberKind::Administrator(admin) => (
                MemberStatus::Administrator,
                Rights {
                    delete_messages: admin.can_delete_messages,
                    restrict_members: admin.can_restrict_members,
                    pin_messages: admin.can_pin_messages,
                    invite_users: admin.can_invite_users,
                },
            ),
            _ if kind.is_banned() => (MemberStatus::Banned, Rights::default()),
            _ if kind.is_left() => (MemberStatus::Left, Rights::default()),
            _ if kind.is_restricted() => (MemberStatus::Restricted, Rights::default()),
            _ => (MemberStatus::Member, Rights::default()),
        };

        Self {
            person: Person::from(&member.user),
            status,
            rights,
        }
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// The operations the bot needs from the chat platform. Every call is a
/// single attempt; failures are returned to the caller, never retried.
pub trait Platform: Send + Sync {
    fn member(&self, chat: ChatId, user: UserId) -> BoxFuture<'_, PlatformResult<Member>>;

    fn administrators(&self, chat: ChatId) -> BoxFuture<'_, PlatformResult<Vec<Member>>>;

    /// Rights the bot account itself holds in `chat`.
    fn own_rights(&self, chat: ChatId) -> BoxFuture<'_, PlatformResult<Rights>>;

    fn promote(&self, chat: ChatId, user: UserId, rights: Rights)
        -> BoxFuture<'_, PlatformResult<()>>;

    fn demote(&self, chat: ChatId, user: UserId) -> BoxFuture<'_, PlatformResult<()>>;

    fn restrict(
        &self,
        chat: ChatId,
        user: UserId,
        permissions: ChatPermissions,
        until: Option<DateTime<Utc>>,
    ) -> BoxFuture<'_, PlatformResult<()>>;

    fn ban(&self, chat: ChatId, user: UserId) -> BoxFuture<'_, PlatformResult<()>>;

    fn unban(&self, chat: ChatId, user: UserId) -> BoxFuture<'_, PlatformResult<()>>;

    fn delete_message(&self, chat: ChatId, message: MessageId)
        -> BoxFuture<'_, PlatformResult<()>>;

    fn pin_message(&self, chat: ChatId, message: MessageId) -> BoxFuture<'_, PlatformResult<()>>;
}

pub struct TelegramPlatform {
    bot: Bot,
    me: UserId,
    timeout: Duration,
}

impl TelegramPlatform {
    pub async fn new(bot: Bot, timeout: Duration) -> Result<Self, RequestError> {
        let me = bot.get_me().await?.user.id;
        log::info!("Running as bot account {me}");
        Ok(Self { bot, me, timeout })
    }

    async fn bounded<R, T>(&self, request: R) -> PlatformResult<T>
    where
        R: IntoFuture<Output = Result<T, RequestError>>,
    {
        match tokio::time::timeout(self.timeout, request.into_future()).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(PlatformError::Timeout(self.timeout)),
        }
    }
}

impl Platform for TelegramPlatform {
    fn member(&self, chat: ChatId, user: UserId) -> BoxFuture<'_, PlatformResult<Member>> {
        Box::pin(async move {
            let member = self
                .bounded(self.bot.get_chat_member(chat, user))
                .await
                .map_err(PlatformError::from_member_lookup)?;
            Ok(Member::from(&member))
        })
    }

    fn administrators(&self, chat: ChatId) -> BoxFuture<'_, PlatformResult<Vec<Member>>> {
        Box::pin(async move {
            let admins = self
                .bounded(self.bot.get_chat_administrators(chat))
                .await?;
            Ok(admins.iter().map(Member::from).collect())
        })
    }

    fn own_rights(&self, chat: ChatId) -> BoxFuture<'_, PlatformResult<Rights>> {
        Box::pin(async move { Ok(self.member(chat, self.me).await?.rights) })
    }

    fn promote(
        &self,
        chat: ChatId,
        user: UserId,
        rights: Rights,
    ) -> BoxFuture<'_, PlatformResult<()>> {
        Box::pin(async move {
            let request = self
                .bot
                .promote_chat_member(chat, user)
                .is_anonymous(false)
                .can_delete_messages(rights.delete_messages)
                .can_restrict_members(rights.restrict_members)
                .can_pin_messages(rights.pin_messages)
                .can_invite_users(rights.invite_users)
                .can_change_info(false)
                .can_promote_members(false)
                .can_manage_chat(false)
                .can_post_messages(false)
                .can_edit_messages(false)
                .can_manage_video_chats(false);
            self.bounded(request).await?;
            Ok(())
        })
    }

    fn demote(&self, chat: ChatId, user: UserId) -> BoxFuture<'_, PlatformResult<()>> {
        // promoting with every right unset is how the platform demotes
        self.promote(chat, user, Rights::default())
    }

    fn restrict(
        &self,
        chat: ChatId,
        user: UserId,
        permissions: ChatPermissions,
        until: Option<DateTime<Utc>>,
    ) -> BoxFuture<'_, PlatformResult<()>> {
        Box::pin(async move {
            let mut request = self.bot.restrict_chat_member(chat, user, permissions);
            if let Some(until) = until {
                request = request.until_date(until);
            }
            self.bounded(request).await?;
            Ok(())
        })
    }

    fn ban(&self, chat: ChatId, user: UserId) -> BoxFuture<'_, PlatformResult<()>> {
        Box::pin(async move {
            self.bounded(self.bot.ban_chat_member(chat, user)).await?;
            Ok(())
        })
    }

    fn unban(&self, chat: ChatId, user: UserId) -> BoxFuture<'_, PlatformResult<()>> {
        Box::pin(async move {
            self.bounded(self.bot.unban_chat_member(chat, user)).await?;
            Ok(())
        })
    }

    fn delete_message(
        &self,
        chat: ChatId,
        message: MessageId,
    ) -> BoxFuture<'_, PlatformResult<()>> {
        Box::pin(async move {
            self.bounded(self.bot.delete_message(chat, message)).await?;
            Ok(())
        })
    }

    fn pin_message(&self, chat: ChatId, message: MessageId) -> BoxFuture<'_, PlatformResult<()>> {
        Box::pin(async move {
            let request = self
                .bot
                .pin_chat_message(chat, message)
                .disable_notification(true);
            self.bounded(request).await?;
            Ok(())
        })
    }
}
