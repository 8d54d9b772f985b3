//! Command dispatch: resolves the target, checks the actor's tier, then
//! carries out the command against the store, the warning engine and the
//! platform. Every command yields exactly one reply, errors included.

pub mod duration;
pub mod target;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use teloxide::types::{ChatId, ChatPermissions, MessageId, UserId};

use crate::auth::{self, Tier};
use crate::command::Command;
use crate::error::CommandError;
use crate::messages;
use crate::platform::{MemberStatus, Person, Platform, Rights};
use crate::store::{Record, Store};
use crate::warnings::{self, IssueOutcome, Warnings};
use target::{Target, Unresolved};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepliedMessage {
    pub id: MessageId,
    pub author: Option<Person>,
}

/// A command as it arrived, stripped of everything platform specific.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub chat: ChatId,
    pub chat_title: Option<String>,
    pub private: bool,
    pub message: MessageId,
    pub actor: Person,
    pub reply_to: Option<RepliedMessage>,
    /// Users mentioned through text mention entities, in message order.
    pub mentions: Vec<Person>,
    /// Whitespace separated arguments, with mention texts removed.
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Silent,
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Reply::Text(text)
    }
}

type CommandResult = Result<Reply, CommandError>;

fn usage(example: &str) -> CommandError {
    CommandError::MalformedArgument(format!("Usage: {example}"))
}

pub struct Moderation {
    store: Arc<Store>,
    platform: Arc<dyn Platform>,
    warnings: Warnings,
    reverify_delay: Duration,
}

impl Moderation {
    pub fn new(store: Arc<Store>, platform: Arc<dyn Platform>, reverify_delay: Duration) -> Self {
        let warnings = Warnings::new(store.clone(), platform.clone());
        Self {
            store,
            platform,
            warnings,
            reverify_delay,
        }
    }

    pub async fn execute(&self, command: Command, inv: &Invocation) -> Reply {
        log::info!("{command:?} from {} in {}", inv.actor.id, inv.chat);

        match self.run(command, inv).await {
            Ok(reply) => {
                self.store
                    .record_usage(Some(inv.chat), &[inv.actor.id])
                    .await;
                reply
            }
            Err(e) => {
                match &e {
                    CommandError::UpstreamUnavailable(_) => log::warn!("Command failed in {}: {e}", inv.chat),
                    _ => log::info!("Command rejected in {}: {e}", inv.chat),
                }
                Reply::Text(messages::error(&e))
            }
        }
    }

    async fn run(&self, command: Command, inv: &Invocation) -> CommandResult {
        let required = command.required_tier();
        match &command {
            Command::Start => self.start(inv).await,
            Command::Help => Ok(messages::help().into()),
            Command::Rules => self.rules(inv).await,
            Command::SetRules(text) => self.set_rules(inv, text, required).await,
            Command::SetWelcome(text) => self.set_welcome(inv, text, required).await,
            Command::Warn(_) => self.warn(inv, required).await,
            Command::Warns(_) => self.warns(inv).await,
            Command::ResetWarns(_) => self.reset_warns(inv, required).await,
            Command::Ban(_) => self.ban(inv, required).await,
            Command::Unban(_) => self.unban(inv, required).await,
            Command::Kick(_) => self.kick(inv, required).await,
            Command::Mute(_) => self.mute(inv, required).await,
            Command::Unmute(_) => self.unmute(inv, required).await,
            Command::Del => self.delete(inv, required).await,
            Command::Pin => self.pin(inv, required).await,
            Command::Info(_) => self.info(inv).await,
            Command::Admins => self.admins(inv).await,
            Command::ChatId => Ok(messages::chat_info(
                inv.chat,
                inv.chat_title.as_deref(),
                inv.private,
            )
            .into()),
            Command::Admin(_) => self.promote(inv, required).await,
            Command::Unadmin(_) => self.demote(inv, required).await,
            Command::Grant(_) => self.grant(inv, required).await,
            Command::Revoke(_) => self.revoke(inv, required).await,
            Command::StatsBot => self.stats(inv, required).await,
        }
    }

    async fn authorize(&self, inv: &Invocation, required: Tier) -> Result<Tier, CommandError> {
        let tier = auth::tier(&self.store, &*self.platform, inv.chat, inv.actor.id).await;
        if tier < required {
            return Err(CommandError::NotAuthorized { required });
        }
        Ok(tier)
    }

    async fn resolve(&self, inv: &Invocation) -> Result<Result<Target, Unresolved>, CommandError> {
        let reply_author = inv.reply_to.as_ref().and_then(|r| r.author.as_ref());
        let resolution = target::resolve(
            &*self.platform,
            inv.chat,
            reply_author,
            &inv.mentions,
            &inv.args,
        )
        .await?;
        Ok(resolution.into_result())
    }

    /// Target first, then rights: nothing is checked against the platform
    /// for a command that has no one to act on.
    async fn target_and_authorize(
        &self,
        inv: &Invocation,
        required: Tier,
    ) -> Result<Target, CommandError> {
        let target = self
            .resolve(inv)
            .await?
            .map_err(CommandError::TargetUnresolved)?;
        self.authorize(inv, required).await?;
        Ok(target)
    }

    /// Like `resolve`, but a command without any target applies to the
    /// actor.
    async fn target_or_self(&self, inv: &Invocation) -> Result<Person, CommandError> {
        match self.resolve(inv).await? {
            Ok(target) => Ok(target.person),
            Err(Unresolved::Missing) => Ok(inv.actor.clone()),
            Err(reason) => Err(CommandError::TargetUnresolved(reason)),
        }
    }

    async fn start(&self, inv: &Invocation) -> CommandResult {
        if inv.private {
            let mut guard = self.store.lock().await;
            if guard.owner.owner.is_none() {
                guard.owner.owner = Some(inv.actor.id);
                guard.commit(Record::Owner).await;
                log::info!("{} is now the bot owner", inv.actor.id);
                return Ok(messages::owner_assigned().into());
            }
        }
        Ok(messages::greeting().into())
    }

    async fn rules(&self, inv: &Invocation) -> CommandResult {
        let rules = self.store.lock().await.rules.get(&inv.chat).cloned();
        Ok(messages::rules(rules.as_deref()).into())
    }

    async fn set_rules(&self, inv: &Invocation, text: &str, required: Tier) -> CommandResult {
        self.authorize(inv, required).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(usage("/setrules 1. Be nice 2. No spam"));
        }

        let mut guard = self.store.lock().await;
        guard.rules.insert(inv.chat, text.to_owned());
        guard.commit(Record::Rules).await;

        Ok(messages::rules_set(text).into())
    }

    async fn set_welcome(&self, inv: &Invocation, text: &str, required: Tier) -> CommandResult {
        self.authorize(inv, required).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(usage("/setwelcome Welcome {user} to {chat}!"));
        }

        let mut guard = self.store.lock().await;
        guard.welcome.insert(inv.chat, text.to_owned());
        guard.commit(Record::Welcome).await;

        let title = inv.chat_title.as_deref().unwrap_or_default();
        let preview = messages::render_template(text, &inv.actor, title);
        Ok(messages::welcome_set(&preview).into())
    }

    async fn warn(&self, inv: &Invocation, required: Tier) -> CommandResult {
        let target = self.target_and_authorize(inv, required).await?;
        let reason = target.rest(&inv.args).join(" ");

        let outcome = self
            .warnings
            .issue(inv.chat, target.person.id, &reason, inv.actor.id)
            .await;

        let reply = match outcome {
            IssueOutcome::Warned { count } => messages::warned(
                &target.person,
                warnings::reason_or_default(&reason),
                count,
            ),
            IssueOutcome::Escalated { ban } => messages::escalated(&target.person, ban.is_ok()),
        };
        Ok(reply.into())
    }

    async fn warns(&self, inv: &Invocation) -> CommandResult {
        let person = self.target_or_self(inv).await?;
        let list = self.warnings.list(inv.chat, person.id).await;
        Ok(messages::warnings_list(&person, &list).into())
    }

    async fn reset_warns(&self, inv: &Invocation, required: Tier) -> CommandResult {
        let target = self.target_and_authorize(inv, required).await?;
        let cleared = self.warnings.reset(inv.chat, target.person.id).await;
        Ok(messages::warnings_reset(&target.person, cleared).into())
    }

    async fn ban(&self, inv: &Invocation, required: Tier) -> CommandResult {
        let target = self.target_and_authorize(inv, required).await?;
        let reason = target.rest(&inv.args).join(" ");

        self.platform.ban(inv.chat, target.person.id).await?;
        Ok(messages::banned(&target.person, warnings::reason_or_default(&reason)).into())
    }

    async fn unban(&self, inv: &Invocation, required: Tier) -> CommandResult {
        let target = self.target_and_authorize(inv, required).await?;
        self.platform.unban(inv.chat, target.person.id).await?;
        Ok(messages::unbanned(&target.person).into())
    }

    async fn kick(&self, inv: &Invocation, required: Tier) -> CommandResult {
        let target = self.target_and_authorize(inv, required).await?;
        self.platform.ban(inv.chat, target.person.id).await?;
        self.platform.unban(inv.chat, target.person.id).await?;
        Ok(messages::kicked(&target.person).into())
    }

    async fn mute(&self, inv: &Invocation, required: Tier) -> CommandResult {
        let target = self.target_and_authorize(inv, required).await?;
        let arg = target.rest(&inv.args).first().map(String::as_str);
        let expiry = duration::mute_until(arg, Utc::now())?;

        self.platform
            .restrict(
                inv.chat,
                target.person.id,
                ChatPermissions::empty(),
                expiry.map(|e| e.until),
            )
            .await?;
        Ok(messages::muted(&target.person, expiry.map(|e| e.span)).into())
    }

    async fn unmute(&self, inv: &Invocation, required: Tier) -> CommandResult {
        let target = self.target_and_authorize(inv, required).await?;
        self.platform
            .restrict(inv.chat, target.person.id, ChatPermissions::all(), None)
            .await?;
        Ok(messages::unmuted(&target.person).into())
    }

    fn replied_message(inv: &Invocation, action: &str) -> Result<MessageId, CommandError> {
        inv.reply_to.as_ref().map(|r| r.id).ok_or_else(|| {
            CommandError::MalformedArgument(format!("Reply to the message you want to {action}."))
        })
    }

    async fn delete(&self, inv: &Invocation, required: Tier) -> CommandResult {
        self.authorize(inv, required).await?;
        let message = Self::replied_message(inv, "delete")?;

        self.platform.delete_message(inv.chat, message).await?;
        if let Err(e) = self.platform.delete_message(inv.chat, inv.message).await {
            log::warn!("Couldn't delete command message in {}: {e}", inv.chat);
        }
        Ok(Reply::Silent)
    }

    async fn pin(&self, inv: &Invocation, required: Tier) -> CommandResult {
        self.authorize(inv, required).await?;
        let message = Self::replied_message(inv, "pin")?;

        self.platform.pin_message(inv.chat, message).await?;
        Ok(messages::pinned().into())
    }

    async fn info(&self, inv: &Invocation) -> CommandResult {
        let person = self.target_or_self(inv).await?;
        Ok(messages::user_info(&person).into())
    }

    async fn admins(&self, inv: &Invocation) -> CommandResult {
        let admins = self.platform.administrators(inv.chat).await?;
        let moderators: Vec<UserId> = self
            .store
            .lock()
            .await
            .bot_admins
            .get(&inv.chat)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        Ok(messages::admins_list(&admins, &moderators).into())
    }

    /// Waits out the platform's admin list lag once, then reports whether
    /// `user` has the expected admin status. Not a retry loop.
    async fn reverify(&self, chat: ChatId, user: UserId, expect_admin: bool) -> bool {
        tokio::time::sleep(self.reverify_delay).await;
        match self.platform.member(chat, user).await {
            Ok(member) => member.status.is_privileged() == expect_admin,
            Err(e) => {
                log::warn!("Couldn't re-check status of {user} in {chat}: {e}");
                false
            }
        }
    }

    async fn promote(&self, inv: &Invocation, required: Tier) -> CommandResult {
        let target = self.target_and_authorize(inv, required).await?;
        let id = target.person.id;

        let member = self.platform.member(inv.chat, id).await?;
        if member.status.is_privileged() {
            return Ok(messages::already_admin(&target.person).into());
        }
        if !member.status.is_present() {
            return Ok(messages::not_in_chat(&target.person).into());
        }

        let ceiling = self.platform.own_rights(inv.chat).await?;
        let rights = Rights::MODERATOR.clamp(ceiling);
        // all rights unset would demote instead
        if rights == Rights::default() {
            return Ok(messages::nothing_to_grant(&target.person).into());
        }
        self.platform.promote(inv.chat, id, rights).await?;
        log::info!("{} promoted {id} in {} with {rights:?}", inv.actor.id, inv.chat);

        let confirmed = self.reverify(inv.chat, id, true).await;
        Ok(messages::promoted(&target.person, rights, confirmed).into())
    }

    async fn demote(&self, inv: &Invocation, required: Tier) -> CommandResult {
        let target = self.target_and_authorize(inv, required).await?;
        let id = target.person.id;

        let member = self.platform.member(inv.chat, id).await?;
        match member.status {
            MemberStatus::Owner => return Ok(messages::cannot_demote_owner().into()),
            MemberStatus::Administrator => {}
            _ => return Ok(messages::not_admin(&target.person).into()),
        }

        self.platform.demote(inv.chat, id).await?;
        log::info!("{} demoted {id} in {}", inv.actor.id, inv.chat);

        let confirmed = self.reverify(inv.chat, id, false).await;
        Ok(messages::demoted(&target.person, confirmed).into())
    }

    async fn grant(&self, inv: &Invocation, required: Tier) -> CommandResult {
        let target = self.target_and_authorize(inv, required).await?;

        let mut guard = self.store.lock().await;
        let added = guard
            .bot_admins
            .entry(inv.chat)
            .or_default()
            .insert(target.person.id);
        if added {
            guard.commit(Record::BotAdmins).await;
        }

        Ok(messages::granted(&target.person, added).into())
    }

    async fn revoke(&self, inv: &Invocation, required: Tier) -> CommandResult {
        let target = self.target_and_authorize(inv, required).await?;

        let mut guard = self.store.lock().await;
        let admins = &mut guard.bot_admins;
        let removed = admins
            .get_mut(&inv.chat)
            .is_some_and(|set| set.remove(&target.person.id));
        if admins.get(&inv.chat).is_some_and(|set| set.is_empty()) {
            admins.remove(&inv.chat);
        }
        if removed {
            guard.commit(Record::BotAdmins).await;
        }

        Ok(messages::revoked(&target.person, removed).into())
    }

    async fn stats(&self, inv: &Invocation, required: Tier) -> CommandResult {
        self.authorize(inv, required).await?;
        let (chats, users) = {
            let guard = self.store.lock().await;
            (guard.stats.chats.len(), guard.stats.users.len())
        };
        let warnings = self.warnings.total().await;
        Ok(messages::stats(chats, users, warnings).into())
    }

    /// Greets the non-bot members that just joined `chat`, if the chat has
    /// a welcome template.
    pub async fn members_joined(
        &self,
        chat: ChatId,
        chat_title: &str,
        joined: &[Person],
    ) -> Vec<String> {
        let humans: Vec<&Person> = joined.iter().filter(|p| !p.is_bot).collect();
        let ids: Vec<UserId> = humans.iter().map(|p| p.id).collect();
        self.store.record_usage(Some(chat), &ids).await;

        let Some(template) = self.store.lock().await.welcome.get(&chat).cloned() else {
            return Vec::new();
        };

        humans
            .into_iter()
            .map(|person| messages::render_template(&template, person, chat_title))
            .collect()
    }

    /// Looks at ordinary chat text. `@admins` calls the chat's human
    /// administrators.
    pub async fn scan_text(&self, chat: ChatId, text: &str) -> Option<String> {
        if !text.contains("@admins") {
            return None;
        }

        let admins = match self.platform.administrators(chat).await {
            Ok(admins) => admins,
            Err(e) => {
                log::warn!("Couldn't fetch administrators of {chat}: {e}");
                return None;
            }
        };

        let humans: Vec<Person> = admins
            .into_iter()
            .map(|m| m.person)
            .filter(|p| !p.is_bot)
            .collect();

        if humans.is_empty() {
            None
        } else {
            Some(messages::summon_admins(&humans))
        }
    }
}

#[cfg(test)]
mod tests;
