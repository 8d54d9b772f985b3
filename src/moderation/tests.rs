use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use teloxide::types::{ChatId, ChatPermissions, MessageId, UserId};

use super::*;
use crate::testing::{person, Call, MockPlatform};

const GROUP: ChatId = ChatId(-1009);
const OWNER: UserId = UserId(1);
const ADMIN: UserId = UserId(2);
const HELPER: UserId = UserId(3);
const MEMBER: UserId = UserId(4);
const TARGET: UserId = UserId(5);

struct Fixture {
    _dir: tempfile::TempDir,
    store: Arc<Store>,
    platform: Arc<MockPlatform>,
    moderation: Moderation,
}

/// A group with an owner, a platform admin, a bot moderator (HELPER) and
/// two plain members.
async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path()).await.unwrap());
    {
        let mut guard = store.lock().await;
        guard.owner.owner = Some(OWNER);
        guard.bot_admins.entry(GROUP).or_default().insert(HELPER);
    }

    let platform = Arc::new(MockPlatform::new());
    platform.set_status(GROUP, ADMIN, MemberStatus::Administrator);
    platform.set_status(GROUP, HELPER, MemberStatus::Member);
    platform.set_status(GROUP, MEMBER, MemberStatus::Member);
    platform.set_status(GROUP, TARGET, MemberStatus::Member);

    let moderation = Moderation::new(store.clone(), platform.clone(), Duration::ZERO);
    Fixture {
        _dir: dir,
        store,
        platform,
        moderation,
    }
}

fn invocation(actor: UserId, args: &str) -> Invocation {
    Invocation {
        chat: GROUP,
        chat_title: Some("Test group".into()),
        private: false,
        message: MessageId(100),
        actor: person(actor),
        reply_to: None,
        mentions: Vec::new(),
        args: args.split_whitespace().map(String::from).collect(),
    }
}

fn replying(actor: UserId, to: UserId, args: &str) -> Invocation {
    Invocation {
        reply_to: Some(RepliedMessage {
            id: MessageId(50),
            author: Some(person(to)),
        }),
        ..invocation(actor, args)
    }
}

fn text(reply: Reply) -> String {
    match reply {
        Reply::Text(text) => text,
        Reply::Silent => panic!("expected a reply"),
    }
}

#[tokio::test]
async fn three_warnings_ban_and_clear() {
    let f = fixture().await;

    for _ in 0..3 {
        f.moderation
            .execute(Command::Warn("spam".into()), &replying(ADMIN, TARGET, "spam"))
            .await;
    }

    let bans: Vec<_> = f
        .platform
        .actions()
        .into_iter()
        .filter(|c| matches!(c, Call::Ban(..)))
        .collect();
    assert_eq!(bans, [Call::Ban(GROUP, TARGET)]);

    let guard = f.store.lock().await;
    assert!(guard.warnings[&GROUP].get(&TARGET).is_none());
}

#[tokio::test]
async fn escalation_reply_mentions_ban() {
    let f = fixture().await;
    let inv = replying(ADMIN, TARGET, "");

    let first = text(f.moderation.execute(Command::Warn(String::new()), &inv).await);
    assert!(first.contains("1/3"));
    assert!(first.contains(&escape_md(warnings::DEFAULT_REASON)));

    f.moderation.execute(Command::Warn(String::new()), &inv).await;
    let third = text(f.moderation.execute(Command::Warn(String::new()), &inv).await);
    assert_eq!(third, messages::escalated(&person(TARGET), true));
}

fn escape_md(s: &str) -> String {
    teloxide::utils::markdown::escape(s)
}

#[tokio::test]
async fn limited_moderator_cannot_set_rules() {
    let f = fixture().await;
    f.moderation
        .execute(Command::SetRules("old rules".into()), &invocation(ADMIN, "old rules"))
        .await;

    let reply = f
        .moderation
        .execute(Command::SetRules("new rules".into()), &invocation(HELPER, "new rules"))
        .await;

    assert_eq!(
        text(reply),
        messages::error(&CommandError::NotAuthorized {
            required: Tier::FullModerator
        })
    );
    let guard = f.store.lock().await;
    assert_eq!(guard.rules.get(&GROUP).map(String::as_str), Some("old rules"));
}

#[tokio::test]
async fn empty_texts_are_malformed() {
    let f = fixture().await;
    f.moderation
        .execute(Command::SetRules("old rules".into()), &invocation(ADMIN, "old rules"))
        .await;

    for command in [Command::SetRules("  ".into()), Command::SetWelcome(String::new())] {
        let reply = text(f.moderation.execute(command, &invocation(ADMIN, "")).await);
        assert!(reply.starts_with("❌ Usage: /set"), "{reply}");
    }

    let guard = f.store.lock().await;
    assert_eq!(guard.rules.get(&GROUP).map(String::as_str), Some("old rules"));
    assert!(guard.welcome.get(&GROUP).is_none());
}

#[tokio::test]
async fn higher_tiers_can_do_what_lower_tiers_can() {
    let f = fixture().await;

    for actor in [OWNER, ADMIN, HELPER] {
        f.moderation
            .execute(Command::Unban(String::new()), &replying(actor, TARGET, ""))
            .await;
    }
    let reply = f
        .moderation
        .execute(Command::Unban(String::new()), &replying(MEMBER, TARGET, ""))
        .await;

    let unbans = f
        .platform
        .actions()
        .into_iter()
        .filter(|c| matches!(c, Call::Unban(..)))
        .count();
    assert_eq!(unbans, 3);
    assert_eq!(
        text(reply),
        messages::error(&CommandError::NotAuthorized {
            required: Tier::LimitedModerator
        })
    );
}

#[tokio::test]
async fn bot_moderator_cannot_warn() {
    let f = fixture().await;

    f.moderation
        .execute(Command::Warn("x".into()), &replying(HELPER, TARGET, "x"))
        .await;

    assert!(f.moderation.warnings.list(GROUP, TARGET).await.is_empty());
}

#[tokio::test]
async fn first_private_start_claims_ownership() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path()).await.unwrap());
    let moderation = Moderation::new(store.clone(), Arc::new(MockPlatform::new()), Duration::ZERO);

    let private = |actor: UserId| Invocation {
        chat: ChatId(actor.0 as i64),
        private: true,
        ..invocation(actor, "")
    };

    // a group /start never assigns an owner
    moderation.execute(Command::Start, &invocation(UserId(7), "")).await;
    assert_eq!(store.owner().await, None);

    let reply = moderation.execute(Command::Start, &private(UserId(8))).await;
    assert_eq!(text(reply), messages::owner_assigned());

    let reply = moderation.execute(Command::Start, &private(UserId(9))).await;
    assert_eq!(text(reply), messages::greeting());
    assert_eq!(store.owner().await, Some(UserId(8)));

    let reopened = Store::open(dir.path()).await.unwrap();
    assert_eq!(reopened.owner().await, Some(UserId(8)));
}

#[tokio::test]
async fn unresolved_target_is_rejected_before_tier_check() {
    let f = fixture().await;

    let reply = f
        .moderation
        .execute(Command::Ban("spam".into()), &invocation(ADMIN, "spam"))
        .await;

    assert_eq!(
        text(reply),
        messages::error(&CommandError::TargetUnresolved(Unresolved::Missing))
    );
    assert!(f.platform.calls().is_empty());
}

#[tokio::test]
async fn handle_target_gets_guidance() {
    let f = fixture().await;

    let reply = f
        .moderation
        .execute(Command::Ban("@bob".into()), &invocation(ADMIN, "@bob"))
        .await;

    assert_eq!(
        text(reply),
        messages::error(&CommandError::TargetUnresolved(Unresolved::Handle("bob".into())))
    );
    assert!(f.platform.actions().is_empty());
}

#[tokio::test]
async fn numeric_target_lookup_failure_is_upstream() {
    let f = fixture().await;
    f.platform.set_unreachable(true);

    let reply = f
        .moderation
        .execute(Command::Ban("5".into()), &invocation(OWNER, "5"))
        .await;

    assert_eq!(
        text(reply),
        messages::error(&CommandError::UpstreamUnavailable(
            crate::platform::PlatformError::Timeout(Duration::from_secs(10))
        ))
    );
    assert!(f.platform.actions().is_empty());
}

#[tokio::test]
async fn numeric_target_not_in_chat() {
    let f = fixture().await;

    let reply = f
        .moderation
        .execute(Command::Ban("404".into()), &invocation(ADMIN, "404"))
        .await;

    assert_eq!(
        text(reply),
        messages::error(&CommandError::TargetUnresolved(Unresolved::UnknownId(404)))
    );
    assert!(f.platform.actions().is_empty());
}

#[tokio::test]
async fn numeric_target_leaves_reason() {
    let f = fixture().await;

    let reply = f
        .moderation
        .execute(Command::Ban("5 flooding".into()), &invocation(ADMIN, "5 flooding"))
        .await;

    assert_eq!(text(reply), messages::banned(&person(TARGET), "flooding"));
    assert_eq!(f.platform.actions(), [Call::Ban(GROUP, TARGET)]);
}

#[tokio::test]
async fn mentioned_target() {
    let f = fixture().await;
    let inv = Invocation {
        mentions: vec![person(TARGET)],
        ..invocation(ADMIN, "")
    };

    f.moderation.execute(Command::Kick(String::new()), &inv).await;

    assert_eq!(
        f.platform.actions(),
        [Call::Ban(GROUP, TARGET), Call::Unban(GROUP, TARGET)]
    );
}

#[tokio::test]
async fn mute_with_duration() {
    let f = fixture().await;

    let reply = f
        .moderation
        .execute(Command::Mute("30m".into()), &replying(HELPER, TARGET, "30m"))
        .await;

    let Some(Call::Restrict(chat, user, permissions, Some(until))) =
        f.platform.actions().pop()
    else {
        panic!("no timed restriction");
    };
    assert_eq!((chat, user), (GROUP, TARGET));
    assert_eq!(permissions, ChatPermissions::empty());
    let drift = (until - (Utc::now() + TimeDelta::minutes(30))).num_seconds().abs();
    assert!(drift <= 1);
    assert!(text(reply).contains("30 minutes"));
}

#[tokio::test]
async fn mute_without_duration_is_indefinite() {
    let f = fixture().await;

    f.moderation
        .execute(Command::Mute(String::new()), &replying(ADMIN, TARGET, ""))
        .await;

    assert_eq!(
        f.platform.actions(),
        [Call::Restrict(GROUP, TARGET, ChatPermissions::empty(), None)]
    );
}

#[tokio::test]
async fn malformed_duration_is_rejected_before_restricting() {
    let f = fixture().await;

    let reply = f
        .moderation
        .execute(Command::Mute("xyz".into()), &replying(ADMIN, TARGET, "xyz"))
        .await;

    assert!(text(reply).contains("xyz"));
    assert!(f.platform.actions().is_empty());
}

#[tokio::test]
async fn unmute_restores_permissions() {
    let f = fixture().await;

    f.moderation
        .execute(Command::Unmute(String::new()), &replying(ADMIN, TARGET, ""))
        .await;

    assert_eq!(
        f.platform.actions(),
        [Call::Restrict(GROUP, TARGET, ChatPermissions::all(), None)]
    );
}

#[tokio::test]
async fn platform_failure_is_reported() {
    let f = fixture().await;
    f.platform.set_unreachable(true);

    let reply = f
        .moderation
        .execute(Command::Ban(String::new()), &replying(OWNER, TARGET, ""))
        .await;

    assert!(matches!(
        reply,
        Reply::Text(ref t) if *t == messages::error(&CommandError::UpstreamUnavailable(
            crate::platform::PlatformError::Timeout(Duration::from_secs(10))
        ))
    ));
}

#[tokio::test]
async fn reset_on_clean_log_is_a_no_op() {
    let f = fixture().await;

    let reply = f
        .moderation
        .execute(Command::ResetWarns(String::new()), &replying(ADMIN, TARGET, ""))
        .await;

    assert_eq!(text(reply), messages::warnings_reset(&person(TARGET), 0));
}

#[tokio::test]
async fn warns_defaults_to_caller() {
    let f = fixture().await;
    f.moderation
        .execute(Command::Warn("late".into()), &replying(ADMIN, MEMBER, "late"))
        .await;

    let reply = f
        .moderation
        .execute(Command::Warns(String::new()), &invocation(MEMBER, ""))
        .await;

    assert!(text(reply).contains("late"));
}

#[tokio::test]
async fn promotion_is_capped_by_bot_rights() {
    let f = fixture().await;
    let ceiling = Rights {
        delete_messages: true,
        restrict_members: true,
        pin_messages: false,
        invite_users: false,
    };
    f.platform.set_own_rights(ceiling);

    let reply = f
        .moderation
        .execute(Command::Admin(String::new()), &replying(ADMIN, TARGET, ""))
        .await;

    assert_eq!(f.platform.actions(), [Call::Promote(GROUP, TARGET, ceiling)]);
    assert_eq!(text(reply), messages::promoted(&person(TARGET), ceiling, true));
}

#[tokio::test]
async fn promotion_without_grantable_rights_is_refused() {
    let f = fixture().await;
    f.platform.set_own_rights(Rights::default());

    let reply = f
        .moderation
        .execute(Command::Admin(String::new()), &replying(ADMIN, TARGET, ""))
        .await;

    assert_eq!(text(reply), messages::nothing_to_grant(&person(TARGET)));
    assert!(f.platform.actions().is_empty());
}

#[tokio::test]
async fn promotion_skips_existing_admins() {
    let f = fixture().await;

    let reply = f
        .moderation
        .execute(Command::Admin(String::new()), &replying(OWNER, ADMIN, ""))
        .await;

    assert_eq!(text(reply), messages::already_admin(&person(ADMIN)));
    assert!(f.platform.actions().is_empty());
}

#[tokio::test]
async fn demotion() {
    let f = fixture().await;
    f.platform.set_status(GROUP, UserId(6), MemberStatus::Owner);

    let reply = f
        .moderation
        .execute(Command::Unadmin(String::new()), &replying(OWNER, UserId(6), ""))
        .await;
    assert_eq!(text(reply), messages::cannot_demote_owner());

    let reply = f
        .moderation
        .execute(Command::Unadmin(String::new()), &replying(OWNER, ADMIN, ""))
        .await;
    assert_eq!(text(reply), messages::demoted(&person(ADMIN), true));
    assert_eq!(f.platform.actions(), [Call::Demote(GROUP, ADMIN)]);
}

#[tokio::test]
async fn grant_and_revoke_bot_moderators() {
    let f = fixture().await;

    f.moderation
        .execute(Command::Grant(String::new()), &replying(ADMIN, MEMBER, ""))
        .await;
    assert!(f.store.is_bot_admin(GROUP, MEMBER).await);

    f.moderation
        .execute(Command::Ban(String::new()), &replying(MEMBER, TARGET, ""))
        .await;
    assert_eq!(f.platform.actions(), [Call::Ban(GROUP, TARGET)]);

    let reply = f
        .moderation
        .execute(Command::Revoke(String::new()), &replying(ADMIN, MEMBER, ""))
        .await;
    assert_eq!(text(reply), messages::revoked(&person(MEMBER), true));
    assert!(!f.store.is_bot_admin(GROUP, MEMBER).await);
}

#[tokio::test]
async fn delete_needs_a_reply() {
    let f = fixture().await;

    f.moderation.execute(Command::Del, &invocation(HELPER, "")).await;
    assert!(f.platform.actions().is_empty());

    let reply = f
        .moderation
        .execute(Command::Del, &replying(HELPER, TARGET, ""))
        .await;
    assert_eq!(reply, Reply::Silent);
    assert_eq!(
        f.platform.actions(),
        [
            Call::DeleteMessage(GROUP, MessageId(50)),
            Call::DeleteMessage(GROUP, MessageId(100))
        ]
    );
}

#[tokio::test]
async fn stats_are_owner_only() {
    let f = fixture().await;

    let reply = f.moderation.execute(Command::StatsBot, &invocation(ADMIN, "")).await;
    assert_eq!(
        text(reply),
        messages::error(&CommandError::NotAuthorized {
            required: Tier::Superadmin
        })
    );

    // only commands that went through are counted, after they ran
    let reply = f.moderation.execute(Command::StatsBot, &invocation(OWNER, "")).await;
    assert_eq!(text(reply), messages::stats(0, 0, 0));
    let reply = f.moderation.execute(Command::StatsBot, &invocation(OWNER, "")).await;
    assert_eq!(text(reply), messages::stats(1, 1, 0));
}

#[tokio::test]
async fn rejected_commands_leave_no_usage_behind() {
    let f = fixture().await;

    f.moderation
        .execute(Command::Ban("spam".into()), &invocation(UserId(77), "spam"))
        .await;
    f.moderation
        .execute(Command::SetRules("x".into()), &invocation(UserId(77), "x"))
        .await;

    let guard = f.store.lock().await;
    assert!(guard.stats.users.is_empty());
    assert!(guard.stats.chats.is_empty());
}

#[tokio::test]
async fn new_members_are_welcomed() {
    let f = fixture().await;
    f.moderation
        .execute(
            Command::SetWelcome("Hi {user}, welcome to {chat}".into()),
            &invocation(ADMIN, ""),
        )
        .await;

    let bot = crate::platform::Person {
        is_bot: true,
        ..person(UserId(99))
    };
    let greetings = f
        .moderation
        .members_joined(GROUP, "Test group", &[person(UserId(20)), bot])
        .await;

    assert_eq!(
        greetings,
        [messages::render_template(
            "Hi {user}, welcome to {chat}",
            &person(UserId(20)),
            "Test group"
        )]
    );
    let guard = f.store.lock().await;
    assert!(guard.stats.users.contains(&UserId(20)));
    assert!(!guard.stats.users.contains(&UserId(99)));
}

#[tokio::test]
async fn no_template_no_welcome() {
    let f = fixture().await;

    let greetings = f
        .moderation
        .members_joined(GROUP, "Test group", &[person(UserId(20))])
        .await;
    assert!(greetings.is_empty());
}

#[tokio::test]
async fn admins_can_be_summoned() {
    let f = fixture().await;

    assert_eq!(f.moderation.scan_text(GROUP, "hello").await, None);
    let summon = f.moderation.scan_text(GROUP, "@admins help!").await;
    assert_eq!(summon, Some(messages::summon_admins(&[person(ADMIN)])));
}
