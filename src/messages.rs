use lazy_static::lazy_static;
use regex::{Captures, Regex};
use teloxide::types::{ChatId, UserId};
use teloxide::utils::markdown::{bold, code_inline, escape, italic, user_mention};

use crate::error::CommandError;
use crate::moderation::duration::Span;
use crate::moderation::target::Unresolved;
use crate::platform::{Member, MemberStatus, Person, Rights};
use crate::warnings::{WarningEntry, THRESHOLD};

lazy_static! {
    // matched against already escaped text
    static ref PLACEHOLDER_REGEX: Regex = Regex::new(r"\\\{(user|chat)\\\}").unwrap();
}

pub fn mention(person: &Person) -> String {
    user_mention(person.id, &escape(&person.name))
}

/// Renders a welcome template. Literal text is escaped, `{user}` becomes a
/// mention of `member` and `{chat}` the chat title.
pub fn render_template(template: &str, member: &Person, chat_title: &str) -> String {
    PLACEHOLDER_REGEX
        .replace_all(&escape(template), |captures: &Captures| match &captures[1] {
            "user" => mention(member),
            _ => escape(chat_title),
        })
        .into_owned()
}

pub fn help() -> String {
    escape(HELP_MESSAGE)
}

pub fn owner_assigned() -> String {
    bold(&escape("👑 You are now the owner of this bot!"))
        + &escape("\n\n/help lists everything I can do, /statsbot shows usage numbers.")
}

pub fn greeting() -> String {
    bold(&escape("👋 Hi! I'm a group moderation bot."))
        + &escape(
            "\n\n1. Add me to a group\n2. Make me an administrator\n3. Send /help for the command list",
        )
}

pub fn rules(text: Option<&str>) -> String {
    match text {
        Some(text) if !text.trim().is_empty() => {
            bold(&escape("📜 Group rules:")) + "\n\n" + &escape(text)
        }
        _ => escape("❌ No rules have been set for this group yet.\n\nAdmins can set them with /setrules."),
    }
}

pub fn rules_set(text: &str) -> String {
    bold(&escape("✅ Rules saved!")) + "\n\n" + &escape(text)
}

pub fn welcome_set(preview: &str) -> String {
    bold(&escape("✅ Welcome message saved!")) + "\n\n" + &italic(&escape("Preview:")) + "\n" + preview
}

pub fn warned(target: &Person, reason: &str, count: usize) -> String {
    format!(
        "⚠️ {} has been warned\\!\n{} {}\n{} {}",
        mention(target),
        bold("Reason:"),
        escape(reason),
        bold("Total:"),
        escape(&format!("{count}/{THRESHOLD}")),
    )
}

pub fn escalated(target: &Person, ban_succeeded: bool) -> String {
    if ban_succeeded {
        format!(
            "🔨 {} reached {THRESHOLD} warnings and has been banned\\!",
            mention(target)
        )
    } else {
        format!(
            "⚠️ {} reached {THRESHOLD} warnings and their warnings were cleared, but the ban failed\\. Please ban them manually\\.",
            mention(target)
        )
    }
}

pub fn warnings_list(target: &Person, warnings: &[WarningEntry]) -> String {
    if warnings.is_empty() {
        return format!("✅ {} has no warnings\\.", mention(target));
    }

    let list = warnings
        .iter()
        .enumerate()
        .map(|(i, w)| escape(&format!("{}. {} ({})", i + 1, w.reason, w.day())))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "⚠️ Warnings of {}:\n\n{list}\n\n{} {}",
        mention(target),
        bold("Total:"),
        escape(&format!("{}/{THRESHOLD}", warnings.len()))
    )
}

pub fn warnings_reset(target: &Person, cleared: usize) -> String {
    match cleared {
        0 => format!("ℹ️ {} had no warnings to clear\\.", mention(target)),
        n => format!(
            "✅ Cleared {} of {}\\.",
            escape(&format!("{n} warning{}", if n == 1 { "" } else { "s" })),
            mention(target)
        ),
    }
}

pub fn banned(target: &Person, reason: &str) -> String {
    format!(
        "🔨 {} has been banned\\!\n{} {}",
        mention(target),
        bold("Reason:"),
        escape(reason)
    )
}

pub fn unbanned(target: &Person) -> String {
    format!("✅ {} has been unbanned\\.", mention(target))
}

pub fn kicked(target: &Person) -> String {
    format!("👞 {} has been kicked from the group\\.", mention(target))
}

pub fn muted(target: &Person, span: Option<Span>) -> String {
    let length = match span {
        Some(span) => escape(&format!("for {span}")),
        None => escape("until unmuted"),
    };
    format!("🔇 {} has been muted {length}\\.", mention(target))
}

pub fn unmuted(target: &Person) -> String {
    format!("🔊 {} can talk again\\.", mention(target))
}

pub fn pinned() -> String {
    escape("📌 Message pinned!")
}

pub fn user_info(person: &Person) -> String {
    let username = match &person.username {
        Some(username) => escape(&format!("@{username}")),
        None => italic("none"),
    };
    format!(
        "{}\n\n{} {}\n{} {}\n{} {}\n{} {}",
        bold(&escape("👤 User info:")),
        bold("Name:"),
        mention(person),
        bold("ID:"),
        code_inline(&person.id.to_string()),
        bold("Username:"),
        username,
        bold("Bot:"),
        if person.is_bot { "yes" } else { "no" }
    )
}

pub fn chat_info(chat: ChatId, title: Option<&str>, private: bool) -> String {
    format!(
        "{}\n\n{} {}\n{} {}\n{} {}",
        bold(&escape("📊 Chat info:")),
        bold("ID:"),
        code_inline(&chat.to_string()),
        bold("Title:"),
        escape(title.unwrap_or("-")),
        bold("Type:"),
        if private { "private" } else { "group" }
    )
}

pub fn admins_list(admins: &[Member], moderators: &[UserId]) -> String {
    let mut result = bold(&escape("📋 Administrators:")) + "\n\n";
    for admin in admins {
        let role = match admin.status {
            MemberStatus::Owner => "👑 Owner",
            _ => "🛡️ Admin",
        };
        result += &format!("{role}: {}\n", mention(&admin.person));
    }

    if !moderators.is_empty() {
        result += &format!("\n{}\n", bold(&escape("🔧 Bot moderators:")));
        for id in moderators {
            result += &format!("• {}\n", code_inline(&id.to_string()));
        }
    }

    result + &escape(&format!("\nTotal: {} admins", admins.len()))
}

fn rights_list(rights: Rights) -> String {
    let mut lines = Vec::new();
    if rights.delete_messages {
        lines.push("• delete messages");
    }
    if rights.restrict_members {
        lines.push("• ban, mute and kick members");
    }
    if rights.pin_messages {
        lines.push("• pin messages");
    }
    if rights.invite_users {
        lines.push("• invite users");
    }
    if lines.is_empty() {
        lines.push("• none");
    }
    escape(&lines.join("\n"))
}

pub fn promoted(target: &Person, rights: Rights, confirmed: bool) -> String {
    if confirmed {
        format!(
            "✅ {} is now an administrator\\!\n\n{}\n{}",
            mention(target),
            bold(&escape("Granted rights:")),
            rights_list(rights)
        )
    } else {
        format!(
            "⚠️ {} was promoted, but doesn't show up as an administrator yet\\. {}",
            mention(target),
            escape("Check again in a minute, and make sure I'm allowed to add administrators.")
        )
    }
}

pub fn demoted(target: &Person, confirmed: bool) -> String {
    if confirmed {
        format!("✅ {} is no longer an administrator\\.", mention(target))
    } else {
        format!(
            "⚠️ {} was demoted, but still shows up as an administrator\\. {}",
            mention(target),
            escape("Check again in a minute, and make sure I'm allowed to add administrators.")
        )
    }
}

pub fn already_admin(target: &Person) -> String {
    format!("❌ {} already is an administrator\\.", mention(target))
}

pub fn not_in_chat(target: &Person) -> String {
    format!("❌ {} is not a member of this group\\.", mention(target))
}

pub fn not_admin(target: &Person) -> String {
    format!("❌ {} is not an administrator\\.", mention(target))
}

pub fn nothing_to_grant(target: &Person) -> String {
    format!(
        "❌ I can't promote {}, I have no administrator rights I could pass on\\.",
        mention(target)
    )
}

pub fn cannot_demote_owner() -> String {
    escape("❌ The group owner can't be demoted.")
}

pub fn granted(target: &Person, added: bool) -> String {
    if added {
        format!("✅ {} can now moderate with this bot\\.", mention(target))
    } else {
        format!("ℹ️ {} already is a bot moderator\\.", mention(target))
    }
}

pub fn revoked(target: &Person, removed: bool) -> String {
    if removed {
        format!("✅ {} is no longer a bot moderator\\.", mention(target))
    } else {
        format!("ℹ️ {} was not a bot moderator\\.", mention(target))
    }
}

pub fn stats(chats: usize, users: usize, warnings: usize) -> String {
    format!(
        "{}\n\n{} {chats}\n{} {users}\n{} {warnings}",
        bold(&escape("📊 Bot statistics:")),
        bold("Chats:"),
        bold("Users:"),
        bold("Active warnings:"),
    )
}

pub fn summon_admins(admins: &[Person]) -> String {
    let mentions = admins.iter().map(mention).collect::<Vec<_>>().join(" ");
    bold(&escape("🆘 Admins, you're needed!")) + "\n" + &mentions
}

pub fn error(e: &CommandError) -> String {
    match e {
        CommandError::NotAuthorized { required } => {
            escape(&format!("❌ This needs {required} rights."))
        }
        CommandError::TargetUnresolved(Unresolved::Handle(handle)) => escape(&format!(
            "❌ I can't find @{handle} by their handle.\n\n\
             💡 Reply to one of their messages with the command, \
             or give their numeric ID (reply to them with /info to see it)."
        )),
        CommandError::TargetUnresolved(Unresolved::UnknownId(id)) => escape(&format!(
            "❌ User {id} couldn't be found in this group."
        )),
        CommandError::TargetUnresolved(Unresolved::Missing) => escape(
            "❌ Who do you mean?\n\n\
             💡 Reply to one of their messages with the command, \
             or give their numeric ID.",
        ),
        CommandError::UpstreamUnavailable(_) => {
            escape("❌ That didn't work, Telegram refused or didn't answer. Do I have the necessary admin rights?")
        }
        CommandError::MalformedArgument(msg) => escape(&format!("❌ {msg}")),
    }
}

const HELP_MESSAGE: &str = "📚 Commands

General:
/start - start the bot
/help - this text
/rules - group rules
/info [user] - user info
/chatid - chat info
/admins - list administrators
/warns [user] - list warnings

Moderation:
/ban <user> [reason] - ban
/unban <user> - unban
/kick <user> - kick
/mute <user> [5m/2h/1d] - mute
/unmute <user> - unmute
/del - delete the replied-to message
/warn <user> [reason] - warn, 3 warnings mean a ban
/resetwarns <user> - clear warnings
/pin - pin the replied-to message

Administration:
/admin <user> - promote to administrator
/unadmin <user> - demote
/grant <user> - allow ban, mute, kick and delete through this bot
/revoke <user> - take that back
/setwelcome <text> - welcome message, {user} and {chat} are replaced
/setrules <text> - set group rules
/statsbot - bot statistics (owner only)

<user> is a reply to one of their messages, a mention or their numeric ID.";
