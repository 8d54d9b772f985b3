use teloxide::macros::BotCommands;

use crate::auth::Tier;

/// Commands understood by the bot. Variants taking a `String` receive the
/// raw text after the command; targets and further arguments are picked out
/// of it by the moderation layer.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "start the bot.")]
    Start,
    #[command(description = "show this text.")]
    Help,
    #[command(description = "show the group rules.")]
    Rules,
    #[command(description = "set the group rules.")]
    SetRules(String),
    #[command(description = "set the welcome message.")]
    SetWelcome(String),
    #[command(description = "warn a user.")]
    Warn(String),
    #[command(description = "list warnings.")]
    Warns(String),
    #[command(description = "clear warnings.")]
    ResetWarns(String),
    #[command(description = "ban a user.")]
    Ban(String),
    #[command(description = "unban a user.")]
    Unban(String),
    #[command(description = "kick a user.")]
    Kick(String),
    #[command(description = "mute a user.")]
    Mute(String),
    #[command(description = "unmute a user.")]
    Unmute(String),
    #[command(description = "delete the replied-to message.")]
    Del,
    #[command(description = "pin the replied-to message.")]
    Pin,
    #[command(description = "show user info.")]
    Info(String),
    #[command(description = "list administrators.")]
    Admins,
    #[command(description = "show chat info.")]
    ChatId,
    #[command(description = "promote a user to administrator.")]
    Admin(String),
    #[command(description = "demote an administrator.")]
    Unadmin(String),
    #[command(description = "make a user a bot moderator.")]
    Grant(String),
    #[command(description = "revoke bot moderator rights.")]
    Revoke(String),
    #[command(description = "bot statistics.")]
    StatsBot,
}

impl Command {
    /// The lowest tier allowed to run the command.
    pub fn required_tier(&self) -> Tier {
        match self {
            Command::Start
            | Command::Help
            | Command::Rules
            | Command::Warns(_)
            | Command::Info(_)
            | Command::Admins
            | Command::ChatId => Tier::None,
            Command::Ban(_)
            | Command::Unban(_)
            | Command::Kick(_)
            | Command::Mute(_)
            | Command::Unmute(_)
            | Command::Del => Tier::LimitedModerator,
            Command::SetRules(_)
            | Command::SetWelcome(_)
            | Command::Warn(_)
            | Command::ResetWarns(_)
            | Command::Pin
            | Command::Admin(_)
            | Command::Unadmin(_)
            | Command::Grant(_)
            | Command::Revoke(_) => Tier::FullModerator,
            Command::StatsBot => Tier::Superadmin,
        }
    }

    /// Raw argument text, empty for commands without arguments.
    pub fn text(&self) -> &str {
        match self {
            Command::SetRules(s)
            | Command::SetWelcome(s)
            | Command::Warn(s)
            | Command::Warns(s)
            | Command::ResetWarns(s)
            | Command::Ban(s)
            | Command::Unban(s)
            | Command::Kick(s)
            | Command::Mute(s)
            | Command::Unmute(s)
            | Command::Info(s)
            | Command::Admin(s)
            | Command::Unadmin(s)
            | Command::Grant(s)
            | Command::Revoke(s) => s,
            _ => "",
        }
    }
}
