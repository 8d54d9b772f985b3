//! Works out which user a command is aimed at.
//!
//! Sources are tried in a fixed order and the first hit wins: the author of
//! the replied-to message, a text mention entity, a numeric user id as first
//! argument. A bare `@handle` can't be resolved (the platform has no lookup
//! by handle), so it ends resolution with a hint instead.

use teloxide::types::ChatId;
use thiserror::Error;

use crate::platform::{Person, Platform, PlatformError, PlatformResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Reply,
    Mention,
    Identifier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub person: Person,
    pub source: Source,
}

impl Target {
    /// The arguments left over once the target has been taken out.
    pub fn rest<'a>(&self, args: &'a [String]) -> &'a [String] {
        match self.source {
            Source::Identifier => &args[1..],
            Source::Reply | Source::Mention => args,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unresolved {
    #[error("no user given")]
    Missing,
    #[error("@{0} can't be looked up by handle")]
    Handle(String),
    #[error("user id {0} is not known here")]
    UnknownId(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(Target),
    Unresolved(Unresolved),
}

impl Resolution {
    pub fn into_result(self) -> Result<Target, Unresolved> {
        match self {
            Resolution::Resolved(target) => Ok(target),
            Resolution::Unresolved(reason) => Err(reason),
        }
    }
}

/// Fails only when the platform couldn't be asked about a numeric id. A
/// platform answer that the id is no member resolves to `UnknownId`.
pub async fn resolve(
    platform: &dyn Platform,
    chat: ChatId,
    reply_author: Option<&Person>,
    mentions: &[Person],
    args: &[String],
) -> PlatformResult<Resolution> {
    if let Some(person) = reply_author {
        return Ok(Resolution::Resolved(Target {
            person: person.clone(),
            source: Source::Reply,
        }));
    }

    if let Some(person) = mentions.first() {
        return Ok(Resolution::Resolved(Target {
            person: person.clone(),
            source: Source::Mention,
        }));
    }

    let Some(first) = args.first() else {
        return Ok(Resolution::Unresolved(Unresolved::Missing));
    };

    if let Ok(id) = first.parse::<u64>() {
        return match platform.member(chat, teloxide::types::UserId(id)).await {
            Ok(member) => Ok(Resolution::Resolved(Target {
                person: member.person,
                source: Source::Identifier,
            })),
            Err(PlatformError::UnknownMember) => {
                log::info!("User {id} is not a member of {chat}");
                Ok(Resolution::Unresolved(Unresolved::UnknownId(id)))
            }
            Err(e) => Err(e),
        };
    }

    let resolution = match first.strip_prefix('@') {
        Some(handle) if !handle.is_empty() => Unresolved::Handle(handle.to_owned()),
        _ => Unresolved::Missing,
    };
    Ok(Resolution::Unresolved(resolution))
}
