use std::fmt;

use teloxide::types::{ChatId, UserId};

use crate::platform::Platform;
use crate::store::Store;

/// Capability tier of an actor within one chat. Ordered so that a higher
/// tier is permitted everything a lower one is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    None,
    LimitedModerator,
    FullModerator,
    Superadmin,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::None => "member",
            Tier::LimitedModerator => "moderator",
            Tier::FullModerator => "administrator",
            Tier::Superadmin => "bot owner",
        };
        f.write_str(name)
    }
}

/// Computes the tier of `actor` in `chat` from scratch. Nothing is cached,
/// platform admin status can change at any time. If the platform can't be
/// asked, the actor is not treated as a platform admin.
pub async fn tier(store: &Store, platform: &dyn Platform, chat: ChatId, actor: UserId) -> Tier {
    if store.owner().await == Some(actor) {
        return Tier::Superadmin;
    }

    match platform.member(chat, actor).await {
        Ok(member) if member.status.is_privileged() => return Tier::FullModerator,
        Ok(_) => {}
        Err(e) => log::warn!("Couldn't check admin status of {actor} in {chat}: {e}"),
    }

    if store.is_bot_admin(chat, actor).await {
        Tier::LimitedModerator
    } else {
        Tier::None
    }
}
