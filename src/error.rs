use thiserror::Error;

use crate::auth::Tier;
use crate::moderation::target::Unresolved;
use crate::platform::PlatformError;

/// Why a command was not carried out. Each variant is reported back to
/// the chat; none of them are retried.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("requires {required} rights")]
    NotAuthorized { required: Tier },
    #[error("no target user: {0}")]
    TargetUnresolved(Unresolved),
    #[error("platform unavailable: {0}")]
    UpstreamUnavailable(#[from] PlatformError),
    #[error("malformed argument: {0}")]
    MalformedArgument(String),
}
