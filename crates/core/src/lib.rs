#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod content;
pub mod cursor;
pub mod engagement;
pub mod validation;

pub use content::{sort_items, ContentItem, ContentKey, ContentKind, Direction, IndexKey, SortKey};
pub use cursor::{Cursor, CursorContext, CursorError};
pub use engagement::{
    report_transition, vote_transition, CounterDelta, EngagementKey, EngagementRecord,
    ReportAction, ReportOutcome, ReportRejected, Transition, VoteAction, VoteDelta, VoteState,
};

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            #[must_use]
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(uuid::Uuid::parse_str(s)?))
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(value: uuid::Uuid) -> Self {
                Self(value)
            }
        }
    };
}

uuid_id!(
    /// Partition a content item lives in: a hive for posts, a post for comments.
    ScopeId
);
uuid_id!(ContentId);
uuid_id!(TagId);

impl From<ContentId> for ScopeId {
    /// A post's id doubles as the scope of its comments.
    fn from(value: ContentId) -> Self {
        Self(value.0)
    }
}

/// Opaque user identifier as resolved by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current wall clock as microseconds since the unix epoch.
#[must_use]
pub fn now_micros() -> i64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(now.as_micros()).unwrap_or(i64::MAX)
}
