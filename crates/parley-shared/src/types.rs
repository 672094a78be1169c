use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Opaque server-assigned message identifier.
    MessageId
);

string_id!(
    /// Opaque chat identifier.
    ChatId
);

string_id!(
    /// Opaque user identifier.
    UserId
);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Personal,
    Group,
}

/// How much of the event flow a push connection carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionMode {
    /// Summary-relevant events across many scopes.
    LatestOnly,
    /// The complete event flow of one active scope.
    FullStream,
}

impl SubscriptionMode {
    pub fn as_query(&self) -> &'static str {
        match self {
            Self::LatestOnly => "latest",
            Self::FullStream => "full",
        }
    }
}

/// Which push channel a transport talks to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventDomain {
    Messages,
    Chats,
    Reactions,
    Presence,
}

impl EventDomain {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Messages => "messages",
            Self::Chats => "chats",
            Self::Reactions => "reactions",
            Self::Presence => "presence",
        }
    }
}

impl fmt::Display for EventDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// The remote end closed the stream.
    Closed,
    /// The connection broke; carries the reason.
    Failed(String),
}

impl ConnectionStatus {
    /// `Closed` and `Failed` end a connection; nothing more arrives until the
    /// owner reconnects.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed(_))
    }
}
