use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
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
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Opaque identifier of a user account, assigned by the persistence gateway.
    UserId
);
id_type!(
    /// Opaque identifier of a two-party chat.
    ChatId
);
id_type!(
    /// Opaque identifier of a stored message, minted by the persistence gateway.
    MessageId
);

/// A single unit of conversation content: text, an image payload (data URL),
/// or both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub chat: ChatId,
    pub sender: UserId,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Assigned when the gateway stores the record. A freshly sent message
    /// carries `None` until it is observed again through a history load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read: bool,
}

impl Message {
    /// Builds the record for a draft the gateway has just accepted. The
    /// message starts unread; the recipient's clear pass flips it later.
    pub fn from_draft(draft: MessageDraft, id: MessageId) -> Self {
        Self {
            id,
            chat: draft.chat,
            sender: draft.sender,
            text: draft.text,
            image: draft.image,
            created_at: None,
            read: false,
        }
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

/// Outgoing message content before the gateway has assigned it an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    pub chat: ChatId,
    pub sender: UserId,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Directory entry for one two-party conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    pub members: [UserId; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
    #[serde(default)]
    pub unread_messages: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    /// The member that is not `user`. Chats are strictly two-party.
    pub fn other_member(&self, user: &UserId) -> &UserId {
        if &self.members[0] == user {
            &self.members[1]
        } else {
            &self.members[0]
        }
    }

    pub fn has_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }
}
