use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Proof that an account's password was accepted.
///
/// Only `Messenger::signup` and `Messenger::authenticate` hand these out;
/// a session cannot be built by hand:
///
/// ```compile_fail
/// let session = chatseal::Session {
///     account_id: "bob".to_string(),
///     authenticated_at: chrono::Utc::now(),
/// };
/// ```
///
/// Holds no key material: the private key is unsealed again for every
/// operation that needs it and dropped straight after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    account_id: String,
    authenticated_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(account_id: String) -> Self {
        Self {
            account_id,
            authenticated_at: Utc::now(),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn authenticated_at(&self) -> DateTime<Utc> {
        self.authenticated_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

/// What a listing shows for one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "lowercase")]
pub enum MessageBody {
    Plain(String),
    /// Outgoing message without a self-copy; the sender cannot read it back
    Sealed,
    /// Decryption failed for this one message
    Unreadable,
}

impl MessageBody {
    pub const SEALED_PLACEHOLDER: &'static str = "(encrypted)";
    pub const UNREADABLE_PLACEHOLDER: &'static str = "[unable to decrypt]";
}

impl std::fmt::Display for MessageBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageBody::Plain(text) => write!(f, "{}", text),
            MessageBody::Sealed => write!(f, "{}", Self::SEALED_PLACEHOLDER),
            MessageBody::Unreadable => write!(f, "{}", Self::UNREADABLE_PLACEHOLDER),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayMessage {
    pub id: uuid::Uuid,
    pub direction: Direction,
    pub body: MessageBody,
    pub created_at: DateTime<Utc>,
}

/// One conversation partner and the time of the latest message with them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub peer: String,
    pub last_at: DateTime<Utc>,
}
