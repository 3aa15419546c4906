//! Records the encryption core reads and writes, and the storage seams
//! through which it reaches them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::{PublicJwk, SealedPrivateKey};
use crate::error::E2eeResult;

/// Account as seen by the encryption core: one published public key and one
/// sealed private key. Created at signup and never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub public_key: PublicJwk,
    pub sealed_private_key: SealedPrivateKey,
    pub created_at: DateTime<Utc>,
}

/// Ciphertext addressed to exactly one recipient. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedMessage {
    pub id: Uuid,
    pub sender: String,
    pub recipient: String,
    /// base64, encrypted for `recipient`
    pub ciphertext: String,
    /// Optional copy encrypted for `sender`, so outgoing messages can be shown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_copy: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EncryptedMessage {
    pub fn new(sender: &str, recipient: &str, ciphertext: String, sender_copy: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            ciphertext,
            sender_copy,
            created_at: Utc::now(),
        }
    }

    /// The other participant, from `account`'s point of view
    pub fn peer_of(&self, account: &str) -> &str {
        if self.sender == account {
            &self.recipient
        } else {
            &self.sender
        }
    }
}

pub trait AccountStore: Send + Sync {
    /// Fails with `AccountExists` if the id is taken
    fn insert_account(&self, account: &Account) -> E2eeResult<()>;

    fn account(&self, id: &str) -> E2eeResult<Option<Account>>;

    fn public_key(&self, id: &str) -> E2eeResult<Option<PublicJwk>> {
        Ok(self.account(id)?.map(|account| account.public_key))
    }

    fn list_accounts(&self) -> E2eeResult<Vec<String>>;
}

pub trait MessageStore: Send + Sync {
    fn insert_message(&self, message: &EncryptedMessage) -> E2eeResult<()>;

    /// Messages between `a` and `b` in either direction, oldest first
    fn conversation(&self, a: &str, b: &str) -> E2eeResult<Vec<EncryptedMessage>>;

    /// Every message `account` sent or received, oldest first
    fn messages_for(&self, account: &str) -> E2eeResult<Vec<EncryptedMessage>>;
}
