use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

pub mod config;
pub mod state;

pub use config::AppConfig;
pub use state::{Direction, DisplayMessage, MessageBody, Session, Thread};

use crate::crypto::{CryptoProvider, KeyCustody, KeyPair, MessageCipher, MessageMode, OsCryptoProvider};
use crate::error::{E2eeError, E2eeResult};
use crate::messagedb::MessageDb;
use crate::store::{Account, AccountStore, EncryptedMessage, MessageStore};

/// Account and chat flows on top of the encryption core.
///
/// Signup seals a fresh key pair under the password; authentication is a
/// separate step whose only proof is a successful unseal; reading a
/// conversation unseals again and decrypts message by message.
pub struct Messenger {
    accounts: Arc<dyn AccountStore>,
    messages: Arc<dyn MessageStore>,
    custody: KeyCustody,
    cipher: MessageCipher,
    self_copy: bool,
}

impl Messenger {
    pub fn new(
        config: &AppConfig,
        provider: Arc<dyn CryptoProvider>,
        accounts: Arc<dyn AccountStore>,
        messages: Arc<dyn MessageStore>,
    ) -> E2eeResult<Self> {
        config.validate()?;
        if config.message_mode == MessageMode::Hybrid {
            warn!("Hybrid message mode enabled; clients that only speak direct RSA-OAEP cannot read these messages");
        }
        Ok(Self {
            accounts,
            messages,
            custody: KeyCustody::new(provider.clone(), config.kdf_iterations)?,
            cipher: MessageCipher::new(provider, config.message_mode),
            self_copy: config.self_copy,
        })
    }

    /// Open the SQLite store named by `config` with the OS RNG
    pub fn open(config: &AppConfig) -> E2eeResult<Self> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Arc::new(MessageDb::new(&config.db_path)?);
        Self::new(config, Arc::new(OsCryptoProvider), db.clone(), db)
    }

    /// Create an account: generate a key pair, seal the private half under
    /// `password`, persist both. Nothing is stored if either step fails.
    pub async fn signup(&self, id: &str, password: &str) -> E2eeResult<Session> {
        let id = normalize_id(id)?;
        if password.is_empty() {
            return Err(E2eeError::InvalidInput("Username and password required".to_string()));
        }
        if self.accounts.account(&id)?.is_some() {
            return Err(E2eeError::AccountExists(id));
        }

        let custody = self.custody.clone();
        let password = Zeroizing::new(password.to_string());
        let (public_key, sealed_private_key) = blocking(move || {
            let KeyPair { public, private } = custody.generate_key_pair()?;
            let sealed = custody.seal_private_key(&private, &password)?;
            Ok((public, sealed))
        })
        .await?;

        let account = Account {
            id: id.clone(),
            public_key,
            sealed_private_key,
            created_at: chrono::Utc::now(),
        };
        self.accounts.insert_account(&account)?;

        info!(account = %id, fingerprint = %account.public_key.fingerprint(), "Account created");
        Ok(Session::new(id))
    }

    /// Unknown accounts and wrong passwords are indistinguishable to the caller
    pub async fn authenticate(&self, id: &str, password: &str) -> E2eeResult<Session> {
        let id = normalize_id(id)?;
        let Some(account) = self.accounts.account(&id)? else {
            debug!(account = %id, "Login for unknown account");
            return Err(E2eeError::InvalidCredentials);
        };

        self.unseal(account, password).await?;
        info!(account = %id, "Authenticated");
        Ok(Session::new(id))
    }

    /// Encrypt `plaintext` for `to` and store it. Oversized plaintext is
    /// rejected here, before anything is persisted.
    pub async fn send(&self, session: &Session, to: &str, plaintext: &str) -> E2eeResult<EncryptedMessage> {
        let from = session.account_id();
        let sender_key = self
            .accounts
            .public_key(from)?
            .ok_or_else(|| E2eeError::UnknownAccount(from.to_string()))?;
        let to = normalize_id(to)?;
        let recipient_key = self
            .accounts
            .public_key(&to)?
            .ok_or_else(|| E2eeError::UnknownAccount(to.clone()))?;
        let own_key = self.self_copy.then_some(sender_key);

        let cipher = self.cipher.clone();
        let plaintext = Zeroizing::new(plaintext.to_string());
        let (ciphertext, sender_copy) = blocking(move || {
            let ciphertext = cipher.encrypt_for(&recipient_key, &plaintext)?;
            let sender_copy = own_key
                .map(|key| cipher.encrypt_for(&key, &plaintext))
                .transpose()?;
            Ok((ciphertext, sender_copy))
        })
        .await?;

        let message = EncryptedMessage::new(from, &to, ciphertext, sender_copy);
        self.messages.insert_message(&message)?;
        info!(id = %message.id, from = %message.sender, to = %message.recipient, "Message sent");
        Ok(message)
    }

    /// Everyone `session` can write to, sorted by id
    pub fn users(&self, session: &Session) -> E2eeResult<Vec<String>> {
        let mut users = self.accounts.list_accounts()?;
        users.retain(|id| id != session.account_id());
        Ok(users)
    }

    /// Conversation partners, most recent first
    pub fn threads(&self, session: &Session) -> E2eeResult<Vec<Thread>> {
        let me = session.account_id();
        let mut latest: HashMap<String, chrono::DateTime<chrono::Utc>> = HashMap::new();
        for message in self.messages.messages_for(me)? {
            let entry = latest
                .entry(message.peer_of(me).to_string())
                .or_insert(message.created_at);
            if message.created_at > *entry {
                *entry = message.created_at;
            }
        }

        let mut threads: Vec<Thread> = latest
            .into_iter()
            .map(|(peer, last_at)| Thread { peer, last_at })
            .collect();
        threads.sort_by(|a, b| b.last_at.cmp(&a.last_at).then_with(|| a.peer.cmp(&b.peer)));
        Ok(threads)
    }

    /// Decrypt the conversation with `peer`, oldest first.
    ///
    /// A wrong password fails the whole call; a message that cannot be
    /// decrypted is replaced by a placeholder and the rest still render.
    pub async fn conversation(&self, session: &Session, peer: &str, password: &str) -> E2eeResult<Vec<DisplayMessage>> {
        let me = session.account_id().to_string();
        let peer = normalize_id(peer)?;
        let account = self
            .accounts
            .account(&me)?
            .ok_or_else(|| E2eeError::UnknownAccount(me.clone()))?;
        let history = self.messages.conversation(&me, &peer)?;

        let custody = self.custody.clone();
        let cipher = self.cipher.clone();
        let password = Zeroizing::new(password.to_string());
        let mut listing = blocking(move || {
            let private_jwk = custody
                .open_private_key(&account.sealed_private_key, &password)
                .map_err(|_| E2eeError::InvalidCredentials)?;
            let private_key = private_jwk.to_private_key()?;

            let listing = history
                .into_iter()
                .map(|message| {
                    let outgoing = message.sender == me;
                    let body = match (outgoing, &message.sender_copy) {
                        (true, None) => MessageBody::Sealed,
                        (true, Some(copy)) => read_body(&cipher, &private_key, &message, copy),
                        (false, _) => read_body(&cipher, &private_key, &message, &message.ciphertext),
                    };
                    DisplayMessage {
                        id: message.id,
                        direction: if outgoing { Direction::Out } else { Direction::In },
                        body,
                        created_at: message.created_at,
                    }
                })
                .collect::<Vec<_>>();
            Ok(listing)
        })
        .await?;

        listing.sort_by_key(|message| message.created_at);
        Ok(listing)
    }

    pub fn fingerprint(&self, id: &str) -> E2eeResult<String> {
        let id = normalize_id(id)?;
        let key = self
            .accounts
            .public_key(&id)?
            .ok_or_else(|| E2eeError::UnknownAccount(id.clone()))?;
        Ok(key.fingerprint())
    }

    async fn unseal(&self, account: Account, password: &str) -> E2eeResult<()> {
        let custody = self.custody.clone();
        let password = Zeroizing::new(password.to_string());
        blocking(move || {
            custody
                .open_private_key(&account.sealed_private_key, &password)
                .map(drop)
                .map_err(|e| match e {
                    E2eeError::UnsealFailed => E2eeError::InvalidCredentials,
                    other => other,
                })
        })
        .await
    }
}

fn read_body(
    cipher: &MessageCipher,
    private_key: &rsa::RsaPrivateKey,
    message: &EncryptedMessage,
    ciphertext: &str,
) -> MessageBody {
    match cipher.decrypt_with(private_key, ciphertext) {
        Ok(text) => MessageBody::Plain(text),
        Err(e) => {
            warn!(id = %message.id, error = %e, "Message could not be decrypted");
            MessageBody::Unreadable
        }
    }
}

/// Usernames are case-insensitive and trimmed
fn normalize_id(id: &str) -> E2eeResult<String> {
    let id = id.trim().to_lowercase();
    if id.is_empty() {
        return Err(E2eeError::InvalidInput("Username and password required".to_string()));
    }
    Ok(id)
}

/// Run CPU-bound crypto off the async executor and wait for it
async fn blocking<T, F>(f: F) -> E2eeResult<T>
where
    F: FnOnce() -> E2eeResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
