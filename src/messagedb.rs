use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::error::{E2eeError, E2eeResult};
use crate::store::{Account, AccountStore, EncryptedMessage, MessageStore};

/// SQLite-backed account and message store.
///
/// Keys are kept as JSON text: the public JWK and the sealed envelope, never
/// an unsealed private key. Message bodies are stored exactly as encrypted.
pub struct MessageDb {
    conn: Mutex<Connection>,
}

impl MessageDb {
    pub fn new<P: AsRef<Path>>(db_path: P) -> E2eeResult<Self> {
        let conn = Connection::open(db_path)?;
        let db = Self { conn: Mutex::new(conn) };
        db.create_tables()?;
        Ok(db)
    }

    pub fn new_in_memory() -> E2eeResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn: Mutex::new(conn) };
        db.create_tables()?;
        Ok(db)
    }

    fn lock(&self) -> E2eeResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| E2eeError::Database("Connection lock poisoned".to_string()))
    }

    fn create_tables(&self) -> E2eeResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                public_key TEXT NOT NULL,
                sealed_private_key TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                sender TEXT NOT NULL,
                recipient TEXT NOT NULL,
                ciphertext TEXT NOT NULL,
                sender_copy TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (sender) REFERENCES accounts(id),
                FOREIGN KEY (recipient) REFERENCES accounts(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_pair ON messages (sender, recipient)",
            [],
        )?;

        Ok(())
    }

    pub fn message_count(&self, account: &str) -> E2eeResult<i64> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT COUNT(*) FROM messages WHERE sender = ?1 OR recipient = ?1")?;
        let count: i64 = stmt.query_row(params![account], |row| row.get(0))?;
        Ok(count)
    }

    fn query_messages(&self, sql: &str, a: &str, b: &str) -> E2eeResult<Vec<EncryptedMessage>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![a, b], MessageRow::from_row)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?.into_message()?);
        }
        Ok(messages)
    }
}

impl AccountStore for MessageDb {
    fn insert_account(&self, account: &Account) -> E2eeResult<()> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id FROM accounts WHERE id = ?1")?;
        if stmt.exists(params![account.id])? {
            return Err(E2eeError::AccountExists(account.id.clone()));
        }

        conn.execute(
            "INSERT INTO accounts (id, public_key, sealed_private_key, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                account.id,
                serde_json::to_string(&account.public_key)?,
                serde_json::to_string(&account.sealed_private_key)?,
                account.created_at,
            ],
        )?;
        debug!(account = %account.id, "Stored account");
        Ok(())
    }

    fn account(&self, id: &str) -> E2eeResult<Option<Account>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, public_key, sealed_private_key, created_at FROM accounts WHERE id = ?1",
        )?;

        let row = stmt
            .query_row(params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, DateTime<Utc>>(3)?,
                ))
            })
            .optional()?;

        match row {
            Some((id, public_key, sealed, created_at)) => Ok(Some(Account {
                id,
                public_key: serde_json::from_str(&public_key)?,
                sealed_private_key: serde_json::from_str(&sealed)?,
                created_at,
            })),
            None => Ok(None),
        }
    }

    fn list_accounts(&self) -> E2eeResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id FROM accounts ORDER BY id ASC")?;
        let ids = stmt.query_map([], |row| row.get(0))?.collect::<SqlResult<Vec<String>>>()?;
        Ok(ids)
    }
}

impl MessageStore for MessageDb {
    fn insert_message(&self, message: &EncryptedMessage) -> E2eeResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages (id, sender, recipient, ciphertext, sender_copy, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id.to_string(),
                message.sender,
                message.recipient,
                message.ciphertext,
                message.sender_copy,
                message.created_at,
            ],
        )?;
        debug!(id = %message.id, "Stored message");
        Ok(())
    }

    fn conversation(&self, a: &str, b: &str) -> E2eeResult<Vec<EncryptedMessage>> {
        self.query_messages(
            "SELECT id, sender, recipient, ciphertext, sender_copy, created_at
             FROM messages
             WHERE (sender = ?1 AND recipient = ?2) OR (sender = ?2 AND recipient = ?1)
             ORDER BY created_at ASC, seq ASC",
            a,
            b,
        )
    }

    fn messages_for(&self, account: &str) -> E2eeResult<Vec<EncryptedMessage>> {
        self.query_messages(
            "SELECT id, sender, recipient, ciphertext, sender_copy, created_at
             FROM messages
             WHERE sender = ?1 OR recipient = ?2
             ORDER BY created_at ASC, seq ASC",
            account,
            account,
        )
    }
}

struct MessageRow {
    id: String,
    sender: String,
    recipient: String,
    ciphertext: String,
    sender_copy: Option<String>,
    created_at: DateTime<Utc>,
}

impl MessageRow {
    fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            id: row.get(0)?,
            sender: row.get(1)?,
            recipient: row.get(2)?,
            ciphertext: row.get(3)?,
            sender_copy: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_message(self) -> E2eeResult<EncryptedMessage> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| E2eeError::Database(format!("Invalid message id {}: {}", self.id, e)))?;
        Ok(EncryptedMessage {
            id,
            sender: self.sender,
            recipient: self.recipient,
            ciphertext: self.ciphertext,
            sender_copy: self.sender_copy,
            created_at: self.created_at,
        })
    }
}
