//! chatseal: end-to-end encryption for a pairwise chat client.
//!
//! Accounts own an RSA-OAEP key pair. The public half is published as a JWK;
//! the private half is kept only in sealed form, encrypted under a key
//! derived from the account password. Messages are encrypted to the
//! recipient's public key and read by unsealing the private key on demand.

pub mod app;
pub mod crypto;
pub mod error;
pub mod messagedb;
pub mod store;

pub use app::{AppConfig, Messenger, Session};
pub use error::{E2eeError, E2eeResult};
