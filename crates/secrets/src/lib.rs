//! Secret handling for xpulumi.
//!
//! Three concerns live here: talking to the `secret-kv` CLI that guards the
//! Pulumi passphrase, the passphrase-derived AES-256-GCM cipher used by
//! Pulumi's `passphrase` secrets provider, and the `credentials.json` file
//! Pulumi writes after `pulumi login`.

pub mod credentials;
pub mod kv;
pub mod passphrase;

pub use credentials::CredentialsFile;
pub use kv::KvClient;
pub use passphrase::PassphraseCipher;
