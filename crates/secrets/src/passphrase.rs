//! Pulumi's `passphrase` secrets provider cipher.
//!
//! Stack deployments store a salt state of the form
//! `v1:<base64 salt>:<encrypted "pulumi">` and encrypt individual values as
//! `v1:<base64 12-byte nonce>:<base64 AES-256-GCM ciphertext+tag>`. The key
//! is derived with PBKDF2-HMAC-SHA256 over one million rounds. Both formats
//! must match Pulumi's byte-for-byte so states written by either tool stay
//! interchangeable.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use pbkdf2::pbkdf2_hmac_array;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};
use xpulumi_core::{Error, Result};

const VERSION: &str = "v1";
const SALT_LEN: usize = 8;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const PBKDF2_ROUNDS: u32 = 1_000_000;
const VERIFICATION_PLAINTEXT: &str = "pulumi";

/// Symmetric cipher bound to one (passphrase, salt) pair.
///
/// The derived key is wiped from memory on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PassphraseCipher {
    key: [u8; KEY_LEN],
    salt: Vec<u8>,
}

impl fmt::Debug for PassphraseCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassphraseCipher").finish_non_exhaustive()
    }
}

impl PassphraseCipher {
    /// Derive the key for an existing salt.
    #[must_use]
    pub fn new(passphrase: &str, salt: Vec<u8>) -> Self {
        let key = derive_key(passphrase, &salt, PBKDF2_ROUNDS);
        Self { key, salt }
    }

    /// Create a cipher with a freshly generated salt, for new stacks.
    #[must_use]
    pub fn generate(passphrase: &str) -> Self {
        let mut salt = vec![0_u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        Self::new(passphrase, salt)
    }

    /// Reconstruct the cipher from a deployment's salt state, verifying that
    /// the passphrase is the one the state was written with.
    pub fn from_salt_state(passphrase: &str, salt_state: &str) -> Result<Self> {
        let (version, salt_b64, verification) = split_state(salt_state, "salt state")?;
        if version != VERSION {
            return Err(Error::cipher(format!(
                "unsupported salt state version '{version}'"
            )));
        }
        let salt = BASE64
            .decode(salt_b64)
            .map_err(|e| Error::cipher(format!("invalid salt encoding: {e}")))?;

        let cipher = Self::new(passphrase, salt);
        match cipher.decrypt(verification) {
            Ok(plain) if plain == VERIFICATION_PLAINTEXT => Ok(cipher),
            Ok(_) | Err(Error::IncorrectPassphrase) => Err(Error::IncorrectPassphrase),
            Err(e) => Err(e),
        }
    }

    /// Render the salt state for this cipher, suitable for embedding in a
    /// deployment's `secrets_providers.state`.
    pub fn salt_state(&self) -> Result<String> {
        let verification = self.encrypt(VERIFICATION_PLAINTEXT)?;
        Ok(format!(
            "{VERSION}:{}:{verification}",
            BASE64.encode(&self.salt)
        ))
    }

    /// Encrypt a value with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce = [0_u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| Error::cipher("encryption failed"))?;

        Ok(format!(
            "{VERSION}:{}:{}",
            BASE64.encode(nonce),
            BASE64.encode(sealed)
        ))
    }

    /// Decrypt a `v1:<nonce>:<data>` value.
    pub fn decrypt(&self, encrypted: &str) -> Result<String> {
        let (version, nonce_b64, data_b64) = split_state(encrypted, "encrypted value")?;
        if version != VERSION {
            return Err(Error::cipher(format!(
                "unsupported encrypted value version '{version}'"
            )));
        }
        let nonce = BASE64
            .decode(nonce_b64)
            .map_err(|e| Error::cipher(format!("invalid nonce encoding: {e}")))?;
        if nonce.len() != NONCE_LEN {
            return Err(Error::cipher(format!(
                "nonce must be {NONCE_LEN} bytes, got {}",
                nonce.len()
            )));
        }
        let data = BASE64
            .decode(data_b64)
            .map_err(|e| Error::cipher(format!("invalid ciphertext encoding: {e}")))?;

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        // An authentication failure is indistinguishable from a wrong key,
        // which in this scheme means a wrong passphrase.
        let plain = cipher
            .decrypt(Nonce::from_slice(&nonce), data.as_slice())
            .map_err(|_| Error::IncorrectPassphrase)?;

        String::from_utf8(plain).map_err(|_| Error::cipher("decrypted value is not valid UTF-8"))
    }

    #[cfg(test)]
    fn with_rounds(passphrase: &str, salt: Vec<u8>, rounds: u32) -> Self {
        let key = derive_key(passphrase, &salt, rounds);
        Self { key, salt }
    }
}

fn derive_key(passphrase: &str, salt: &[u8], rounds: u32) -> [u8; KEY_LEN] {
    pbkdf2_hmac_array::<Sha256, KEY_LEN>(passphrase.as_bytes(), salt, rounds)
}

fn split_state<'a>(value: &'a str, what: &str) -> Result<(&'a str, &'a str, &'a str)> {
    let mut parts = value.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), Some(c)) if !b.is_empty() && !c.is_empty() => Ok((a, b, c)),
        _ => Err(Error::cipher(format!(
            "malformed {what}: expected 'v1:<base64>:<base64>'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_cipher() -> PassphraseCipher {
        PassphraseCipher::with_rounds("test passphrase", vec![1, 2, 3, 4, 5, 6, 7, 8], 1)
    }

    #[test]
    fn salt_state_round_trip() {
        let cipher = PassphraseCipher::generate("correct horse");
        let state = cipher.salt_state().unwrap();
        assert!(state.starts_with("v1:"));

        let reopened = PassphraseCipher::from_salt_state("correct horse", &state).unwrap();
        let secret = reopened.encrypt("db-password-9000").unwrap();
        assert_eq!(cipher.decrypt(&secret).unwrap(), "db-password-9000");
    }

    #[test]
    fn wrong_passphrase_is_rejected() {
        let cipher = PassphraseCipher::generate("right");
        let state = cipher.salt_state().unwrap();
        let err = PassphraseCipher::from_salt_state("wrong", &state).unwrap_err();
        assert!(matches!(err, Error::IncorrectPassphrase));
    }

    #[test]
    fn malformed_salt_state_is_a_cipher_error() {
        let err = PassphraseCipher::from_salt_state("x", "garbage").unwrap_err();
        assert!(matches!(err, Error::Cipher { .. }));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let err = fast_cipher().decrypt("v9:AAAA:AAAA").unwrap_err();
        assert!(err.to_string().contains("unsupported encrypted value version"));
    }

    #[test]
    fn short_nonce_is_rejected() {
        let cipher = fast_cipher();
        let bad = format!("v1:{}:{}", BASE64.encode(b"short"), BASE64.encode(b"data"));
        let err = cipher.decrypt(&bad).unwrap_err();
        assert!(err.to_string().contains("nonce must be 12 bytes"));
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let cipher = fast_cipher();
        let encrypted = cipher.encrypt("value").unwrap();

        let mut parts: Vec<&str> = encrypted.splitn(3, ':').collect();
        let mut data = BASE64.decode(parts[2]).unwrap();
        data[0] ^= 0xff;
        let tampered_data = BASE64.encode(&data);
        parts[2] = &tampered_data;
        let tampered = parts.join(":");

        let err = cipher.decrypt(&tampered).unwrap_err();
        assert!(matches!(err, Error::IncorrectPassphrase));
    }
}
