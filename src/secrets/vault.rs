//! Field-level encryption for stored credentials.
//!
//! Values are sealed with AES-256-GCM under a key derived from the
//! server-only vault passphrase. The encoded form is
//! `version:nonce:ciphertext` with base64 segments, so the scheme can be
//! rotated without rewriting rows.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;
const KEY_ITERATIONS: u32 = 100_000;

// Domain-separation salt for the key derivation; not secret.
const VAULT_SALT: &[u8] = b"portalserver/secret-vault/v1";

fn derive_key(passphrase: &str) -> [u8; KEY_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(passphrase.as_bytes());
    hasher.update(VAULT_SALT);
    let mut digest = hasher.finalize_reset();

    for _ in 0..KEY_ITERATIONS {
        hasher.update(digest);
        hasher.update(VAULT_SALT);
        digest = hasher.finalize_reset();
    }

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&digest);
    key
}

pub fn encrypt_value(passphrase: &str, plaintext: &str) -> Result<String> {
    let key = derive_key(passphrase);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));

    let mut rng = rand::thread_rng();
    let nonce_bytes: [u8; NONCE_SIZE] = rng.gen();
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| anyhow!("encryption failed: {e}"))?;

    Ok(format!(
        "1:{}:{}",
        BASE64.encode(nonce_bytes),
        BASE64.encode(ciphertext)
    ))
}

pub fn decrypt_value(passphrase: &str, encoded: &str) -> Result<String> {
    let parts: Vec<&str> = encoded.split(':').collect();
    if parts.len() != 3 {
        return Err(anyhow!("invalid encrypted value format"));
    }

    let version: u32 = parts[0].parse().map_err(|_| anyhow!("invalid version"))?;
    if version != 1 {
        return Err(anyhow!("unsupported encryption version: {version}"));
    }

    let nonce_bytes = BASE64
        .decode(parts[1])
        .map_err(|e| anyhow!("invalid nonce encoding: {e}"))?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(anyhow!("invalid nonce size"));
    }

    let ciphertext = BASE64
        .decode(parts[2])
        .map_err(|e| anyhow!("invalid ciphertext encoding: {e}"))?;

    let key = derive_key(passphrase);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let nonce = Nonce::from_slice(&nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|e| anyhow!("decryption failed: {e}"))?;

    String::from_utf8(plaintext).map_err(|e| anyhow!("invalid UTF-8: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSPHRASE: &str = "a-test-passphrase-of-length";

    #[test]
    fn encrypt_decrypt_round_trips() {
        let encrypted = encrypt_value(PASSPHRASE, "ga4-api-key-123").unwrap();
        assert!(encrypted.starts_with("1:"));
        assert!(!encrypted.contains("ga4-api-key-123"));

        let decrypted = decrypt_value(PASSPHRASE, &encrypted).unwrap();
        assert_eq!(decrypted, "ga4-api-key-123");
    }

    #[test]
    fn nonces_differ_between_calls() {
        let first = encrypt_value(PASSPHRASE, "same value").unwrap();
        let second = encrypt_value(PASSPHRASE, "same value").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn wrong_passphrase_fails_closed() {
        let encrypted = encrypt_value(PASSPHRASE, "top secret").unwrap();
        assert!(decrypt_value("another-passphrase-entirely", &encrypted).is_err());
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let encrypted = encrypt_value(PASSPHRASE, "top secret").unwrap();
        let mut parts: Vec<String> = encrypted.split(':').map(str::to_string).collect();
        parts[2] = BASE64.encode(b"garbage ciphertext bytes");
        assert!(decrypt_value(PASSPHRASE, &parts.join(":")).is_err());
    }

    #[test]
    fn malformed_encodings_are_rejected() {
        assert!(decrypt_value(PASSPHRASE, "not-encoded").is_err());
        assert!(decrypt_value(PASSPHRASE, "2:AAAA:BBBB").is_err());
        assert!(decrypt_value(PASSPHRASE, "1:!!!:BBBB").is_err());
    }
}
