use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

/// PBKDF2 rounds used by 2FAS when exporting with a password.
pub const KDF_ITERATIONS: u32 = 10_000;
const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid passphrase")]
    InvalidPassphrase,
    #[error("encrypted payload is malformed: {0}")]
    Malformed(String),
}

/// Decrypts a `servicesEncrypted` blob of the form
/// `base64(ciphertext || tag):base64(salt):base64(nonce)`.
/// Fields after the third are ignored.
pub fn decrypt_services(encrypted: &str, passphrase: &str) -> Result<Vec<u8>, CryptoError> {
    let mut parts = encrypted.trim().split(':');
    let (Some(ct_b64), Some(salt_b64), Some(nonce_b64)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(CryptoError::Malformed(
            "expected at least three ':'-separated fields".to_string(),
        ));
    };

    let ciphertext = decode_b64("ciphertext", ct_b64)?;
    let salt = decode_b64("salt", salt_b64)?;
    let nonce_bytes = decode_b64("nonce", nonce_b64)?;
    if nonce_bytes.len() != NONCE_LEN {
        return Err(CryptoError::Malformed(format!(
            "nonce is {} bytes, expected {NONCE_LEN}",
            nonce_bytes.len()
        )));
    }

    let key = derive_key(passphrase, &salt);
    let cipher = Aes256Gcm::new_from_slice(key.as_slice())
        .map_err(|e| CryptoError::Malformed(format!("key setup: {e}")))?;

    // A GCM tag mismatch is indistinguishable from a wrong passphrase.
    cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
        .map_err(|_| CryptoError::InvalidPassphrase)
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, KDF_ITERATIONS, &mut key[..]);
    key
}

fn decode_b64(field: &str, value: &str) -> Result<Vec<u8>, CryptoError> {
    general_purpose::STANDARD
        .decode(value)
        .map_err(|e| CryptoError::Malformed(format!("{field}: {e}")))
}

/// Produces a blob [`decrypt_services`] accepts. Only used to build fixtures.
#[cfg(test)]
pub fn encrypt_services(plaintext: &[u8], passphrase: &str) -> String {
    use rand::RngCore;

    let mut salt = [0u8; 32];
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    rand::thread_rng().fill_bytes(&mut nonce);

    let key = derive_key(passphrase, &salt);
    let cipher = Aes256Gcm::new_from_slice(key.as_slice()).unwrap();
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .unwrap();

    format!(
        "{}:{}:{}",
        general_purpose::STANDARD.encode(ciphertext),
        general_purpose::STANDARD.encode(salt),
        general_purpose::STANDARD.encode(nonce)
    )
}
