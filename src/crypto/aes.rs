use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use aes_gcm::aead::rand_core::RngCore;
use crate::error::{AppError, Result};

/// The size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// The size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Generates a new random AES-GCM nonce.
fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Turns a configured master key into a fixed-size AES key.
pub fn key_from_slice(key: &[u8]) -> Result<[u8; KEY_SIZE]> {
    key.try_into()
        .map_err(|_| AppError::Encryption(format!("Key must be {} bytes", KEY_SIZE)))
}

/// Encrypts `plaintext` with AES-256-GCM.
///
/// # Returns
///
/// The ciphertext with the 12-byte nonce appended (`ciphertext || nonce`).
pub fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.into());

    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from(nonce_bytes);

    let mut sealed = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| AppError::Encryption(format!("Encryption failed: {}", e)))?;
    sealed.extend_from_slice(&nonce_bytes);

    Ok(sealed)
}

/// Decrypts a buffer produced by [`seal`].
pub fn open(key: &[u8; KEY_SIZE], sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_SIZE {
        return Err(AppError::Encryption("Sealed data is truncated".to_string()));
    }

    let (ciphertext, nonce) = sealed.split_at(sealed.len() - NONCE_SIZE);
    let nonce_arr: [u8; NONCE_SIZE] = nonce
        .try_into()
        .map_err(|_| AppError::Encryption("Invalid nonce length".to_string()))?;

    let cipher = Aes256Gcm::new(key.into());
    cipher
        .decrypt(&Nonce::from(nonce_arr), ciphertext)
        .map_err(|e| AppError::Encryption(format!("Decryption failed: {}", e)))
}
