//! AES-256-CBC cipher used by the password handshake.
//!
//! The key is the salt followed by the shared secret, zero-padded or truncated
//! to 32 bytes. There is no key stretching. This keeps the wire format
//! compatible with existing peers but it is NOT a strong construction: treat the
//! handshake as an access deterrent, not as transport security.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use tracing::warn;

use crate::error::{constants, ProtocolError, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES-256 key length
pub const KEY_SIZE: usize = 32;

/// CBC initialization vector length (one AES block)
pub const IV_SIZE: usize = 16;

/// Symmetric cipher bound to one handshake's key
pub struct Crypto {
    key: [u8; KEY_SIZE],
}

impl Crypto {
    /// Build a cipher from a raw 32-byte key
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self { key: *key }
    }

    /// Derive the key as `salt || secret`, fitted to 32 bytes
    pub fn from_salt_and_secret(salt: &[u8], secret: &[u8]) -> Self {
        Self {
            key: derive_key(salt, secret),
        }
    }

    /// Generate a random IV
    pub fn generate_iv() -> [u8; IV_SIZE] {
        let mut iv = [0u8; IV_SIZE];
        fill_random(&mut iv);
        iv
    }

    /// Encrypt with PKCS#7 padding
    pub fn encrypt(&self, plaintext: &[u8], iv: &[u8; IV_SIZE]) -> Result<Vec<u8>> {
        let cipher = Aes256CbcEnc::new_from_slices(&self.key, iv)
            .map_err(|_| ProtocolError::AuthenticationError(constants::ERR_CIPHER_INIT.into()))?;
        Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
    }

    /// Decrypt and strip PKCS#7 padding
    pub fn decrypt(&self, ciphertext: &[u8], iv: &[u8; IV_SIZE]) -> Result<Vec<u8>> {
        let cipher = Aes256CbcDec::new_from_slices(&self.key, iv)
            .map_err(|_| ProtocolError::AuthenticationError(constants::ERR_CIPHER_INIT.into()))?;
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| ProtocolError::DecryptionFailure)
    }

    /// Encrypt under a fresh IV and return `iv || ciphertext`
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let iv = Self::generate_iv();
        let ciphertext = self.encrypt(plaintext, &iv)?;

        let mut sealed = Vec::with_capacity(IV_SIZE + ciphertext.len());
        sealed.extend_from_slice(&iv);
        sealed.extend(ciphertext);
        Ok(sealed)
    }

    /// Reverse of [`Crypto::seal`]
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < IV_SIZE * 2 {
            return Err(ProtocolError::AuthenticationError(
                constants::ERR_CHALLENGE_TOO_SHORT.into(),
            ));
        }

        let (iv_bytes, ciphertext) = sealed.split_at(IV_SIZE);
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(iv_bytes);
        self.decrypt(ciphertext, &iv)
    }
}

impl Drop for Crypto {
    fn drop(&mut self) {
        self.key.fill(0);
    }
}

fn derive_key(salt: &[u8], secret: &[u8]) -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    for (slot, byte) in key.iter_mut().zip(salt.iter().chain(secret.iter())) {
        *slot = *byte;
    }
    key
}

/// Fill `buf` from the OS CSPRNG, falling back to the thread RNG if the OS
/// source is unavailable.
pub fn fill_random(buf: &mut [u8]) {
    if let Err(e) = getrandom::fill(buf) {
        warn!(error = %e, "OS random source unavailable, falling back to thread RNG");
        rand::rng().fill_bytes(buf);
    }
}

/// Generate `len` random bytes
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    fill_random(&mut buf);
    buf
}

/// Compare two byte strings without short-circuiting on the first difference
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
