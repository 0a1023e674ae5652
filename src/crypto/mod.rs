//! Cryptographic facade.
//!
//! The command handlers never touch key material directly: `CryptoLib`
//! wraps the primitive operations (randomness, key generation) and
//! `CryptoEngine` runs sign/decipher against the slots in [`KeyStorage`].

pub mod ecdsa;
pub mod keystore;
pub mod rsa;

use log::debug;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::buffer::ByteBuffer;
use crate::errors::Error;
use crate::fs::AppId;

pub use self::ecdsa::EcdsaKey;
pub use self::keystore::{KeyStorage, KeyType, StoredKey};
pub use self::rsa::RsaKey;

/// Primitive cryptographic operations.
pub struct CryptoLib;

impl CryptoLib {
    /// Append `len` random bytes to `out`.
    pub fn generate_random(&self, len: usize, out: &mut ByteBuffer) -> Result<(), Error> {
        let mut bytes = vec![0u8; len];
        OsRng.fill_bytes(&mut bytes);
        out.append(&bytes)
    }

    /// Generate an RSA key with an `nbits` modulus.
    pub fn rsa_gen_key(&self, nbits: usize) -> Result<RsaKey, Error> {
        rsa::generate(nbits)
    }

    /// Generate a P-256 key.
    pub fn ecdsa_gen_key(&self) -> Result<EcdsaKey, Error> {
        ecdsa::generate()
    }
}

/// Key-slot level operations used by the security commands.
pub struct CryptoEngine {
    pub lib: CryptoLib,
    pub keys: KeyStorage,
}

impl CryptoEngine {
    pub fn new() -> Self {
        Self {
            lib: CryptoLib,
            keys: KeyStorage::new(),
        }
    }

    /// Sign a DigestInfo with the RSA key in the given slot.
    pub fn rsa_sign(
        &self,
        app: AppId,
        key_type: KeyType,
        data: &[u8],
        out: &mut ByteBuffer,
    ) -> Result<(), Error> {
        match self.keys.get(app, key_type) {
            Some(StoredKey::Rsa(key)) => out.append(&rsa::sign_digest_info(key, data)?),
            Some(StoredKey::Ecdsa(_)) => {
                debug!("RSA signature requested but slot {:?} holds ECDSA", key_type);
                Err(Error::CryptoOperationError)
            }
            None => Err(Error::DataNotFound),
        }
    }

    /// Sign a message digest with the ECDSA key in the given slot.
    pub fn ecdsa_sign(
        &self,
        app: AppId,
        key_type: KeyType,
        data: &[u8],
        out: &mut ByteBuffer,
    ) -> Result<(), Error> {
        match self.keys.get(app, key_type) {
            Some(StoredKey::Ecdsa(key)) => out.append(&ecdsa::sign_prehash(&key.scalar, data)?),
            Some(StoredKey::Rsa(_)) => {
                debug!("ECDSA signature requested but slot {:?} holds RSA", key_type);
                Err(Error::CryptoOperationError)
            }
            None => Err(Error::DataNotFound),
        }
    }

    /// Decrypt a PKCS#1 v1.5 cryptogram with the RSA key in the given slot.
    pub fn rsa_decipher(
        &self,
        app: AppId,
        key_type: KeyType,
        data: &[u8],
        out: &mut ByteBuffer,
    ) -> Result<(), Error> {
        match self.keys.get(app, key_type) {
            Some(StoredKey::Rsa(key)) => out.append(&rsa::decipher(key, data)?),
            Some(StoredKey::Ecdsa(_)) => Err(Error::CryptoOperationError),
            None => Err(Error::DataNotFound),
        }
    }
}

impl Default for CryptoEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::AppletId;

    #[test]
    fn test_generate_random_length() {
        let lib = CryptoLib;
        let mut out = ByteBuffer::with_capacity(255);
        lib.generate_random(16, &mut out).unwrap();
        assert_eq!(out.len(), 16);
    }

    #[test]
    fn test_sign_empty_slot() {
        let engine = CryptoEngine::new();
        let mut out = ByteBuffer::with_capacity(512);
        assert_eq!(
            engine.rsa_sign(AppletId::OPENPGP, KeyType::DigitalSignature, &[0; 32], &mut out),
            Err(Error::DataNotFound)
        );
    }

    #[test]
    fn test_slot_algorithm_mismatch() {
        let mut engine = CryptoEngine::new();
        let key = ecdsa::generate().unwrap();
        engine
            .keys
            .put_ecdsa_full_key(AppletId::OPENPGP, KeyType::DigitalSignature, key);

        let mut out = ByteBuffer::with_capacity(512);
        assert_eq!(
            engine.rsa_sign(AppletId::OPENPGP, KeyType::DigitalSignature, &[0; 32], &mut out),
            Err(Error::CryptoOperationError)
        );
    }

    #[test]
    fn test_ecdsa_sign_via_engine() {
        let mut engine = CryptoEngine::new();
        let key = ecdsa::generate().unwrap();
        engine
            .keys
            .put_ecdsa_full_key(AppletId::OPENPGP, KeyType::Authentication, key);

        let mut out = ByteBuffer::with_capacity(128);
        engine
            .ecdsa_sign(AppletId::OPENPGP, KeyType::Authentication, &[0xCD; 32], &mut out)
            .unwrap();
        assert_eq!(out.len(), 64);
    }
}
