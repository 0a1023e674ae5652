//! ECDSA operations on NIST P-256.
//!
//! The signature commands hand the card an already-hashed message, so
//! signing uses the prehash interface rather than hashing again.

use log::debug;
use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::ecdsa::{Signature, SigningKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;

use crate::errors::Error;

/// Private scalar size in bytes.
pub const SCALAR_SIZE: usize = 32;
/// Uncompressed public point size in bytes (0x04 || x || y).
pub const POINT_SIZE: usize = 65;

/// A full ECDSA key as stored by the card.
#[derive(Debug, Clone)]
pub struct EcdsaKey {
    /// 32-byte private scalar.
    pub scalar: Vec<u8>,
    /// Uncompressed public point.
    pub public: Vec<u8>,
}

/// Generate a new P-256 key pair.
pub fn generate() -> Result<EcdsaKey, Error> {
    debug!("generating P-256 keypair");

    let signing_key = SigningKey::random(&mut OsRng);
    let point = signing_key.verifying_key().to_encoded_point(false);

    Ok(EcdsaKey {
        scalar: signing_key.to_bytes().to_vec(),
        public: point.as_bytes().to_vec(),
    })
}

/// Derive the uncompressed public point from a private scalar.
pub fn public_key(scalar: &[u8]) -> Result<Vec<u8>, Error> {
    let signing_key = signing_key(scalar)?;
    let point = signing_key.verifying_key().to_encoded_point(false);
    Ok(point.as_bytes().to_vec())
}

/// Sign a message digest, returning the raw r||s signature (64 bytes).
pub fn sign_prehash(scalar: &[u8], digest: &[u8]) -> Result<Vec<u8>, Error> {
    let signing_key = signing_key(scalar)?;
    let signature: Signature = signing_key.sign_prehash(digest).map_err(|e| {
        debug!("ECDSA signing failed: {}", e);
        Error::CryptoOperationError
    })?;
    Ok(signature.to_bytes().to_vec())
}

fn signing_key(scalar: &[u8]) -> Result<SigningKey, Error> {
    let scalar: &[u8; SCALAR_SIZE] = scalar
        .try_into()
        .map_err(|_| Error::CryptoOperationError)?;
    SigningKey::from_bytes(scalar.into()).map_err(|e| {
        debug!("invalid P-256 scalar: {}", e);
        Error::CryptoOperationError
    })
}
