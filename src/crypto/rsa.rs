//! RSA operations.
//!
//! Key generation, PKCS#1 v1.5 signing over a caller-supplied DigestInfo,
//! and PKCS#1 v1.5 decryption, using the rsa crate.

use log::debug;
use rand::rngs::OsRng;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::errors::Error;

/// A full RSA key as stored by the card: modulus, public exponent and both
/// primes, all big-endian.
#[derive(Debug, Clone)]
pub struct RsaKey {
    pub n: Vec<u8>,
    pub e: Vec<u8>,
    pub p: Vec<u8>,
    pub q: Vec<u8>,
}

impl RsaKey {
    /// Assemble a key from its public exponent and primes, recomputing the
    /// modulus. This is the shape delivered by the key-import template.
    pub fn from_components(e: &[u8], p: &[u8], q: &[u8]) -> Self {
        let n = BigUint::from_bytes_be(p) * BigUint::from_bytes_be(q);
        Self {
            n: n.to_bytes_be(),
            e: e.to_vec(),
            p: p.to_vec(),
            q: q.to_vec(),
        }
    }
}

/// Generate a new RSA key of `bits` modulus size.
pub fn generate(bits: usize) -> Result<RsaKey, Error> {
    debug!("generating RSA-{} keypair", bits);

    let private_key = RsaPrivateKey::new(&mut OsRng, bits).map_err(|e| {
        debug!("RSA key generation failed: {}", e);
        Error::CryptoOperationError
    })?;
    let public_key = RsaPublicKey::from(&private_key);

    let primes = private_key.primes();
    if primes.len() < 2 {
        return Err(Error::CryptoOperationError);
    }

    Ok(RsaKey {
        n: public_key.n().to_bytes_be(),
        e: public_key.e().to_bytes_be(),
        p: primes[0].to_bytes_be(),
        q: primes[1].to_bytes_be(),
    })
}

/// Sign a DigestInfo with PKCS#1 v1.5 padding.
///
/// The card receives the already-built DigestInfo structure in the command
/// data; padding is applied here and the exponentiation done raw.
pub fn sign_digest_info(key: &RsaKey, digest_info: &[u8]) -> Result<Vec<u8>, Error> {
    let key_size = key.n.len();

    // PKCS#1 v1.5 block: 00 01 [FF..FF] 00 [DigestInfo], at least 8 FF bytes.
    if digest_info.len() + 11 > key_size {
        return Err(Error::CryptoOperationError);
    }

    let padding_len = key_size - digest_info.len() - 3;
    let mut padded = Vec::with_capacity(key_size);
    padded.push(0x00);
    padded.push(0x01);
    padded.extend(std::iter::repeat(0xFF).take(padding_len));
    padded.push(0x00);
    padded.extend_from_slice(digest_info);

    let m = BigUint::from_bytes_be(&padded);
    let private_key = private_key(key)?;
    let signature = m.modpow(private_key.d(), private_key.n());

    let mut sig_bytes = signature.to_bytes_be();
    while sig_bytes.len() < key_size {
        sig_bytes.insert(0, 0);
    }
    Ok(sig_bytes)
}

/// Decrypt a PKCS#1 v1.5 ciphertext.
pub fn decipher(key: &RsaKey, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
    let private_key = private_key(key)?;
    private_key.decrypt(Pkcs1v15Encrypt, ciphertext).map_err(|e| {
        debug!("RSA decryption failed: {}", e);
        Error::CryptoOperationError
    })
}

/// Rebuild an rsa crate private key from the stored components.
///
/// The private exponent is not stored; it is recomputed as
/// d = e^(-1) mod phi(n) with phi(n) = (p-1)(q-1).
fn private_key(key: &RsaKey) -> Result<RsaPrivateKey, Error> {
    let n = BigUint::from_bytes_be(&key.n);
    let e = BigUint::from_bytes_be(&key.e);
    let p = BigUint::from_bytes_be(&key.p);
    let q = BigUint::from_bytes_be(&key.q);

    let one = BigUint::from(1u64);
    let phi_n = (&p - &one) * (&q - &one);
    let d = mod_inverse(&e, &phi_n).ok_or(Error::CryptoOperationError)?;

    RsaPrivateKey::from_components(n, e, d, vec![p, q]).map_err(|err| {
        debug!("invalid RSA key components: {}", err);
        Error::CryptoOperationError
    })
}

/// Compute the modular multiplicative inverse a^(-1) mod m with the extended
/// Euclidean algorithm, tracking the sign of the coefficient separately
/// since BigUint is unsigned.
fn mod_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    let one = BigUint::from(1u64);
    let zero = BigUint::from(0u64);

    let mut old_r = m.clone();
    let mut r = a.clone();
    let mut old_s = zero.clone();
    let mut s = one.clone();
    let mut old_s_neg = false;
    let mut s_neg = false;

    while r != zero {
        let quotient = &old_r / &r;

        let temp_r = old_r;
        old_r = r.clone();
        r = temp_r - &quotient * &r;

        // new_s = old_s - quotient * s
        let (new_s, new_s_neg) = {
            let qs = &quotient * &s;
            if old_s_neg == s_neg {
                if old_s >= qs {
                    (old_s.clone() - &qs, old_s_neg)
                } else {
                    (qs - &old_s, !old_s_neg)
                }
            } else {
                (old_s.clone() + &qs, old_s_neg)
            }
        };
        old_s = s;
        old_s_neg = s_neg;
        s = new_s;
        s_neg = new_s_neg;
    }

    if old_r != one {
        return None;
    }

    Some(if old_s_neg { m - &old_s } else { old_s })
}
