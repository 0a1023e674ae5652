//! Key storage.
//!
//! Holds the asymmetric key material per (applet, key slot) and assembles
//! the chained PUT DATA extended-header chunks during key import.

use std::collections::HashMap;

use log::debug;

use crate::buffer::ByteBuffer;
use crate::crypto::ecdsa::{self, EcdsaKey};
use crate::crypto::rsa::RsaKey;
use crate::errors::Error;
use crate::fs::AppId;
use crate::tlv::{self, tags, TlvBuilder};

/// Largest accepted extended header list across all chained chunks.
pub const MAX_EXT_HEADER_SIZE: usize = 2048;

/// OpenPGP key slots, tagged by their CRT values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    DigitalSignature = 0xB6,
    Confidentiality = 0xB8,
    Authentication = 0xA4,
}

impl KeyType {
    /// Map a CRT tag byte onto a key slot.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0xB6 => Some(KeyType::DigitalSignature),
            0xB8 => Some(KeyType::Confidentiality),
            0xA4 => Some(KeyType::Authentication),
            _ => None,
        }
    }
}

/// Key material held in a slot.
#[derive(Debug, Clone)]
pub enum StoredKey {
    Rsa(RsaKey),
    Ecdsa(EcdsaKey),
}

/// Per-applet storage of asymmetric keys.
pub struct KeyStorage {
    keys: HashMap<(AppId, KeyType), StoredKey>,
    ext_header: ByteBuffer,
}

impl KeyStorage {
    pub fn new() -> Self {
        Self {
            keys: HashMap::new(),
            ext_header: ByteBuffer::with_capacity(MAX_EXT_HEADER_SIZE),
        }
    }

    /// Store a full RSA key in a slot.
    pub fn put_rsa_full_key(&mut self, app: AppId, key_type: KeyType, key: RsaKey) {
        self.keys.insert((app, key_type), StoredKey::Rsa(key));
    }

    /// Store a full ECDSA key in a slot.
    pub fn put_ecdsa_full_key(&mut self, app: AppId, key_type: KeyType, key: EcdsaKey) {
        self.keys.insert((app, key_type), StoredKey::Ecdsa(key));
    }

    /// Borrow the key in a slot, if any.
    pub fn get(&self, app: AppId, key_type: KeyType) -> Option<&StoredKey> {
        self.keys.get(&(app, key_type))
    }

    /// Append the public key of a slot as a `7F49` template to `out`.
    pub fn get_public_key_7f49(
        &self,
        app: AppId,
        key_type: KeyType,
        out: &mut ByteBuffer,
    ) -> Result<(), Error> {
        let template = match self.get(app, key_type) {
            Some(StoredKey::Rsa(key)) => TlvBuilder::new()
                .add(tags::RSA_MODULUS, &key.n)
                .add(tags::RSA_EXPONENT, &key.e)
                .wrap(tags::PUBLIC_KEY_TEMPLATE)
                .build(),
            Some(StoredKey::Ecdsa(key)) => TlvBuilder::new()
                .add(tags::ECC_PUBLIC_POINT, &key.public)
                .wrap(tags::PUBLIC_KEY_TEMPLATE)
                .build(),
            None => return Err(Error::DataNotFound),
        };
        out.append(&template)
    }

    /// Accumulate one extended-header chunk from PUT DATA (0xDB / 3FFF).
    ///
    /// When `more_follows` is set (CLA chaining bit) the chunk is buffered;
    /// otherwise the assembled list is parsed and the imported key stored.
    pub fn set_key_ext_header(
        &mut self,
        app: AppId,
        chunk: &[u8],
        more_follows: bool,
    ) -> Result<(), Error> {
        if self.ext_header.append(chunk).is_err() {
            self.ext_header.clear();
            return Err(Error::WrongApduDataLength);
        }
        if more_follows {
            return Ok(());
        }

        let data = self.ext_header.as_slice().to_vec();
        self.ext_header.clear();
        self.import_extended_header(app, &data)
    }

    /// Parse a complete `4D` extended header list and store the key.
    fn import_extended_header(&mut self, app: AppId, data: &[u8]) -> Result<(), Error> {
        let tlvs = tlv::read_list(data);
        let header = tlv::find(&tlvs, tags::EXTENDED_HEADER_LIST)
            .ok_or(Error::WrongApduDataLength)?;

        // 4D is not a constructed tag by BER rules, but its value holds the
        // CRT tag, the 7F48 template and the 5F48 key data as a TLV list.
        let children = tlv::read_list(&header.value);

        let key_type = children
            .iter()
            .find_map(|t| KeyType::from_tag(t.tag as u8))
            .ok_or(Error::WrongApduDataLength)?;

        let key_data = &tlv::find(&children, tags::CONCATENATED_KEY_DATA)
            .ok_or(Error::WrongApduDataLength)?
            .value;

        let template = tlv::find(&children, tags::PRIVATE_KEY_TEMPLATE);
        let lengths = template.map(|t| parse_component_lengths(&t.value));

        match lengths {
            Some((e_len, p_len, q_len)) if p_len > 0 && q_len > 0 => {
                if e_len == 0 || key_data.len() != e_len + p_len + q_len {
                    debug!(
                        "RSA import length mismatch: {} != {} + {} + {}",
                        key_data.len(),
                        e_len,
                        p_len,
                        q_len
                    );
                    return Err(Error::WrongApduDataLength);
                }

                let e = &key_data[..e_len];
                let p = &key_data[e_len..e_len + p_len];
                let q = &key_data[e_len + p_len..];
                let key = RsaKey::from_components(e, p, q);
                debug!("imported RSA key, {} bit modulus", key.n.len() * 8);
                self.put_rsa_full_key(app, key_type, key);
                Ok(())
            }
            _ if key_data.len() == ecdsa::SCALAR_SIZE => {
                let public = ecdsa::public_key(key_data)?;
                self.put_ecdsa_full_key(
                    app,
                    key_type,
                    EcdsaKey {
                        scalar: key_data.to_vec(),
                        public,
                    },
                );
                Ok(())
            }
            _ => Err(Error::CryptoOperationError),
        }
    }
}

impl Default for KeyStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the RSA component lengths from a `7F48` private-key template.
///
/// The template is a sequence of `91`/`92`/`93` tag bytes each followed by a
/// BER length encoding; the length value itself is the component size.
fn parse_component_lengths(data: &[u8]) -> (usize, usize, usize) {
    let mut e_len = 0usize;
    let mut p_len = 0usize;
    let mut q_len = 0usize;

    let mut offset = 0;
    while offset < data.len() {
        let tag = data[offset];
        offset += 1;

        let Some((length, consumed)) = tlv::parse_ber_length(&data[offset..]) else {
            break;
        };
        offset += consumed;

        match tag {
            tags::LEN_PUBLIC_EXPONENT => e_len = length,
            tags::LEN_PRIME_P => p_len = length,
            tags::LEN_PRIME_Q => q_len = length,
            _ => {}
        }
    }

    (e_len, p_len, q_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::rsa;
    use crate::fs::AppletId;

    fn rsa_ext_header(key: &RsaKey, crt: u8) -> Vec<u8> {
        let mut template = Vec::new();
        template.push(tags::LEN_PUBLIC_EXPONENT);
        template.extend(tlv::encode_length(key.e.len()));
        template.push(tags::LEN_PRIME_P);
        template.extend(tlv::encode_length(key.p.len()));
        template.push(tags::LEN_PRIME_Q);
        template.extend(tlv::encode_length(key.q.len()));

        let mut key_data = key.e.clone();
        key_data.extend_from_slice(&key.p);
        key_data.extend_from_slice(&key.q);

        TlvBuilder::new()
            .add(crt as u32, &[])
            .add(tags::PRIVATE_KEY_TEMPLATE, &template)
            .add(tags::CONCATENATED_KEY_DATA, &key_data)
            .wrap(tags::EXTENDED_HEADER_LIST)
            .build()
    }

    #[test]
    fn test_public_key_template_missing_slot() {
        let store = KeyStorage::new();
        let mut out = ByteBuffer::with_capacity(64);
        assert_eq!(
            store.get_public_key_7f49(AppletId::OPENPGP, KeyType::DigitalSignature, &mut out),
            Err(Error::DataNotFound)
        );
    }

    #[test]
    fn test_rsa_public_key_template() {
        let mut store = KeyStorage::new();
        let key = rsa::generate(1024).unwrap();
        let n = key.n.clone();
        store.put_rsa_full_key(AppletId::OPENPGP, KeyType::DigitalSignature, key);

        let mut out = ByteBuffer::with_capacity(512);
        store
            .get_public_key_7f49(AppletId::OPENPGP, KeyType::DigitalSignature, &mut out)
            .unwrap();

        let outer = tlv::read_list(out.as_slice());
        assert_eq!(outer[0].tag, tags::PUBLIC_KEY_TEMPLATE);
        let inner = tlv::read_list(&outer[0].value);
        assert_eq!(inner[0].tag, tags::RSA_MODULUS);
        assert_eq!(inner[0].value, n);
        assert_eq!(inner[1].tag, tags::RSA_EXPONENT);
    }

    #[test]
    fn test_rsa_import_single_chunk() {
        let mut store = KeyStorage::new();
        let key = rsa::generate(1024).unwrap();
        let header = rsa_ext_header(&key, 0xB8);

        store
            .set_key_ext_header(AppletId::OPENPGP, &header, false)
            .unwrap();

        match store.get(AppletId::OPENPGP, KeyType::Confidentiality) {
            Some(StoredKey::Rsa(imported)) => assert_eq!(imported.n, key.n),
            other => panic!("unexpected slot contents: {:?}", other.is_some()),
        }
    }

    #[test]
    fn test_rsa_import_chained_chunks() {
        let mut store = KeyStorage::new();
        let key = rsa::generate(1024).unwrap();
        let header = rsa_ext_header(&key, 0xB6);
        let (first, second) = header.split_at(header.len() / 2);

        store
            .set_key_ext_header(AppletId::OPENPGP, first, true)
            .unwrap();
        store
            .set_key_ext_header(AppletId::OPENPGP, second, false)
            .unwrap();

        assert!(store
            .get(AppletId::OPENPGP, KeyType::DigitalSignature)
            .is_some());
    }

    #[test]
    fn test_ecdsa_import() {
        let mut store = KeyStorage::new();
        let key = ecdsa::generate().unwrap();
        let header = TlvBuilder::new()
            .add(0xA4, &[])
            .add(tags::CONCATENATED_KEY_DATA, &key.scalar)
            .wrap(tags::EXTENDED_HEADER_LIST)
            .build();

        store
            .set_key_ext_header(AppletId::OPENPGP, &header, false)
            .unwrap();

        match store.get(AppletId::OPENPGP, KeyType::Authentication) {
            Some(StoredKey::Ecdsa(imported)) => assert_eq!(imported.public, key.public),
            other => panic!("unexpected slot contents: {:?}", other.is_some()),
        }
    }

    #[test]
    fn test_import_without_header_list() {
        let mut store = KeyStorage::new();
        assert_eq!(
            store.set_key_ext_header(AppletId::OPENPGP, &[0x30, 0x02, 0x01, 0x02], false),
            Err(Error::WrongApduDataLength)
        );
    }

    #[test]
    fn test_component_lengths() {
        // 91 03 92 81 80 93 81 80
        let data = [0x91, 0x03, 0x92, 0x81, 0x80, 0x93, 0x81, 0x80];
        assert_eq!(parse_component_lengths(&data), (3, 128, 128));
    }
}
