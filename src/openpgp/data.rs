//! Persisted card records: PW status bytes (DO C4) and algorithm
//! attributes (DOs C1-C3).

use crate::errors::Error;
use crate::fs::{AppletId, FileSystem, Namespace, ObjectId};
use crate::openpgp::{data_objects, Password, PgpConst};

/// The PW status bytes, DO `C4`.
///
/// Wire format (7 bytes): validity flag, three length maxima (PW1, RC, PW3),
/// three remaining-try counters (PW1, RC, PW3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PwStatusBytes {
    /// When false, a PSO:CDS consumes the PW1 authentication.
    pub pw1_valid_several_cds: bool,
    pub pw1_max_length: u8,
    pub rc_max_length: u8,
    pub pw3_max_length: u8,
    pw1_tries: u8,
    rc_tries: u8,
    pw3_tries: u8,
}

impl Default for PwStatusBytes {
    fn default() -> Self {
        Self {
            pw1_valid_several_cds: false,
            pw1_max_length: PgpConst::PW_MAX_LENGTH as u8,
            rc_max_length: PgpConst::RC_MAX_LENGTH as u8,
            pw3_max_length: PgpConst::PW_MAX_LENGTH as u8,
            pw1_tries: PgpConst::DEFAULT_PW_RESET_COUNTER,
            rc_tries: 0,
            pw3_tries: PgpConst::DEFAULT_PW_RESET_COUNTER,
        }
    }
}

impl PwStatusBytes {
    /// Load from DO C4, falling back to defaults when the object is missing
    /// or malformed.
    pub fn load(fs: &FileSystem) -> Self {
        let raw = fs.read(AppletId::OPENPGP, data_objects::PW_STATUS_BYTES, Namespace::File);
        Self::from_bytes(raw).unwrap_or_default()
    }

    /// Persist to DO C4.
    pub fn save(&self, fs: &mut FileSystem) -> Result<(), Error> {
        fs.write_file(
            AppletId::OPENPGP,
            data_objects::PW_STATUS_BYTES,
            Namespace::File,
            &self.to_bytes(),
        )
    }

    pub fn to_bytes(&self) -> [u8; 7] {
        [
            self.pw1_valid_several_cds as u8,
            self.pw1_max_length,
            self.rc_max_length,
            self.pw3_max_length,
            self.pw1_tries,
            self.rc_tries,
            self.pw3_tries,
        ]
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 7 {
            return None;
        }
        Some(Self {
            pw1_valid_several_cds: data[0] != 0,
            pw1_max_length: data[1],
            rc_max_length: data[2],
            pw3_max_length: data[3],
            pw1_tries: clamp_tries(data[4]),
            rc_tries: clamp_tries(data[5]),
            pw3_tries: clamp_tries(data[6]),
        })
    }

    /// Remaining tries for a password.
    pub fn tries_remaining(&self, pw: Password) -> u8 {
        match pw {
            Password::Pw1 | Password::PsoCds => self.pw1_tries,
            Password::Pw3 => self.pw3_tries,
            Password::Rc => self.rc_tries,
        }
    }

    /// Decrement the error counter, saturating at zero.
    pub fn dec_error_counter(&mut self, pw: Password) {
        let counter = self.counter_mut(pw);
        *counter = counter.saturating_sub(1);
    }

    /// Set the remaining tries, clamped to the allowed range.
    pub fn set_tries_remaining(&mut self, pw: Password, tries: u8) {
        *self.counter_mut(pw) = clamp_tries(tries);
    }

    fn counter_mut(&mut self, pw: Password) -> &mut u8 {
        match pw {
            Password::Pw1 | Password::PsoCds => &mut self.pw1_tries,
            Password::Pw3 => &mut self.pw3_tries,
            Password::Rc => &mut self.rc_tries,
        }
    }
}

fn clamp_tries(tries: u8) -> u8 {
    tries.min(PgpConst::DEFAULT_PW_RESET_COUNTER)
}

/// Algorithm identifiers used in DOs C1-C3.
pub struct AlgorithmId;

impl AlgorithmId {
    /// No attributes stored.
    pub const NONE: u8 = 0x00;
    pub const RSA: u8 = 0x01;
    /// ECDSA, used for signature and internal authenticate.
    pub const ECDSA: u8 = 0x13;
}

/// Algorithm attributes for a key slot, DOs `C1`/`C2`/`C3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmAttributes {
    pub algorithm_id: u8,
    /// RSA modulus size in bits.
    pub n_len: u16,
    /// RSA public exponent size in bits.
    pub e_len: u16,
    /// RSA private-key import format.
    pub import_format: u8,
    /// Curve OID for ECDSA.
    pub curve_oid: Vec<u8>,
}

/// OID of NIST P-256, the curve used for ECDSA slots.
pub const NIST_P256_OID: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07];

impl AlgorithmAttributes {
    /// RSA attributes with the given modulus size.
    pub fn rsa(bits: u16) -> Self {
        Self {
            algorithm_id: AlgorithmId::RSA,
            n_len: bits,
            e_len: 32,
            import_format: 0,
            curve_oid: Vec::new(),
        }
    }

    /// ECDSA attributes on P-256.
    pub fn ecdsa_p256() -> Self {
        Self {
            algorithm_id: AlgorithmId::ECDSA,
            n_len: 0,
            e_len: 0,
            import_format: 0,
            curve_oid: NIST_P256_OID.to_vec(),
        }
    }

    /// Whether any algorithm is configured.
    pub fn is_present(&self) -> bool {
        self.algorithm_id != AlgorithmId::NONE
    }

    /// Load from the given DO; an absent object yields `NONE` attributes.
    pub fn load(fs: &FileSystem, file_id: ObjectId) -> Self {
        let raw = fs.read(AppletId::OPENPGP, file_id, Namespace::File);
        Self::from_bytes(raw).unwrap_or(Self {
            algorithm_id: AlgorithmId::NONE,
            n_len: 0,
            e_len: 0,
            import_format: 0,
            curve_oid: Vec::new(),
        })
    }

    /// Encode to the card wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.algorithm_id == AlgorithmId::RSA {
            vec![
                self.algorithm_id,
                (self.n_len >> 8) as u8,
                self.n_len as u8,
                (self.e_len >> 8) as u8,
                self.e_len as u8,
                self.import_format,
            ]
        } else {
            let mut result = vec![self.algorithm_id];
            result.extend_from_slice(&self.curve_oid);
            result
        }
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let algorithm_id = *data.first()?;
        if algorithm_id == AlgorithmId::RSA {
            if data.len() < 6 {
                return None;
            }
            Some(Self {
                algorithm_id,
                n_len: u16::from_be_bytes([data[1], data[2]]),
                e_len: u16::from_be_bytes([data[3], data[4]]),
                import_format: data[5],
                curve_oid: Vec::new(),
            })
        } else {
            Some(Self {
                algorithm_id,
                n_len: 0,
                e_len: 0,
                import_format: 0,
                curve_oid: data[1..].to_vec(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pw_status_round_trip() {
        let mut status = PwStatusBytes::default();
        status.pw1_valid_several_cds = true;
        status.dec_error_counter(Password::Pw1);

        let parsed = PwStatusBytes::from_bytes(&status.to_bytes()).unwrap();
        assert_eq!(parsed, status);
        assert_eq!(parsed.tries_remaining(Password::Pw1), 2);
    }

    #[test]
    fn test_pw_status_counter_clamped() {
        let mut status = PwStatusBytes::default();
        status.set_tries_remaining(Password::Pw3, 200);
        assert_eq!(status.tries_remaining(Password::Pw3), 3);

        status.set_tries_remaining(Password::Pw1, 0);
        status.dec_error_counter(Password::Pw1);
        assert_eq!(status.tries_remaining(Password::Pw1), 0);
    }

    #[test]
    fn test_pw_status_short_record_rejected() {
        assert!(PwStatusBytes::from_bytes(&[0x01, 0x20]).is_none());
    }

    #[test]
    fn test_pso_cds_shares_pw1_counter() {
        let mut status = PwStatusBytes::default();
        status.dec_error_counter(Password::Pw1);
        assert_eq!(status.tries_remaining(Password::PsoCds), 2);
    }

    #[test]
    fn test_algorithm_attributes_rsa_round_trip() {
        let attrs = AlgorithmAttributes::rsa(2048);
        let bytes = attrs.to_bytes();
        assert_eq!(bytes, vec![0x01, 0x08, 0x00, 0x00, 0x20, 0x00]);
        assert_eq!(AlgorithmAttributes::from_bytes(&bytes).unwrap(), attrs);
    }

    #[test]
    fn test_algorithm_attributes_ecdsa() {
        let attrs = AlgorithmAttributes::ecdsa_p256();
        let bytes = attrs.to_bytes();
        assert_eq!(bytes[0], AlgorithmId::ECDSA);
        assert_eq!(&bytes[1..], NIST_P256_OID);
    }

    #[test]
    fn test_algorithm_attributes_absent() {
        let fs = FileSystem::in_memory();
        let attrs = AlgorithmAttributes::load(&fs, data_objects::ALGORITHM_ATTRIBUTES_SIG);
        assert!(!attrs.is_present());
    }
}
