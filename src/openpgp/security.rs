//! Session security state and data-object access policy.
//!
//! The auth flags live in RAM only: they are cleared on power-up and
//! whenever the applet is (re)selected. The retry counters live in the PW
//! status bytes and survive power cycles independently of these flags.

use log::debug;

use crate::errors::Error;
use crate::fs::{AppletId, FileSystem, Namespace, ObjectId};
use crate::openpgp::{data_objects, Password};

/// Upper bound of the 3-byte digital signature counter.
const DS_COUNTER_MAX: u32 = 0x00FF_FFFF;

/// How a data object may be read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Always,
    Pw1,
    Pw3,
    Never,
}

/// (object id, read access, write access)
type AccessRule = (ObjectId, Access, Access);

/// Static access policy for the well-known data objects. Ids not listed
/// here deny both directions.
const ACCESS_TABLE: &[AccessRule] = &[
    (data_objects::AID, Access::Always, Access::Never),
    (data_objects::HISTORICAL_BYTES, Access::Always, Access::Never),
    (data_objects::CARDHOLDER_RELATED_DATA, Access::Always, Access::Never),
    (data_objects::APPLICATION_RELATED_DATA, Access::Always, Access::Never),
    (data_objects::SECURITY_SUPPORT_TEMPLATE, Access::Always, Access::Never),
    (data_objects::DS_COUNTER, Access::Always, Access::Never),
    (data_objects::EXTENDED_CAPABILITIES, Access::Always, Access::Never),
    (data_objects::ALGORITHM_ATTRIBUTES_SIG, Access::Always, Access::Pw3),
    (data_objects::ALGORITHM_ATTRIBUTES_DEC, Access::Always, Access::Pw3),
    (data_objects::ALGORITHM_ATTRIBUTES_AUT, Access::Always, Access::Pw3),
    (data_objects::PW_STATUS_BYTES, Access::Always, Access::Pw3),
    (data_objects::FINGERPRINTS, Access::Always, Access::Pw3),
    (data_objects::CA_FINGERPRINTS, Access::Always, Access::Pw3),
    (data_objects::FINGERPRINT_SIG, Access::Always, Access::Pw3),
    (data_objects::FINGERPRINT_DEC, Access::Always, Access::Pw3),
    (data_objects::FINGERPRINT_AUT, Access::Always, Access::Pw3),
    (data_objects::CA_FINGERPRINT_SIG, Access::Always, Access::Pw3),
    (data_objects::CA_FINGERPRINT_DEC, Access::Always, Access::Pw3),
    (data_objects::CA_FINGERPRINT_AUT, Access::Always, Access::Pw3),
    (data_objects::KEY_TIMESTAMPS, Access::Always, Access::Pw3),
    (data_objects::TIMESTAMP_SIG, Access::Always, Access::Pw3),
    (data_objects::TIMESTAMP_DEC, Access::Always, Access::Pw3),
    (data_objects::TIMESTAMP_AUT, Access::Always, Access::Pw3),
    // The resetting code value must never be readable.
    (data_objects::RESET_CODE, Access::Never, Access::Pw3),
    (data_objects::NAME, Access::Always, Access::Pw3),
    (data_objects::LOGIN_DATA, Access::Always, Access::Pw3),
    (data_objects::LANGUAGE, Access::Always, Access::Pw3),
    (data_objects::SEX, Access::Always, Access::Pw3),
    (data_objects::URL, Access::Always, Access::Pw3),
    // Private DOs are readable without a password; writing still needs one.
    (data_objects::PRIVATE_DO_1, Access::Always, Access::Pw1),
    (data_objects::PRIVATE_DO_2, Access::Always, Access::Pw3),
    (data_objects::PRIVATE_DO_3, Access::Always, Access::Pw1),
    (data_objects::PRIVATE_DO_4, Access::Always, Access::Pw3),
    (data_objects::CARDHOLDER_CERTIFICATE, Access::Always, Access::Pw3),
];

/// Per-session authentication state of the OpenPGP applet.
pub struct Security {
    pw1: bool,
    pw3: bool,
    pso_cds: bool,
    rc: bool,
}

impl Security {
    pub fn new() -> Self {
        Self {
            pw1: false,
            pw3: false,
            pso_cds: false,
            rc: false,
        }
    }

    /// Mark a password as verified. Verifying PW1 also marks it valid for
    /// signing.
    pub fn set_auth(&mut self, pw: Password) {
        match pw {
            Password::Pw1 => {
                self.pw1 = true;
                self.pso_cds = true;
            }
            Password::Pw3 => self.pw3 = true,
            Password::PsoCds => self.pso_cds = true,
            Password::Rc => self.rc = true,
        }
    }

    /// Clear a password's verified state. Clearing PW1 also revokes the
    /// signing flag.
    pub fn clear_auth(&mut self, pw: Password) {
        match pw {
            Password::Pw1 => {
                self.pw1 = false;
                self.pso_cds = false;
            }
            Password::Pw3 => self.pw3 = false,
            Password::PsoCds => self.pso_cds = false,
            Password::Rc => self.rc = false,
        }
    }

    pub fn get_auth(&self, pw: Password) -> bool {
        match pw {
            Password::Pw1 => self.pw1,
            Password::Pw3 => self.pw3,
            Password::PsoCds => self.pso_cds,
            Password::Rc => self.rc,
        }
    }

    /// Drop all session authentications (power cycle, applet select).
    pub fn clear_all(&mut self) {
        self.pw1 = false;
        self.pw3 = false;
        self.pso_cds = false;
        self.rc = false;
    }

    /// Check the access policy for a GET DATA / PUT DATA target.
    pub fn data_object_access_check(&self, object_id: ObjectId, write: bool) -> Result<(), Error> {
        let rule = ACCESS_TABLE.iter().find(|(id, _, _)| *id == object_id);
        let access = match rule {
            Some(&(_, read, write_access)) => {
                if write {
                    write_access
                } else {
                    read
                }
            }
            None => {
                debug!("access check for unknown object id {:#06x}", object_id);
                Access::Never
            }
        };

        let allowed = match access {
            Access::Always => true,
            Access::Pw1 => self.pw1,
            Access::Pw3 => self.pw3,
            Access::Never => false,
        };

        if allowed {
            Ok(())
        } else {
            Err(Error::AccessDenied)
        }
    }

    /// Increment the persistent digital-signature counter (DO 93),
    /// saturating at its 3-byte maximum.
    pub fn inc_ds_counter(&self, fs: &mut FileSystem) -> Result<(), Error> {
        let raw = fs.read(AppletId::OPENPGP, data_objects::DS_COUNTER, Namespace::File);
        let mut counter: u32 = 0;
        for &byte in raw.iter().take(3) {
            counter = (counter << 8) | byte as u32;
        }

        counter = DS_COUNTER_MAX.min(counter + 1);

        let bytes = [(counter >> 16) as u8, (counter >> 8) as u8, counter as u8];
        fs.write_file(AppletId::OPENPGP, data_objects::DS_COUNTER, Namespace::File, &bytes)
    }
}

impl Default for Security {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let sec = Security::new();
        assert!(!sec.get_auth(Password::Pw1));
        assert!(!sec.get_auth(Password::Pw3));
        assert!(!sec.get_auth(Password::PsoCds));
    }

    #[test]
    fn test_pw1_implies_pso_cds() {
        let mut sec = Security::new();
        sec.set_auth(Password::Pw1);
        assert!(sec.get_auth(Password::Pw1));
        assert!(sec.get_auth(Password::PsoCds));

        sec.clear_auth(Password::Pw1);
        assert!(!sec.get_auth(Password::PsoCds));
    }

    #[test]
    fn test_pso_cds_clears_alone() {
        let mut sec = Security::new();
        sec.set_auth(Password::Pw1);
        sec.clear_auth(Password::PsoCds);
        assert!(sec.get_auth(Password::Pw1));
        assert!(!sec.get_auth(Password::PsoCds));
    }

    #[test]
    fn test_clear_all() {
        let mut sec = Security::new();
        sec.set_auth(Password::Pw1);
        sec.set_auth(Password::Pw3);
        sec.clear_all();
        assert!(!sec.get_auth(Password::Pw1));
        assert!(!sec.get_auth(Password::Pw3));
        assert!(!sec.get_auth(Password::PsoCds));
    }

    #[test]
    fn test_access_public_read() {
        let sec = Security::new();
        assert!(sec
            .data_object_access_check(data_objects::PW_STATUS_BYTES, false)
            .is_ok());
    }

    #[test]
    fn test_access_write_requires_pw3() {
        let mut sec = Security::new();
        assert_eq!(
            sec.data_object_access_check(data_objects::NAME, true),
            Err(Error::AccessDenied)
        );
        sec.set_auth(Password::Pw3);
        assert!(sec.data_object_access_check(data_objects::NAME, true).is_ok());
    }

    #[test]
    fn test_private_dos_readable_without_password() {
        let sec = Security::new();
        for id in [
            data_objects::PRIVATE_DO_1,
            data_objects::PRIVATE_DO_2,
            data_objects::PRIVATE_DO_3,
            data_objects::PRIVATE_DO_4,
        ] {
            assert!(sec.data_object_access_check(id, false).is_ok(), "{:#06x}", id);
            assert_eq!(
                sec.data_object_access_check(id, true),
                Err(Error::AccessDenied),
                "{:#06x}",
                id
            );
        }
    }

    #[test]
    fn test_reset_code_never_readable() {
        let mut sec = Security::new();
        sec.set_auth(Password::Pw1);
        sec.set_auth(Password::Pw3);
        assert_eq!(
            sec.data_object_access_check(data_objects::RESET_CODE, false),
            Err(Error::AccessDenied)
        );
    }

    #[test]
    fn test_unknown_object_denied() {
        let mut sec = Security::new();
        sec.set_auth(Password::Pw3);
        assert_eq!(
            sec.data_object_access_check(0x1234, false),
            Err(Error::AccessDenied)
        );
    }

    #[test]
    fn test_ds_counter_increments() {
        let mut fs = FileSystem::in_memory();
        let sec = Security::new();

        sec.inc_ds_counter(&mut fs).unwrap();
        sec.inc_ds_counter(&mut fs).unwrap();
        assert_eq!(
            fs.read(AppletId::OPENPGP, data_objects::DS_COUNTER, Namespace::File),
            &[0x00, 0x00, 0x02]
        );
    }

    #[test]
    fn test_ds_counter_saturates() {
        let mut fs = FileSystem::in_memory();
        fs.write_file(
            AppletId::OPENPGP,
            data_objects::DS_COUNTER,
            Namespace::File,
            &[0xFF, 0xFF, 0xFF],
        )
        .unwrap();

        let sec = Security::new();
        sec.inc_ds_counter(&mut fs).unwrap();
        assert_eq!(
            fs.read(AppletId::OPENPGP, data_objects::DS_COUNTER, Namespace::File),
            &[0xFF, 0xFF, 0xFF]
        );
    }
}
