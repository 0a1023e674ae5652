//! Card composition root.
//!
//! Wires the persistent store, the crypto engine and the applet registry
//! together and provisions a fresh card on first use.

use std::path::PathBuf;

use log::info;

use crate::applet::AppletStorage;
use crate::buffer::ByteBuffer;
use crate::crypto::CryptoEngine;
use crate::errors::Error;
use crate::executor::ApduExecutor;
use crate::fs::{AppletId, FileSystem, Namespace};
use crate::openpgp::data::AlgorithmAttributes;
use crate::openpgp::{data_objects, OpenPgpApplet, PwStatusBytes, SecureFileId, OPENPGP_AID_PREFIX};

/// Components shared by every command handler.
pub struct Context {
    pub fs: FileSystem,
    pub crypto: CryptoEngine,
}

/// A complete virtual card: executor, installed applets and their backing
/// components.
pub struct Card {
    executor: ApduExecutor,
    ctx: Context,
}

/// Factory default value of PW1.
pub const DEFAULT_PW1: &[u8] = b"123456";
/// Factory default value of PW3.
pub const DEFAULT_PW3: &[u8] = b"12345678";
/// Default modulus size for freshly provisioned RSA slots.
const DEFAULT_RSA_BITS: u16 = 2048;

impl Card {
    /// Open a card backed by `storage_dir` (the default directory when
    /// None), provisioning factory defaults on first use.
    pub fn new(storage_dir: Option<PathBuf>) -> Self {
        Self::with_fs(FileSystem::open(storage_dir))
    }

    /// A card that keeps all state in memory. Useful for tests and
    /// simulations.
    pub fn in_memory() -> Self {
        Self::with_fs(FileSystem::in_memory())
    }

    fn with_fs(mut fs: FileSystem) -> Self {
        if let Err(e) = provision(&mut fs) {
            // A card that cannot persist its defaults still works for the
            // session; every later write reports its own error.
            log::warn!("provisioning failed: {}", e);
        }

        let mut applets = AppletStorage::new();
        applets.register(Box::new(OpenPgpApplet::new()));

        Self {
            executor: ApduExecutor::new(applets),
            ctx: Context {
                fs,
                crypto: CryptoEngine::new(),
            },
        }
    }

    /// Process one APDU, leaving the response (data plus status word) in
    /// `out`.
    pub fn execute(&mut self, apdu: &[u8], out: &mut ByteBuffer) -> Result<(), Error> {
        self.executor.execute(&mut self.ctx, apdu, out)
    }

    /// Power-cycle the card: all session state is dropped, persistent
    /// objects survive.
    pub fn reset(&mut self) {
        self.executor.reset();
    }
}

/// Write the factory defaults for any object missing from the store.
fn provision(fs: &mut FileSystem) -> Result<(), Error> {
    let app = AppletId::OPENPGP;

    if fs.read(app, SecureFileId::PW1, Namespace::Secure).is_empty() {
        info!("provisioning factory defaults");
        fs.write_file(app, SecureFileId::PW1, Namespace::Secure, DEFAULT_PW1)?;
        fs.write_file(app, SecureFileId::PW3, Namespace::Secure, DEFAULT_PW3)?;
    }

    if fs
        .read(app, data_objects::PW_STATUS_BYTES, Namespace::File)
        .is_empty()
    {
        PwStatusBytes::default().save(fs)?;
    }

    for id in [
        data_objects::ALGORITHM_ATTRIBUTES_SIG,
        data_objects::ALGORITHM_ATTRIBUTES_DEC,
        data_objects::ALGORITHM_ATTRIBUTES_AUT,
    ] {
        if fs.read(app, id, Namespace::File).is_empty() {
            fs.write_file(
                app,
                id,
                Namespace::File,
                &AlgorithmAttributes::rsa(DEFAULT_RSA_BITS).to_bytes(),
            )?;
        }
    }

    if fs.read(app, data_objects::DS_COUNTER, Namespace::File).is_empty() {
        fs.write_file(app, data_objects::DS_COUNTER, Namespace::File, &[0, 0, 0])?;
    }

    if fs.read(app, data_objects::AID, Namespace::File).is_empty() {
        fs.write_file(app, data_objects::AID, Namespace::File, &full_aid())?;
    }

    Ok(())
}

/// The full 16-byte application identifier stored under DO 4F: AID prefix,
/// version, manufacturer, serial number and two reserved bytes.
fn full_aid() -> [u8; 16] {
    let mut aid = [0u8; 16];
    aid[..6].copy_from_slice(OPENPGP_AID_PREFIX);
    aid[6] = 0x03; // version major
    aid[7] = 0x03; // version minor
    aid[13] = 0x01; // serial number
    aid
}
