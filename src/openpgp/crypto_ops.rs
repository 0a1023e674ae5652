//! Cryptographic commands: GET CHALLENGE, INTERNAL AUTHENTICATE,
//! GENERATE ASYMMETRIC KEY PAIR and PSO.

use log::debug;

use crate::apdu::{cla, ins, pso, Frame};
use crate::buffer::ByteBuffer;
use crate::card::Context;
use crate::crypto::KeyType;
use crate::errors::{CmdResult, Error, Reply};
use crate::fs::{AppletId, ObjectId};
use crate::openpgp::data::{AlgorithmAttributes, AlgorithmId, PwStatusBytes};
use crate::openpgp::security::Security;
use crate::openpgp::{data_objects, Password};

/// DO holding the algorithm attributes for a key slot.
fn attributes_do(key_type: KeyType) -> ObjectId {
    match key_type {
        KeyType::DigitalSignature => data_objects::ALGORITHM_ATTRIBUTES_SIG,
        KeyType::Confidentiality => data_objects::ALGORITHM_ATTRIBUTES_DEC,
        KeyType::Authentication => data_objects::ALGORITHM_ATTRIBUTES_AUT,
    }
}

// --- GET CHALLENGE ----------------------------------------------------------

pub fn check_get_challenge(frame: &Frame) -> Result<(), Error> {
    if frame.ins != ins::GET_CHALLENGE {
        return Err(Error::WrongCommand);
    }
    if frame.cla != cla::PLAIN {
        return Err(Error::WrongApduCla);
    }
    if frame.p1 != 0x00 || frame.p2 != 0x00 {
        return Err(Error::WrongApduP1P2);
    }
    Ok(())
}

pub fn process_get_challenge(
    ctx: &mut Context,
    _security: &mut Security,
    frame: &Frame,
    out: &mut ByteBuffer,
) -> CmdResult {
    check_get_challenge(frame)?;

    if !frame.data.is_empty() {
        return Err(Error::WrongApduDataLength);
    }

    let le = if frame.le == 0 { 0xFF } else { frame.le };
    ctx.crypto.lib.generate_random(le as usize, out)?;

    Ok(Reply::Ok)
}

// --- INTERNAL AUTHENTICATE --------------------------------------------------

pub fn check_internal_authenticate(frame: &Frame) -> Result<(), Error> {
    if frame.ins != ins::INTERNAL_AUTHENTICATE {
        return Err(Error::WrongCommand);
    }
    if frame.cla != cla::PLAIN {
        return Err(Error::WrongApduCla);
    }
    if frame.p1 != 0x00 || frame.p2 != 0x00 {
        return Err(Error::WrongApduP1P2);
    }
    Ok(())
}

pub fn process_internal_authenticate(
    ctx: &mut Context,
    security: &mut Security,
    frame: &Frame,
    out: &mut ByteBuffer,
) -> CmdResult {
    check_internal_authenticate(frame)?;

    if !security.get_auth(Password::Pw1) {
        return Err(Error::AccessDenied);
    }

    let alg = AlgorithmAttributes::load(&ctx.fs, data_objects::ALGORITHM_ATTRIBUTES_AUT);
    if !alg.is_present() {
        return Err(Error::DataNotFound);
    }

    if alg.algorithm_id == AlgorithmId::RSA {
        ctx.crypto
            .rsa_sign(AppletId::OPENPGP, KeyType::Authentication, frame.data, out)?;
    } else {
        ctx.crypto
            .ecdsa_sign(AppletId::OPENPGP, KeyType::Authentication, frame.data, out)?;
    }

    Ok(Reply::Ok)
}

// --- GENERATE ASYMMETRIC KEY PAIR -------------------------------------------

pub fn check_generate_asymmetric_key_pair(frame: &Frame) -> Result<(), Error> {
    if frame.ins != ins::GENERATE_ASYMMETRIC_KEY_PAIR {
        return Err(Error::WrongCommand);
    }
    if frame.cla != cla::PLAIN && frame.cla != cla::SECURE_MESSAGING {
        return Err(Error::WrongApduCla);
    }
    if (frame.p1 != 0x80 && frame.p1 != 0x81) || frame.p2 != 0x00 {
        return Err(Error::WrongApduP1P2);
    }
    Ok(())
}

pub fn process_generate_asymmetric_key_pair(
    ctx: &mut Context,
    security: &mut Security,
    frame: &Frame,
    out: &mut ByteBuffer,
) -> CmdResult {
    check_generate_asymmetric_key_pair(frame)?;

    // Data is the CRT: key-type tag followed by a zero byte.
    if frame.data.len() != 2 || frame.data[1] != 0x00 {
        return Err(Error::WrongApduDataLength);
    }
    let key_type = KeyType::from_tag(frame.data[0]).ok_or(Error::DataNotFound)?;

    let alg = AlgorithmAttributes::load(&ctx.fs, attributes_do(key_type));
    if !alg.is_present() {
        return Err(Error::DataNotFound);
    }

    // P1=0x80 generates a key pair, P1=0x81 reads the public template back.
    if frame.p1 == 0x80 {
        if !security.get_auth(Password::Pw3) {
            return Err(Error::AccessDenied);
        }

        match alg.algorithm_id {
            AlgorithmId::RSA => {
                let key = ctx.crypto.lib.rsa_gen_key(alg.n_len as usize)?;
                ctx.crypto
                    .keys
                    .put_rsa_full_key(AppletId::OPENPGP, key_type, key);
            }
            AlgorithmId::ECDSA => {
                let key = ctx.crypto.lib.ecdsa_gen_key()?;
                ctx.crypto
                    .keys
                    .put_ecdsa_full_key(AppletId::OPENPGP, key_type, key);
            }
            other => {
                debug!("cannot generate key for algorithm id {:#04x}", other);
                return Err(Error::DataNotFound);
            }
        }
    }

    ctx.crypto
        .keys
        .get_public_key_7f49(AppletId::OPENPGP, key_type, out)?;

    Ok(Reply::Ok)
}

// --- PSO --------------------------------------------------------------------

pub fn check_pso(frame: &Frame) -> Result<(), Error> {
    if frame.ins != ins::PSO {
        return Err(Error::WrongCommand);
    }
    if frame.cla != cla::PLAIN {
        return Err(Error::WrongApduCla);
    }
    if !matches!(frame.p1p2(), pso::CDS | pso::DECIPHER | pso::ENCIPHER) {
        return Err(Error::WrongApduP1P2);
    }
    Ok(())
}

pub fn process_pso(
    ctx: &mut Context,
    security: &mut Security,
    frame: &Frame,
    out: &mut ByteBuffer,
) -> CmdResult {
    check_pso(frame)?;

    match frame.p1p2() {
        pso::CDS => pso_compute_digital_signature(ctx, security, frame, out),
        pso::DECIPHER => pso_decipher(ctx, security, frame, out),
        // ENCIPHER is accepted but not implemented.
        _ => Ok(Reply::Ok),
    }
}

fn pso_compute_digital_signature(
    ctx: &mut Context,
    security: &mut Security,
    frame: &Frame,
    out: &mut ByteBuffer,
) -> CmdResult {
    if !security.get_auth(Password::PsoCds) {
        return Err(Error::AccessDenied);
    }

    let alg = AlgorithmAttributes::load(&ctx.fs, data_objects::ALGORITHM_ATTRIBUTES_SIG);
    if !alg.is_present() {
        return Err(Error::DataNotFound);
    }

    let sign_result = if alg.algorithm_id == AlgorithmId::RSA {
        ctx.crypto
            .rsa_sign(AppletId::OPENPGP, KeyType::DigitalSignature, frame.data, out)
    } else {
        ctx.crypto
            .ecdsa_sign(AppletId::OPENPGP, KeyType::DigitalSignature, frame.data, out)
    };

    let pwstatus = PwStatusBytes::load(&ctx.fs);
    if !pwstatus.pw1_valid_several_cds {
        security.clear_auth(Password::PsoCds);
    }

    // The signature counter moves even when signing failed.
    security.inc_ds_counter(&mut ctx.fs)?;

    sign_result?;
    Ok(Reply::Ok)
}

fn pso_decipher(
    ctx: &mut Context,
    security: &mut Security,
    frame: &Frame,
    out: &mut ByteBuffer,
) -> CmdResult {
    if !security.get_auth(Password::Pw1) {
        return Err(Error::AccessDenied);
    }

    let alg = AlgorithmAttributes::load(&ctx.fs, data_objects::ALGORITHM_ATTRIBUTES_DEC);
    if !alg.is_present() {
        return Err(Error::DataNotFound);
    }

    // The first data byte is the padding indicator.
    let Some((&indicator, cryptogram)) = frame.data.split_first() else {
        return Err(Error::WrongApduDataLength);
    };

    match indicator {
        0x00 if alg.algorithm_id == AlgorithmId::RSA => {
            ctx.crypto
                .rsa_decipher(AppletId::OPENPGP, KeyType::Confidentiality, cryptogram, out)?;
        }
        // AES and ECDH cryptograms are recognized but not supported.
        0x02 | 0xA6 => return Err(Error::CryptoOperationError),
        _ => {}
    }

    Ok(Reply::Ok)
}
