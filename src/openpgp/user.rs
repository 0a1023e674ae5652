//! Password and data-object commands: VERIFY, CHANGE REFERENCE DATA,
//! RESET RETRY COUNTER, GET DATA and PUT DATA.

use log::debug;

use crate::apdu::status::SW;
use crate::apdu::{cla, ins, Frame};
use crate::buffer::ByteBuffer;
use crate::card::Context;
use crate::errors::{CmdResult, Error, Reply};
use crate::fs::{AppletId, Namespace, ObjectId};
use crate::openpgp::data::PwStatusBytes;
use crate::openpgp::security::Security;
use crate::openpgp::{data_objects, Password, PgpConst, SecureFileId};

fn secure_file_id(pw: Password) -> ObjectId {
    match pw {
        Password::Pw3 => SecureFileId::PW3,
        _ => SecureFileId::PW1,
    }
}

fn plain_or_sm(value: u8) -> bool {
    value == cla::PLAIN || value == cla::SECURE_MESSAGING
}

// --- VERIFY -----------------------------------------------------------------

pub fn check_verify(frame: &Frame) -> Result<(), Error> {
    if frame.ins != ins::VERIFY {
        return Err(Error::WrongCommand);
    }
    if !plain_or_sm(frame.cla) {
        return Err(Error::WrongApduCla);
    }
    if (frame.p1 != 0x00 && frame.p1 != 0xFF)
        || (frame.p2 != 0x81 && frame.p2 != 0x82 && frame.p2 != 0x83)
    {
        return Err(Error::WrongApduP1P2);
    }
    Ok(())
}

pub fn process_verify(
    ctx: &mut Context,
    security: &mut Security,
    frame: &Frame,
    out: &mut ByteBuffer,
) -> CmdResult {
    check_verify(frame)?;

    if frame.p1 == 0xFF && !frame.data.is_empty() {
        return Err(Error::WrongApduLength);
    }

    let passwd_id = if frame.p2 == 0x83 {
        Password::Pw3
    } else {
        Password::Pw1
    };

    // P1=FF resets the authentication status.
    if frame.p1 == 0xFF {
        security.clear_auth(passwd_id);
        return Ok(Reply::Ok);
    }

    let mut pwstatus = PwStatusBytes::load(&ctx.fs);

    let mut passwd = ByteBuffer::with_capacity(PgpConst::pw_max_length(passwd_id));
    ctx.fs.read_file(
        AppletId::OPENPGP,
        secure_file_id(passwd_id),
        Namespace::Secure,
        &mut passwd,
    )?;

    // No reference value on file: report the status instead of comparing.
    if passwd.is_empty() {
        if security.get_auth(passwd_id) {
            return Ok(Reply::Ok);
        }
        out.append_sw(SW::counter_warning(pwstatus.tries_remaining(passwd_id)))?;
        return Ok(Reply::Stamped);
    }

    if frame.data.len() < PgpConst::pw_min_length(passwd_id) {
        return Err(Error::InternalError);
    }

    if pwstatus.tries_remaining(passwd_id) == 0 {
        return Err(Error::PasswordLocked);
    }

    if frame.data != passwd.as_slice() {
        pwstatus.dec_error_counter(passwd_id);
        pwstatus.save(&mut ctx.fs)?;
        debug!(
            "wrong password, {} tries left",
            pwstatus.tries_remaining(passwd_id)
        );
        return Err(Error::WrongPassword);
    }

    security.set_auth(passwd_id);
    pwstatus.set_tries_remaining(passwd_id, PgpConst::DEFAULT_PW_RESET_COUNTER);
    pwstatus.save(&mut ctx.fs)?;

    Ok(Reply::Ok)
}

// --- CHANGE REFERENCE DATA --------------------------------------------------

pub fn check_change_reference_data(frame: &Frame) -> Result<(), Error> {
    if frame.ins != ins::CHANGE_REFERENCE_DATA {
        return Err(Error::WrongCommand);
    }
    if !plain_or_sm(frame.cla) {
        return Err(Error::WrongApduCla);
    }
    if frame.p1 != 0x00 || (frame.p2 != 0x81 && frame.p2 != 0x83) {
        return Err(Error::WrongApduP1P2);
    }
    Ok(())
}

pub fn process_change_reference_data(
    ctx: &mut Context,
    _security: &mut Security,
    frame: &Frame,
    _out: &mut ByteBuffer,
) -> CmdResult {
    check_change_reference_data(frame)?;

    let passwd_id = if frame.p2 == 0x83 {
        Password::Pw3
    } else {
        Password::Pw1
    };
    let min_length = PgpConst::pw_min_length(passwd_id);
    let max_length = PgpConst::pw_max_length(passwd_id);

    let mut passwd = ByteBuffer::with_capacity(max_length);
    ctx.fs.read_file(
        AppletId::OPENPGP,
        secure_file_id(passwd_id),
        Namespace::Secure,
        &mut passwd,
    )?;

    let passwd_length = passwd.len();
    if passwd_length < min_length {
        return Err(Error::InternalError);
    }

    // Data is the old value followed by the new one.
    if frame.data.len() < passwd_length + min_length
        || frame.data.len() > passwd_length + max_length
    {
        return Err(Error::WrongApduDataLength);
    }

    if !frame.data.starts_with(passwd.as_slice()) {
        return Err(Error::WrongPassword);
    }

    ctx.fs.write_file(
        AppletId::OPENPGP,
        secure_file_id(passwd_id),
        Namespace::Secure,
        &frame.data[passwd_length..],
    )?;

    let mut pwstatus = PwStatusBytes::load(&ctx.fs);
    pwstatus.set_tries_remaining(passwd_id, PgpConst::DEFAULT_PW_RESET_COUNTER);
    pwstatus.save(&mut ctx.fs)?;

    Ok(Reply::Ok)
}

// --- RESET RETRY COUNTER ----------------------------------------------------

pub fn check_reset_retry_counter(frame: &Frame) -> Result<(), Error> {
    if frame.ins != ins::RESET_RETRY_COUNTER {
        return Err(Error::WrongCommand);
    }
    if !plain_or_sm(frame.cla) {
        return Err(Error::WrongApduCla);
    }
    if (frame.p1 != 0x00 && frame.p1 != 0x02) || frame.p2 != 0x81 {
        return Err(Error::WrongApduP1P2);
    }
    Ok(())
}

pub fn process_reset_retry_counter(
    ctx: &mut Context,
    security: &mut Security,
    frame: &Frame,
    _out: &mut ByteBuffer,
) -> CmdResult {
    check_reset_retry_counter(frame)?;

    let min_length = PgpConst::PW1_MIN_LENGTH;
    let max_length = PgpConst::PW_MAX_LENGTH;

    let mut new_passwd = ByteBuffer::with_capacity(PgpConst::PW_MAX_LENGTH);

    // P1=0x02: after correct verification of PW3; P1=0x00: resetting code
    // prefixed to the data.
    if frame.p1 == 0x02 {
        if frame.data.len() < min_length || frame.data.len() > max_length {
            return Err(Error::WrongApduDataLength);
        }
        if !security.get_auth(Password::Pw3) {
            return Err(Error::AccessDenied);
        }
        new_passwd.append(frame.data)?;
    } else {
        let mut rc = ByteBuffer::with_capacity(PgpConst::RC_MAX_LENGTH);
        ctx.fs.read_file(
            AppletId::OPENPGP,
            data_objects::RESET_CODE,
            Namespace::File,
            &mut rc,
        )?;
        if rc.is_empty() {
            return Err(Error::DataNotFound);
        }

        let rc_length = rc.len();
        if frame.data.len() < rc_length + min_length
            || frame.data.len() > rc_length + max_length
        {
            return Err(Error::WrongApduDataLength);
        }

        if !frame.data.starts_with(rc.as_slice()) {
            return Err(Error::WrongPassword);
        }
        new_passwd.append(&frame.data[rc_length..])?;
    }

    ctx.fs.write_file(
        AppletId::OPENPGP,
        SecureFileId::PW1,
        Namespace::Secure,
        new_passwd.as_slice(),
    )?;

    let mut pwstatus = PwStatusBytes::load(&ctx.fs);
    pwstatus.set_tries_remaining(Password::Pw1, PgpConst::DEFAULT_PW_RESET_COUNTER);
    pwstatus.save(&mut ctx.fs)?;

    Ok(Reply::Ok)
}

// --- GET DATA ---------------------------------------------------------------

pub fn check_get_data(frame: &Frame) -> Result<(), Error> {
    if frame.ins != ins::GET_DATA && frame.ins != ins::GET_DATA_ODD {
        return Err(Error::WrongCommand);
    }
    if !plain_or_sm(frame.cla) {
        return Err(Error::WrongApduCla);
    }
    Ok(())
}

pub fn process_get_data(
    ctx: &mut Context,
    security: &mut Security,
    frame: &Frame,
    out: &mut ByteBuffer,
) -> CmdResult {
    check_get_data(frame)?;

    let object_id = frame.p1p2();
    security.data_object_access_check(object_id, false)?;

    debug!("read object id {:#06x}", object_id);
    ctx.fs
        .read_file(AppletId::OPENPGP, object_id, Namespace::File, out)?;

    Ok(Reply::Ok)
}

// --- PUT DATA ---------------------------------------------------------------

pub fn check_put_data(frame: &Frame) -> Result<(), Error> {
    if frame.ins != ins::PUT_DATA && frame.ins != ins::PUT_DATA_ODD {
        return Err(Error::WrongCommand);
    }
    if frame.ins == ins::PUT_DATA_ODD && (frame.p1 != 0x3F || frame.p2 != 0xFF) {
        return Err(Error::WrongCommand);
    }
    if frame.cla != cla::PLAIN && frame.cla != cla::SECURE_MESSAGING && frame.cla != cla::CHAINING {
        return Err(Error::WrongApduCla);
    }
    Ok(())
}

pub fn process_put_data(
    ctx: &mut Context,
    security: &mut Security,
    frame: &Frame,
    _out: &mut ByteBuffer,
) -> CmdResult {
    check_put_data(frame)?;

    if frame.ins == ins::PUT_DATA {
        let object_id = frame.p1p2();
        security.data_object_access_check(object_id, true)?;

        debug!("write object id {:#06x}", object_id);
        ctx.fs
            .write_file(AppletId::OPENPGP, object_id, Namespace::File, frame.data)?;

        // Storing a resetting code arms its retry counter.
        if object_id == data_objects::RESET_CODE {
            let mut pwstatus = PwStatusBytes::load(&ctx.fs);
            let tries = if frame.data.is_empty() {
                0
            } else {
                PgpConst::DEFAULT_PW_RESET_COUNTER
            };
            pwstatus.set_tries_remaining(Password::Rc, tries);
            pwstatus.save(&mut ctx.fs)?;
        }
    } else {
        // Key import via the extended header list.
        if !security.get_auth(Password::Pw3) {
            return Err(Error::AccessDenied);
        }
        let more_pck_follow = frame.cla & cla::CHAINING != 0;
        ctx.crypto
            .keys
            .set_key_ext_header(AppletId::OPENPGP, frame.data, more_pck_follow)?;
    }

    Ok(Reply::Ok)
}
