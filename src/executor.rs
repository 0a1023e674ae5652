//! Top-level APDU executor.
//!
//! Parses the raw frame, routes SELECT to the applet storage, forwards
//! everything else to the selected applet and finishes the response with
//! the status word derived from the outcome.

use log::debug;

use crate::apdu::status::SW;
use crate::apdu::{cla, ins, Frame};
use crate::applet::AppletStorage;
use crate::buffer::ByteBuffer;
use crate::card::Context;
use crate::errors::{CmdResult, Error, Reply};

pub struct ApduExecutor {
    applets: AppletStorage,
}

impl ApduExecutor {
    pub fn new(applets: AppletStorage) -> Self {
        Self { applets }
    }

    /// Drop the applet selection and its session state (power cycle).
    pub fn reset(&mut self) {
        self.applets.reset();
    }

    /// Process one APDU. The response, terminated by a status word, is left
    /// in `out`; the returned error mirrors what the status word encodes.
    pub fn execute(
        &mut self,
        ctx: &mut Context,
        apdu: &[u8],
        out: &mut ByteBuffer,
    ) -> Result<(), Error> {
        out.clear();

        let frame = match Frame::parse(apdu) {
            Ok(frame) => frame,
            Err(err) => {
                out.stamp_sw(SW::WRONG_LENGTH);
                return Err(err);
            }
        };

        if frame.ins == ins::SELECT {
            if frame.cla != cla::PLAIN {
                out.stamp_sw(SW::CLA_NOT_SUPPORTED);
                return Err(Error::WrongApduCla);
            }
            if frame.p1 != 0x04 || frame.p2 != 0x00 {
                out.stamp_sw(SW::INCORRECT_P1_P2);
                return Err(Error::WrongApduP1P2);
            }

            let result = self
                .applets
                .select_applet(ctx, frame.data, out)
                .map(|()| Reply::Ok);
            return Self::set_result(out, result);
        }

        match self.applets.selected_applet() {
            Some(applet) => {
                let result = applet.apdu_exchange(ctx, apdu, out);
                debug!("apdu exchange result: {:?}", result);
                Self::set_result(out, result)
            }
            None => {
                debug!("no applet selected");
                out.stamp_sw(SW::CONDITIONS_NOT_SATISFIED);
                Ok(())
            }
        }
    }

    /// Finish the response according to the command outcome: append `9000`
    /// to handler data on success, keep a handler-stamped status untouched,
    /// or replace everything with the mapped status word.
    fn set_result(out: &mut ByteBuffer, result: CmdResult) -> Result<(), Error> {
        match result {
            Ok(Reply::Ok) => {
                if out.append_sw(SW::SUCCESS).is_err() {
                    out.stamp_sw(SW::UNKNOWN_ERROR);
                    return Err(Error::InternalError);
                }
                Ok(())
            }
            Ok(Reply::Stamped) => Ok(()),
            Err(err) => {
                out.stamp_sw(err.status_word());
                Err(err)
            }
        }
    }
}
