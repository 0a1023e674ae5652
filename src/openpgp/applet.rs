//! The OpenPGP applet: command table and APDU exchange.

use log::debug;

use crate::apdu::Frame;
use crate::applet::Applet;
use crate::buffer::ByteBuffer;
use crate::card::Context;
use crate::errors::{CmdResult, Error};
use crate::openpgp::security::Security;
use crate::openpgp::{crypto_ops, user, OPENPGP_AID_PREFIX};

/// The commands the applet understands.
///
/// Every command is a pair of pure operations: `check` validates the header
/// and `process` executes, re-running `check` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GetChallenge,
    InternalAuthenticate,
    GenerateAsymmetricKeyPair,
    PerformSecurityOperation,
    Verify,
    ChangeReferenceData,
    ResetRetryCounter,
    GetData,
    PutData,
}

/// Dispatch order of the command table.
pub const COMMAND_TABLE: &[Command] = &[
    Command::GetChallenge,
    Command::InternalAuthenticate,
    Command::GenerateAsymmetricKeyPair,
    Command::PerformSecurityOperation,
    Command::Verify,
    Command::ChangeReferenceData,
    Command::ResetRetryCounter,
    Command::GetData,
    Command::PutData,
];

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Command::GetChallenge => "GET CHALLENGE",
            Command::InternalAuthenticate => "INTERNAL AUTHENTICATE",
            Command::GenerateAsymmetricKeyPair => "GENERATE ASYMMETRIC KEY PAIR",
            Command::PerformSecurityOperation => "PERFORM SECURITY OPERATION",
            Command::Verify => "VERIFY",
            Command::ChangeReferenceData => "CHANGE REFERENCE DATA",
            Command::ResetRetryCounter => "RESET RETRY COUNTER",
            Command::GetData => "GET DATA",
            Command::PutData => "PUT DATA",
        }
    }

    /// Validate CLA, INS, P1 and P2 for this command.
    ///
    /// `WrongCommand` means the INS belongs to another command; the other
    /// error kinds mean the INS matched but the header is unacceptable.
    pub fn check(self, frame: &Frame) -> Result<(), Error> {
        match self {
            Command::GetChallenge => crypto_ops::check_get_challenge(frame),
            Command::InternalAuthenticate => crypto_ops::check_internal_authenticate(frame),
            Command::GenerateAsymmetricKeyPair => {
                crypto_ops::check_generate_asymmetric_key_pair(frame)
            }
            Command::PerformSecurityOperation => crypto_ops::check_pso(frame),
            Command::Verify => user::check_verify(frame),
            Command::ChangeReferenceData => user::check_change_reference_data(frame),
            Command::ResetRetryCounter => user::check_reset_retry_counter(frame),
            Command::GetData => user::check_get_data(frame),
            Command::PutData => user::check_put_data(frame),
        }
    }

    /// Execute the command.
    pub fn process(
        self,
        ctx: &mut Context,
        security: &mut Security,
        frame: &Frame,
        out: &mut ByteBuffer,
    ) -> CmdResult {
        match self {
            Command::GetChallenge => crypto_ops::process_get_challenge(ctx, security, frame, out),
            Command::InternalAuthenticate => {
                crypto_ops::process_internal_authenticate(ctx, security, frame, out)
            }
            Command::GenerateAsymmetricKeyPair => {
                crypto_ops::process_generate_asymmetric_key_pair(ctx, security, frame, out)
            }
            Command::PerformSecurityOperation => {
                crypto_ops::process_pso(ctx, security, frame, out)
            }
            Command::Verify => user::process_verify(ctx, security, frame, out),
            Command::ChangeReferenceData => {
                user::process_change_reference_data(ctx, security, frame, out)
            }
            Command::ResetRetryCounter => {
                user::process_reset_retry_counter(ctx, security, frame, out)
            }
            Command::GetData => user::process_get_data(ctx, security, frame, out),
            Command::PutData => user::process_put_data(ctx, security, frame, out),
        }
    }
}

/// OpenPGP card applet. Owns the per-session authentication state.
pub struct OpenPgpApplet {
    security: Security,
}

impl OpenPgpApplet {
    pub fn new() -> Self {
        Self {
            security: Security::new(),
        }
    }
}

impl Applet for OpenPgpApplet {
    fn aid(&self) -> &'static [u8] {
        OPENPGP_AID_PREFIX
    }

    fn select(&mut self, _ctx: &mut Context, _out: &mut ByteBuffer) -> Result<(), Error> {
        // Selection drops any session authentication; application data is
        // fetched through GET DATA, no FCI is returned.
        self.security.clear_all();
        Ok(())
    }

    fn deselect(&mut self) {
        self.security.clear_all();
    }

    fn apdu_exchange(&mut self, ctx: &mut Context, apdu: &[u8], out: &mut ByteBuffer) -> CmdResult {
        let frame = Frame::parse(apdu)?;

        // First command whose check passes wins. When no INS matches at all
        // the answer is "INS not supported"; when one matched but rejected
        // the header, that more specific error is kept.
        let mut header_err = Error::WrongApduIns;
        for &command in COMMAND_TABLE {
            match command.check(&frame) {
                Ok(()) => {
                    debug!("dispatching {}", command.name());
                    return command.process(ctx, &mut self.security, &frame, out);
                }
                Err(Error::WrongCommand) => {}
                Err(err) => {
                    if header_err == Error::WrongApduIns {
                        header_err = err;
                    }
                }
            }
        }

        Err(header_err)
    }
}

impl Default for OpenPgpApplet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu::{ins, Frame};

    fn frame(cla: u8, ins: u8, p1: u8, p2: u8) -> Frame<'static> {
        Frame {
            cla,
            ins,
            p1,
            p2,
            data: &[],
            le: 0,
        }
    }

    #[test]
    fn test_table_covers_all_instructions() {
        for (ins_byte, expected) in [
            (ins::GET_CHALLENGE, Command::GetChallenge),
            (ins::VERIFY, Command::Verify),
            (ins::GET_DATA, Command::GetData),
            (ins::PUT_DATA, Command::PutData),
            (ins::PSO, Command::PerformSecurityOperation),
        ] {
            let matched = COMMAND_TABLE
                .iter()
                .find(|c| !matches!(c.check(&frame(0x00, ins_byte, 0x00, 0x81)), Err(Error::WrongCommand)));
            assert_eq!(matched.copied(), Some(expected), "ins {:#04x}", ins_byte);
        }
    }

    #[test]
    fn test_verify_check_rejects_bad_p2() {
        assert_eq!(
            Command::Verify.check(&frame(0x00, ins::VERIFY, 0x00, 0x80)),
            Err(Error::WrongApduP1P2)
        );
    }

    #[test]
    fn test_verify_check_accepts_secure_messaging_cla() {
        assert!(Command::Verify.check(&frame(0x0C, ins::VERIFY, 0x00, 0x81)).is_ok());
    }

    #[test]
    fn test_pso_check_rejects_secure_messaging_cla() {
        assert_eq!(
            Command::PerformSecurityOperation.check(&frame(0x0C, ins::PSO, 0x9E, 0x9A)),
            Err(Error::WrongApduCla)
        );
    }

    #[test]
    fn test_put_data_odd_needs_3fff() {
        assert_eq!(
            Command::PutData.check(&frame(0x00, ins::PUT_DATA_ODD, 0x00, 0x01)),
            Err(Error::WrongCommand)
        );
        assert!(Command::PutData
            .check(&frame(0x10, ins::PUT_DATA_ODD, 0x3F, 0xFF))
            .is_ok());
    }
}
