//! Error kinds shared across the card core.
//!
//! Commands report failures through a closed set of error kinds; the
//! executor maps each kind to an ISO 7816-4 status word at the very end of
//! processing. Handlers that stamp a non-standard status word themselves
//! (e.g. the `63Cn` retry encoding of VERIFY) signal this with
//! [`Reply::Stamped`] so the executor leaves the response buffer alone.

use thiserror::Error;

use crate::apdu::status::SW;

/// Error kinds produced by the executor, the applets and the commands.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("APDU shorter than a command header")]
    WrongApduStructure,

    #[error("APDU length inconsistent with LC")]
    WrongApduLength,

    #[error("CLA not supported")]
    WrongApduCla,

    #[error("INS not supported")]
    WrongApduIns,

    #[error("incorrect P1/P2 parameters")]
    WrongApduP1P2,

    #[error("incorrect command data length")]
    WrongApduDataLength,

    #[error("command does not apply")]
    WrongCommand,

    #[error("applet not found")]
    AppletNotFound,

    #[error("referenced data not found")]
    DataNotFound,

    #[error("security status not satisfied")]
    AccessDenied,

    #[error("wrong password")]
    WrongPassword,

    #[error("password locked")]
    PasswordLocked,

    #[error("cryptographic operation failed")]
    CryptoOperationError,

    #[error("internal error")]
    InternalError,
}

impl Error {
    /// Status word transmitted for this error kind.
    pub fn status_word(self) -> u16 {
        match self {
            Error::WrongApduStructure
            | Error::WrongApduLength
            | Error::WrongApduDataLength => SW::WRONG_LENGTH,
            Error::WrongApduCla => SW::CLA_NOT_SUPPORTED,
            Error::WrongApduIns | Error::WrongCommand => SW::INS_NOT_SUPPORTED,
            Error::WrongApduP1P2 => SW::INCORRECT_P1_P2,
            Error::AppletNotFound => SW::FILE_NOT_FOUND,
            Error::DataNotFound => SW::REFERENCED_DATA_NOT_FOUND,
            Error::AccessDenied | Error::WrongPassword => SW::SECURITY_STATUS_NOT_SATISFIED,
            Error::PasswordLocked => SW::AUTH_METHOD_BLOCKED,
            Error::CryptoOperationError | Error::InternalError => SW::UNKNOWN_ERROR,
        }
    }
}

/// Successful command outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// The handler produced response data (possibly none); the executor
    /// appends `9000`.
    Ok,
    /// The handler already stamped a complete status word into the response
    /// buffer; the executor must not touch it.
    Stamped,
}

/// Result type returned by command processing and `apdu_exchange`.
pub type CmdResult = Result<Reply, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_errors_share_status() {
        assert_eq!(Error::WrongApduStructure.status_word(), 0x6700);
        assert_eq!(Error::WrongApduLength.status_word(), 0x6700);
        assert_eq!(Error::WrongApduDataLength.status_word(), 0x6700);
    }

    #[test]
    fn test_password_errors() {
        assert_eq!(Error::WrongPassword.status_word(), 0x6982);
        assert_eq!(Error::AccessDenied.status_word(), 0x6982);
        assert_eq!(Error::PasswordLocked.status_word(), 0x6983);
    }

    #[test]
    fn test_dispatch_errors() {
        assert_eq!(Error::AppletNotFound.status_word(), 0x6A82);
        assert_eq!(Error::WrongApduCla.status_word(), 0x6E00);
        assert_eq!(Error::WrongApduIns.status_word(), 0x6D00);
        assert_eq!(Error::WrongApduP1P2.status_word(), 0x6A86);
        assert_eq!(Error::DataNotFound.status_word(), 0x6A88);
    }
}
