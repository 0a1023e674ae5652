//! APDU (Application Protocol Data Unit) framing.
//!
//! This module parses ISO 7816-4 short APDUs. The frame layout is
//! `CLA INS P1 P2 LC [data(LC)] [LE]`; a five-byte frame is the case-2 form
//! where the fifth byte is LE and no command data is present.

pub mod status;

use crate::errors::Error;

/// Instruction bytes understood by the card.
pub mod ins {
    pub const SELECT: u8 = 0xA4;
    pub const VERIFY: u8 = 0x20;
    pub const CHANGE_REFERENCE_DATA: u8 = 0x24;
    pub const RESET_RETRY_COUNTER: u8 = 0x2C;
    pub const GET_DATA: u8 = 0xCA;
    pub const GET_DATA_ODD: u8 = 0xCB;
    pub const PUT_DATA: u8 = 0xDA;
    pub const PUT_DATA_ODD: u8 = 0xDB;
    pub const GENERATE_ASYMMETRIC_KEY_PAIR: u8 = 0x47;
    pub const PSO: u8 = 0x2A;
    pub const INTERNAL_AUTHENTICATE: u8 = 0x88;
    pub const GET_CHALLENGE: u8 = 0x84;
}

/// Class byte values.
pub mod cla {
    pub const PLAIN: u8 = 0x00;
    /// Secure messaging indication; recognized but not processed.
    pub const SECURE_MESSAGING: u8 = 0x0C;
    /// Command chaining bit, used by PUT DATA key import.
    pub const CHAINING: u8 = 0x10;
}

/// PSO (Perform Security Operation) P1-P2 values.
pub mod pso {
    /// Compute Digital Signature (P1=0x9E, P2=0x9A)
    pub const CDS: u16 = 0x9E9A;
    /// Decipher (P1=0x80, P2=0x86)
    pub const DECIPHER: u16 = 0x8086;
    /// Encipher (P1=0x86, P2=0x80)
    pub const ENCIPHER: u16 = 0x8680;
}

/// A parsed APDU frame borrowing the command data from the raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    /// Command data, `LC` bytes (possibly empty).
    pub data: &'a [u8],
    /// Expected response length; 0 when the frame carries no LE byte.
    pub le: u8,
}

impl<'a> Frame<'a> {
    /// Parse a raw frame.
    ///
    /// Frames shorter than a header fail with `WrongApduStructure`; frames
    /// whose total length is neither `LC+5` nor `LC+6` fail with
    /// `WrongApduLength`.
    pub fn parse(apdu: &'a [u8]) -> Result<Self, Error> {
        if apdu.len() < 5 {
            return Err(Error::WrongApduStructure);
        }

        // Case 2: bare header plus LE, no command data.
        if apdu.len() == 5 {
            return Ok(Self {
                cla: apdu[0],
                ins: apdu[1],
                p1: apdu[2],
                p2: apdu[3],
                data: &[],
                le: apdu[4],
            });
        }

        let lc = apdu[4] as usize;
        if apdu.len() != lc + 5 && apdu.len() != lc + 6 {
            return Err(Error::WrongApduLength);
        }

        Ok(Self {
            cla: apdu[0],
            ins: apdu[1],
            p1: apdu[2],
            p2: apdu[3],
            data: &apdu[5..5 + lc],
            le: if apdu.len() == lc + 6 { apdu[5 + lc] } else { 0 },
        })
    }

    /// P1 and P2 combined big-endian, as used for data-object ids and the
    /// PSO operation selector.
    pub fn p1p2(&self) -> u16 {
        u16::from_be_bytes([self.p1, self.p2])
    }
}
