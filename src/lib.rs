//! OpenPGP card application core.
//!
//! Implements the OpenPGP smart card application (spec v3.3.1) over an
//! ISO/IEC 7816-4 short-APDU interface: framing and dispatch, the command
//! catalogue (VERIFY, CHANGE REFERENCE DATA, RESET RETRY COUNTER, GET/PUT
//! DATA, GENERATE ASYMMETRIC KEY PAIR, PSO, INTERNAL AUTHENTICATE,
//! GET CHALLENGE), the session security state with its retry counters, and
//! a persistent data-object store.
//!
//! The crate is transport-agnostic: a host feeds raw APDU bytes into
//! [`Card::execute`] and sends the filled response buffer back, whatever
//! the carrier (CCID, TCP, a test harness).
//!
//! # Example
//! ```no_run
//! use pgtoken::{ByteBuffer, Card};
//!
//! let mut card = Card::new(None);
//! let mut response = ByteBuffer::response();
//!
//! // SELECT the OpenPGP applet.
//! let select = [0x00, 0xA4, 0x04, 0x00, 0x06, 0xD2, 0x76, 0x00, 0x01, 0x24, 0x01];
//! card.execute(&select, &mut response).unwrap();
//! assert_eq!(response.as_slice(), &[0x90, 0x00]);
//! ```

pub mod apdu;
pub mod applet;
pub mod buffer;
pub mod card;
pub mod crypto;
pub mod errors;
pub mod executor;
pub mod fs;
pub mod openpgp;
pub mod tlv;

pub use buffer::ByteBuffer;
pub use card::{Card, Context};
pub use errors::{CmdResult, Error, Reply};
