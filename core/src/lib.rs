//! A crate to authenticate, read and write Mifare Classic blocks through an APDU transceiver.
//!
//! The caller supplies a [`nfc::Transceiver`] connected to exactly one tag; everything above
//! it (framing, status checks, sector enumeration, closing the link) lives here.

#[macro_use]
mod trace;

#[cfg(feature = "pcsc")]
pub mod pcsc;

pub mod apdu;
pub mod card;
pub mod key;
pub mod mifare;
pub mod nfc;
pub mod session;
pub mod tech;

pub use card::Card;
pub use key::{BlockData, Key};
pub use session::{Report, Session};
pub use tech::{Tag, Technology};
