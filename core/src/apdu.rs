//! APDU frames exchanged with the tag.
//!
//! Commands are composed with the `apdu` crate; responses carry a single leading status byte,
//! which `apdu::Response` does not model, so they are parsed here.

use std::fmt::{Display, Formatter};

use ::apdu::command;
pub use ::apdu::Command;

use crate::key::{BLOCK_LEN, KEY_LEN};

pub const CLA_DEFAULT: u8 = 0x00;

/// The status byte a tag answers with when the command succeeded.
pub const STATUS_OK: u8 = 0x00;

mod ins {
    pub const AUTHENTICATE: u8 = 0x82;
    pub const SELECT: u8 = 0xA4;
    pub const UPDATE_BINARY: u8 = 0xD6;
}

const SELECT_P1_BY_NAME: u8 = 0x04;
const MAX_LC: usize = 0xFF;

/// A caller-supplied buffer violated a length invariant of the frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidArgument {
    #[error("{field} must be {expected} bytes long, got {actual}")]
    Length {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{field} must be at most 255 bytes long, got {actual}")]
    TooLong { field: &'static str, actual: usize },
}

fn expect_len(field: &'static str, bytes: &[u8], expected: usize) -> Result<(), InvalidArgument> {
    match bytes.len() == expected {
        true => Ok(()),
        _ => Err(InvalidArgument::Length {
            field,
            expected,
            actual: bytes.len(),
        }),
    }
}

/// Constructs an `AUTHENTICATE` command with key A for the sector holding `block`.
pub fn authenticate_key_a(block: u8, key: &[u8]) -> Result<Command<'_>, InvalidArgument> {
    expect_len("key", key, KEY_LEN)?;

    Ok(Command::new_with_payload(
        CLA_DEFAULT,
        ins::AUTHENTICATE,
        0x00,
        block,
        key,
    ))
}

/// Constructs an `UPDATE BINARY` command overwriting `block` with `data`.
pub fn update_binary(block: u8, data: &[u8]) -> Result<Command<'_>, InvalidArgument> {
    expect_len("block data", data, BLOCK_LEN)?;

    Ok(Command::new_with_payload(
        CLA_DEFAULT,
        ins::UPDATE_BINARY,
        0x00,
        block,
        data,
    ))
}

/// Constructs a `READ BINARY` command for one whole block.
pub fn read_binary(block: u8) -> Command<'static> {
    command::read_binary(0x00, block, BLOCK_LEN as u8).into()
}

/// Constructs a `SELECT` command by application identifier.
/// An empty identifier is sent with Lc = 0.
pub fn select_application(aid: &[u8]) -> Result<Command<'_>, InvalidArgument> {
    if aid.len() > MAX_LC {
        return Err(InvalidArgument::TooLong {
            field: "application identifier",
            actual: aid.len(),
        });
    }

    Ok(Command::new_with_payload(
        CLA_DEFAULT,
        ins::SELECT,
        SELECT_P1_BY_NAME,
        0x00,
        aid,
    ))
}

/// The status byte of a response, or its absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub Option<u8>);

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(status) => write!(f, "status {:#04X}", status),
            None => write!(f, "empty response"),
        }
    }
}

/// A response that was received from the tag.
/// The first octet is the status, anything after it is payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    bytes: Vec<u8>,
}

impl Response {
    /// Parses a response from the octets.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn status(&self) -> Status {
        Status(self.bytes.first().copied())
    }

    /// Determines whether the response indicates success or not.
    pub fn is_ok(&self) -> bool {
        self.status() == Status(Some(STATUS_OK))
    }

    /// Converts the response to a result of the payload octets.
    pub fn into_result(self) -> Result<Vec<u8>, Status> {
        let status = self.status();

        match self.is_ok() {
            true => Ok(self.bytes[1..].to_vec()),
            _ => Err(status),
        }
    }
}
