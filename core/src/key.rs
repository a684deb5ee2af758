//! Keys and block contents as entered by the user.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Length of a Mifare Classic key.
pub const KEY_LEN: usize = 6;

/// Length of a Mifare Classic block.
pub const BLOCK_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KeyError {
    #[error("Key must be hexadecimal: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// A 6-byte sector key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    /// The transport key every factory-fresh sector accepts.
    pub const DEFAULT: Self = Self([0xFF; KEY_LEN]);

    pub const fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parses a key typed by the user.
    ///
    /// Digits are read in pairs; a trailing single digit becomes its own byte.
    /// Keys shorter than 6 bytes are filled up with zeros, longer ones are cut.
    /// An empty input selects [`Key::DEFAULT`].
    pub fn from_hex(input: &str) -> Result<Self, KeyError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Self::DEFAULT);
        }

        let split = input.len() - input.len() % 2;
        if !input.is_char_boundary(split) {
            return Err(hex::FromHexError::OddLength.into());
        }

        let (pairs, rest) = input.split_at(split);
        let mut bytes = hex::decode(pairs)?;
        if let Some(c) = rest.chars().next() {
            let nibble = c
                .to_digit(16)
                .ok_or(hex::FromHexError::InvalidHexCharacter { c, index: split })?;

            bytes.push(nibble as u8);
        }

        let mut key = [0u8; KEY_LEN];
        let len = bytes.len().min(KEY_LEN);
        key[..len].copy_from_slice(&bytes[..len]);

        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl Default for Key {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FromStr for Key {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

/// The contents of exactly one block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockData([u8; BLOCK_LEN]);

impl BlockData {
    /// Fits arbitrary bytes into a block: longer input is cut, shorter input is zero-padded.
    pub fn pad_or_trim(data: &[u8]) -> Self {
        let mut block = [0u8; BLOCK_LEN];
        let len = data.len().min(BLOCK_LEN);
        block[..len].copy_from_slice(&data[..len]);

        Self(block)
    }

    /// Fits the UTF-8 encoding of `text` into a block.
    pub fn from_text(text: &str) -> Self {
        Self::pad_or_trim(text.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; BLOCK_LEN] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_or_trim() {
        assert_eq!(&[0u8; 16], BlockData::pad_or_trim(&[]).as_bytes());

        let short = BlockData::pad_or_trim(b"hello");
        assert_eq!(b"hello", &short.as_bytes()[..5]);
        assert_eq!(&[0u8; 11], &short.as_bytes()[5..]);

        let long = BlockData::pad_or_trim(b"0123456789abcdefXYZ");
        assert_eq!(b"0123456789abcdef", long.as_bytes());

        let exact = *b"fedcba9876543210";
        assert_eq!(&exact, BlockData::pad_or_trim(&exact).as_bytes());
    }

    #[test]
    fn test_from_text_cuts_multibyte_text() {
        // 9 two-byte characters, 18 bytes in total
        let block = BlockData::from_text("ааааааааа");

        assert_eq!(&"ааааааааа".as_bytes()[..16], block.as_bytes());
    }

    #[test]
    fn test_key_default() {
        assert_eq!(Key::DEFAULT, Key::from_hex("").unwrap());
        assert_eq!(Key::DEFAULT, Key::from_hex("   ").unwrap());
        assert_eq!([0xFF; 6], *Key::default().as_bytes());
    }

    #[test]
    fn test_key_from_hex() {
        assert_eq!(
            Key::new([0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]),
            "a0a1a2a3a4a5".parse::<Key>().unwrap(),
        );
        assert_eq!(
            Key::new([0xD3, 0xF7, 0x00, 0x00, 0x00, 0x00]),
            Key::from_hex("D3F7").unwrap(),
        );
        assert_eq!(
            Key::new([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]),
            Key::from_hex("0102030405060708").unwrap(),
        );
        assert_eq!(
            Key::new([0xAB, 0x0C, 0x00, 0x00, 0x00, 0x00]),
            Key::from_hex("ABC").unwrap(),
        );
    }

    #[test]
    fn test_key_from_invalid_hex() {
        assert!(matches!(
            Key::from_hex("ZZ"),
            Err(KeyError::InvalidHex(
                hex::FromHexError::InvalidHexCharacter { c: 'Z', .. }
            ))
        ));
        assert!(Key::from_hex("FFFFFFFFFFFG").is_err());
        assert!(Key::from_hex("FFF+").is_err());
    }

    #[test]
    fn test_key_display() {
        assert_eq!("FFFFFFFFFFFF", Key::DEFAULT.to_string());
    }
}
