//! Memory layout of Mifare Classic cards.
//!
//! Sectors 0 to 31 hold 4 blocks each; sectors 32 to 39 (4K cards only) hold 16 blocks each.
//! The last block of every sector is its trailer, carrying the keys and access bits.

use std::ops::RangeInclusive;

const SMALL_SECTORS: u8 = 32;
const SMALL_SECTOR_BLOCKS: u8 = 4;
const LARGE_SECTOR_BLOCKS: u8 = 16;

/// Capacity variants of the Mifare Classic family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum CardSize {
    /// 320 bytes in 5 sectors.
    Mini,

    /// 1024 bytes in 16 sectors.
    #[default]
    Classic1K,

    /// 4096 bytes in 40 sectors.
    Classic4K,
}

impl CardSize {
    pub const fn sector_count(self) -> u8 {
        match self {
            Self::Mini => 5,
            Self::Classic1K => 16,
            Self::Classic4K => 40,
        }
    }

    /// Guesses the capacity from the SAK byte sent during anticollision.
    pub fn from_sak(sak: u8) -> Option<Self> {
        match sak {
            0x09 => Some(Self::Mini),
            0x08 | 0x28 | 0x88 => Some(Self::Classic1K),
            0x18 | 0x38 => Some(Self::Classic4K),
            _ => None,
        }
    }
}

/// Number of blocks in the sector.
pub const fn blocks_in_sector(sector: u8) -> u8 {
    match sector < SMALL_SECTORS {
        true => SMALL_SECTOR_BLOCKS,
        _ => LARGE_SECTOR_BLOCKS,
    }
}

/// Absolute index of the first block in the sector.
pub const fn first_block(sector: u8) -> u8 {
    match sector < SMALL_SECTORS {
        true => sector * SMALL_SECTOR_BLOCKS,
        _ => SMALL_SECTORS * SMALL_SECTOR_BLOCKS + (sector - SMALL_SECTORS) * LARGE_SECTOR_BLOCKS,
    }
}

/// Absolute indices of every block in the sector, in ascending order.
pub fn sector_blocks(sector: u8) -> RangeInclusive<u8> {
    let first = first_block(sector);

    // Inclusive so the last block of sector 39 does not overflow.
    first..=first + (blocks_in_sector(sector) - 1)
}

/// Human readable card type for the SAK byte.
pub fn describe_sak(sak: u8) -> &'static str {
    match sak {
        0x00 => "MIFARE Ultralight",
        0x08 => "MIFARE Classic 1K",
        0x09 => "MIFARE Mini",
        0x10 => "MIFARE Plus 2K",
        0x11 => "MIFARE Plus 4K",
        0x18 => "MIFARE Classic 4K",
        0x20 => "ISO/IEC 14443-4",
        0x28 => "SmartMX with MIFARE Classic 1K",
        0x38 => "SmartMX with MIFARE Classic 4K",
        0x88 => "Infineon MIFARE Classic 1K",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_sectors() {
        assert_eq!(0..=3, sector_blocks(0));
        assert_eq!(4..=7, sector_blocks(1));
        assert_eq!(124..=127, sector_blocks(31));
    }

    #[test]
    fn test_large_sectors() {
        assert_eq!(128..=143, sector_blocks(32));
        assert_eq!(240..=255, sector_blocks(39));
        assert_eq!(240, first_block(39));
        assert_eq!(16, blocks_in_sector(39));
    }

    #[test]
    fn test_card_size() {
        assert_eq!(16, CardSize::default().sector_count());
        assert_eq!(Some(CardSize::Classic4K), CardSize::from_sak(0x18));
        assert_eq!(Some(CardSize::Mini), CardSize::from_sak(0x09));
        assert_eq!(None, CardSize::from_sak(0x20));
    }

    #[test]
    fn test_describe_sak() {
        assert_eq!("MIFARE Classic 1K", describe_sak(0x08));
        assert_eq!("Unknown", describe_sak(0x42));
    }
}
