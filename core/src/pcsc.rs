//! PC/SC support for nfctag library.
//! Can be enabled by turning `pcsc` feature on.
//!
//! ## What is PC/SC?
//! PC/SC (Personal Computer/Smart Card) is an abstraction layer for communicating with Smart Cards
//! from Windows. Using this layer, applications can connect to any devices that supports PC/SC,
//! without depending on their driver implementation. Windows and macOS supports PC/SC by themselves,
//! Linux also supports by installing pcsc-lite shared library.
//!
//! ## Supported platform
//! Platforms that supports PC/SC are limited because they are subjected to use devices on PCs.
//! Linux, Windows and macOS are supported by pcsc-rust, backend of this implementation.
//! Refer the documentation of pcsc-rust for details:
//! <https://github.com/bluetech/pcsc-rust>
//!
//! ## Usage
//! ```rust,no_run
//! use nfctag::pcsc::Context;
//! use nfctag::session::WriteRequest;
//! use nfctag::{Card, Session};
//!
//! let ctx = Context::try_new().unwrap();
//! let device = ctx.open().unwrap();
//! let pcsc_card = device.connect().unwrap();
//! let tag = pcsc_card.tag();
//!
//! let mut session = Session::new(Card::new(pcsc_card));
//! let request = WriteRequest::parse("", "hello").unwrap();
//! println!("{}", session.write_tag((), &tag, &request));
//! ```

use std::ffi::{CStr, CString};
use std::thread::sleep;
use std::time::Duration;

use pcsc::{Attribute, Card, Disposition, Protocols, Scope, ShareMode, MAX_BUFFER_SIZE};

use crate::mifare::CardSize;
use crate::nfc::{CloseError, LinkError, TransceiveError, Transceiver};
use crate::tech::{Tag, TechList, Technology};

/// Registered application provider identifier of the PC/SC workgroup,
/// found in the ATR of storage cards (PC/SC part 3, section 3.1.3.2.3).
const PCSC_RID: [u8; 5] = [0xA0, 0x00, 0x00, 0x03, 0x06];

const STANDARD_ISO14443A_3: u8 = 0x03;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Error occurred while communicating with PC/SC: {0}")]
    PcscError(#[from] pcsc::Error),

    #[error("Reader not found on PC/SC service")]
    ReaderNotFound,
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

/// PC/SC context.
pub struct Context {
    ctx: pcsc::Context,
}

impl Context {
    /// Creates a PC/SC context in user scope.
    pub fn try_new() -> Result<Self> {
        Ok(Self {
            ctx: pcsc::Context::establish(Scope::User).map_err(Error::PcscError)?,
        })
    }

    /// Finds a PC/SC device, then opens a connection to them.
    pub fn open(&self) -> Result<Device> {
        let mut buf = [0u8; 2048];

        let reader = self
            .ctx
            .list_readers(&mut buf)
            .map_err(Error::PcscError)?
            .next()
            .ok_or(Error::ReaderNotFound)?;

        Ok(Device::new(self.ctx.clone(), reader))
    }
}

/// PC/SC device handle.
pub struct Device {
    ctx: pcsc::Context,
    reader: CString,
}

impl Device {
    fn new(ctx: pcsc::Context, reader: &CStr) -> Self {
        debug!("Using device: {}", reader.to_str().unwrap_or_default());

        Self {
            ctx,
            reader: reader.to_owned(),
        }
    }

    /// Connects to the tag placed on the device after waiting them.
    pub fn connect(self) -> Result<PcscCard> {
        // Waits for touching tag, polling for each seconds.
        debug!("Waiting for a tag");

        loop {
            match self.try_connect() {
                Ok(card) => {
                    debug!("Connected to your tag");

                    let atr = card
                        .get_attribute_owned(Attribute::AtrString)
                        .map_err(Error::PcscError)?;

                    return Ok(PcscCard {
                        device: self,
                        card: Some(card),
                        atr,
                    });
                }
                Err(pcsc::Error::NoSmartcard) | Err(pcsc::Error::RemovedCard) => {
                    info!("Still waiting for your tag...");
                    sleep(Duration::from_secs(1));

                    continue;
                }
                Err(e) => return Err(Error::PcscError(e)),
            }
        }
    }

    fn try_connect(&self) -> std::result::Result<Card, pcsc::Error> {
        self.ctx
            .connect(&self.reader, ShareMode::Shared, Protocols::ANY)
    }
}

/// A tag to be communicated through PC/SC.
pub struct PcscCard {
    device: Device,
    card: Option<Card>,
    atr: Vec<u8>,
}

impl PcscCard {
    pub fn atr(&self) -> &[u8] {
        &self.atr
    }

    /// Describes the tag as far as the ATR tells.
    pub fn tag(&self) -> Tag {
        let (technologies, size) = technologies_from_atr(&self.atr);
        let tag = Tag::new(Vec::new(), technologies);

        match size {
            Some(size) => tag.with_size(size),
            None => tag,
        }
    }

    /// Transmits an APDU command to the tag, then receives a response from them.
    pub fn transmit(&self, tx: &[u8]) -> std::result::Result<Vec<u8>, TransceiveError> {
        let card = self
            .card
            .as_ref()
            .ok_or_else(|| TransceiveError::new("not connected"))?;

        let mut rx = [0u8; MAX_BUFFER_SIZE];
        let rx = card.transmit(tx, &mut rx).map_err(TransceiveError::new)?;

        Ok(Vec::from(rx))
    }
}

impl Transceiver for PcscCard {
    fn is_connected(&self, _: ()) -> bool {
        self.card.is_some()
    }

    fn connect(&mut self, _: ()) -> std::result::Result<(), LinkError> {
        if self.card.is_none() {
            self.card = Some(self.device.try_connect().map_err(LinkError::new)?);
        }

        Ok(())
    }

    fn transceive(
        &mut self,
        _: (),
        command: &[u8],
    ) -> std::result::Result<Vec<u8>, TransceiveError> {
        self.transmit(command)
    }

    fn close(&mut self, _: ()) -> std::result::Result<(), CloseError> {
        match self.card.take() {
            Some(card) => card
                .disconnect(Disposition::LeaveCard)
                .map_err(|(_, e)| CloseError::new(e)),
            None => Ok(()),
        }
    }
}

/// Derives what the tag supports from its ATR.
///
/// Storage cards are announced by the PC/SC RID followed by the standard byte and a two byte
/// card name; anything else in a contactless reader speaks ISO 14443-4.
fn technologies_from_atr(atr: &[u8]) -> (TechList, Option<CardSize>) {
    let position = atr
        .windows(PCSC_RID.len())
        .position(|window| window == PCSC_RID);

    let (standard, name) = match position.and_then(|p| atr.get(p + PCSC_RID.len()..)) {
        Some([standard, hi, lo, ..]) => (*standard, [*hi, *lo]),
        _ => {
            return (
                [Technology::IsoDep, Technology::NfcA].into_iter().collect(),
                None,
            )
        }
    };

    let mut technologies = Vec::new();
    if standard == STANDARD_ISO14443A_3 {
        technologies.push(Technology::NfcA);
    }

    let size = match name {
        [0x00, 0x01] => Some(CardSize::Classic1K),
        [0x00, 0x02] => Some(CardSize::Classic4K),
        [0x00, 0x26] => Some(CardSize::Mini),
        _ => None,
    };

    if size.is_some() {
        technologies.push(Technology::MifareClassic);
    } else if name == [0x00, 0x03] {
        technologies.push(Technology::MifareUltralight);
    }

    (technologies.into_iter().collect(), size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mifare_classic_atr() {
        let atr = [
            0x3B, 0x8F, 0x80, 0x01, 0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06, 0x03, 0x00,
            0x01, 0x00, 0x00, 0x00, 0x00, 0x6A,
        ];

        let (technologies, size) = technologies_from_atr(&atr);

        assert_eq!("NfcA, MifareClassic", technologies.to_string());
        assert_eq!(Some(CardSize::Classic1K), size);
    }

    #[test]
    fn test_ultralight_atr() {
        let atr = [
            0x3B, 0x8F, 0x80, 0x01, 0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06, 0x03, 0x00,
            0x03, 0x00, 0x00, 0x00, 0x00, 0x68,
        ];

        let (technologies, size) = technologies_from_atr(&atr);

        assert_eq!("NfcA, MifareUltralight", technologies.to_string());
        assert_eq!(None, size);
    }

    #[test]
    fn test_iso14443_4_atr() {
        let atr = [0x3B, 0x81, 0x80, 0x01, 0x80, 0x80];

        let (technologies, size) = technologies_from_atr(&atr);

        assert_eq!("IsoDep, NfcA", technologies.to_string());
        assert_eq!(None, size);
    }
}
