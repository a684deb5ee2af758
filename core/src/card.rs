use std::marker::PhantomData;

use crate::apdu::{self, Command, InvalidArgument, Response, Status};
use crate::key::{Key, BLOCK_LEN};
use crate::nfc::{CloseError, LinkError, TransceiveError, Transceiver};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication failed ({0})")]
    Rejected(Status),

    #[error("Invalid authentication key: {0}")]
    InvalidArgument(#[from] InvalidArgument),

    #[error("Error occurred while authenticating: {0}")]
    Transport(#[from] TransceiveError),
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("Read failed ({0})")]
    Rejected(Status),

    #[error("Read failed: expected 16 bytes, got {actual}")]
    Truncated { actual: usize },

    #[error("Error occurred while reading: {0}")]
    Transport(#[from] TransceiveError),
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Write failed ({0})")]
    Rejected(Status),

    #[error("{0}")]
    InvalidArgument(#[from] InvalidArgument),

    #[error("Error occurred while writing: {0}")]
    Transport(#[from] TransceiveError),
}

#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    #[error("Application not selected ({0})")]
    Rejected(Status),

    #[error("{0}")]
    InvalidArgument(#[from] InvalidArgument),

    #[error("Error occurred while selecting: {0}")]
    Transport(#[from] TransceiveError),
}

/// An adapter to communicate with the tag through the delegate
pub struct Card<T, Ctx = ()>
where
    T: Transceiver<Ctx>,
    Ctx: Copy,
{
    delegate: T,
    _ctx: PhantomData<Ctx>,
}

impl<T, Ctx> Card<T, Ctx>
where
    T: Transceiver<Ctx>,
    Ctx: Copy,
{
    /// Initiates an adapter with the delegate.
    pub fn new(delegate: T) -> Self {
        Self {
            delegate,
            _ctx: PhantomData,
        }
    }

    pub fn delegate(&self) -> &T {
        &self.delegate
    }

    pub fn is_connected(&self, ctx: Ctx) -> bool {
        self.delegate.is_connected(ctx)
    }

    pub fn connect(&mut self, ctx: Ctx) -> Result<(), LinkError> {
        self.delegate.connect(ctx)
    }

    pub fn close(&mut self, ctx: Ctx) -> Result<(), CloseError> {
        self.delegate.close(ctx)
    }

    /// Authenticates the sector holding `block` with key A.
    /// Exactly one attempt is made.
    pub fn authenticate(&mut self, ctx: Ctx, block: u8, key: &Key) -> Result<(), AuthError> {
        let command = apdu::authenticate_key_a(block, key.as_bytes())?;

        self.handle(ctx, command)?
            .into_result()
            .map(|_| ())
            .map_err(AuthError::Rejected)
    }

    /// Reads one block from an authenticated sector.
    pub fn read_block(&mut self, ctx: Ctx, block: u8) -> Result<[u8; BLOCK_LEN], ReadError> {
        let payload = self
            .handle(ctx, apdu::read_binary(block))?
            .into_result()
            .map_err(ReadError::Rejected)?;

        payload
            .get(..BLOCK_LEN)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(ReadError::Truncated {
                actual: payload.len(),
            })
    }

    /// Overwrites one block of an authenticated sector.
    /// `data` must already be padded to exactly 16 bytes; nothing is sent otherwise.
    pub fn write_block(&mut self, ctx: Ctx, block: u8, data: &[u8]) -> Result<(), WriteError> {
        let command = apdu::update_binary(block, data)?;

        self.handle(ctx, command)?
            .into_result()
            .map(|_| ())
            .map_err(WriteError::Rejected)
    }

    /// Selects an application by its identifier, returning the response payload.
    pub fn select_application(&mut self, ctx: Ctx, aid: &[u8]) -> Result<Vec<u8>, SelectError> {
        let command = apdu::select_application(aid)?;

        self.handle(ctx, command)?
            .into_result()
            .map_err(SelectError::Rejected)
    }

    fn handle(&mut self, ctx: Ctx, command: Command) -> Result<Response, TransceiveError> {
        let tx = Vec::from(command);
        debug!("TX: {}", hex::encode(&tx));

        let rx = self.delegate.transceive(ctx, &tx)?;
        debug!("RX: {}", hex::encode(&rx));

        Ok(Response::from_bytes(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nfc::mock::MockTransceiver;

    fn card(responses: Vec<Vec<u8>>) -> Card<MockTransceiver> {
        Card::new(MockTransceiver::scripted(responses))
    }

    #[test]
    fn test_authenticate() {
        let mut card = card(vec![vec![0x00]]);

        assert!(card.authenticate((), 4, &Key::DEFAULT).is_ok());
        assert_eq!(
            vec![vec![0x00, 0x82, 0x00, 0x04, 0x06, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]],
            card.delegate().sent,
        );
    }

    #[test]
    fn test_authenticate_rejected() {
        let mut card = card(vec![vec![0x01], vec![]]);

        assert!(matches!(
            card.authenticate((), 4, &Key::DEFAULT),
            Err(AuthError::Rejected(Status(Some(0x01))))
        ));
        assert!(matches!(
            card.authenticate((), 4, &Key::DEFAULT),
            Err(AuthError::Rejected(Status(None)))
        ));
    }

    #[test]
    fn test_authenticate_transport_failure() {
        let mut card = card(vec![]);

        assert!(matches!(
            card.authenticate((), 4, &Key::DEFAULT),
            Err(AuthError::Transport(_))
        ));
    }

    #[test]
    fn test_write_block() {
        let mut card = card(vec![vec![0x00]]);

        assert!(card.write_block((), 4, &[0x41; 16]).is_ok());
        assert_eq!(0xD6, card.delegate().sent[0][1]);
        assert_eq!(&[0x41; 16], &card.delegate().sent[0][5..]);
    }

    #[test]
    fn test_write_block_checks_length_before_io() {
        let mut card = card(vec![vec![0x00]]);

        assert!(matches!(
            card.write_block((), 4, &[0x41; 15]),
            Err(WriteError::InvalidArgument(_))
        ));
        assert!(card.delegate().sent.is_empty());
    }

    #[test]
    fn test_write_block_rejected() {
        let mut card = card(vec![vec![0x6A, 0x82]]);

        assert!(matches!(
            card.write_block((), 4, &[0x00; 16]),
            Err(WriteError::Rejected(Status(Some(0x6A))))
        ));
    }

    #[test]
    fn test_read_block() {
        let mut response = vec![0x00];
        response.extend(0u8..16);
        response.push(0xEE);
        let mut card = card(vec![response]);

        let block = card.read_block((), 5).unwrap();

        assert_eq!(
            [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
            block
        );
        assert_eq!(vec![vec![0x00, 0xB0, 0x00, 0x05, 0x10]], card.delegate().sent);
    }

    #[test]
    fn test_read_block_truncated() {
        let mut card = card(vec![vec![0x00, 0x01, 0x02]]);

        assert!(matches!(
            card.read_block((), 5),
            Err(ReadError::Truncated { actual: 2 })
        ));
    }

    #[test]
    fn test_read_block_rejected() {
        let mut card = card(vec![vec![]]);

        assert!(matches!(
            card.read_block((), 5),
            Err(ReadError::Rejected(Status(None)))
        ));
    }

    #[test]
    fn test_select_application() {
        let mut card = card(vec![vec![0x00, 0x6F, 0x00]]);

        assert_eq!(
            vec![0x6F, 0x00],
            card.select_application((), &[0xA0, 0x00, 0x00, 0x03, 0x96])
                .unwrap()
        );
        assert!(matches!(
            card.select_application((), &[0x00; 256]),
            Err(SelectError::InvalidArgument(_))
        ));
        assert_eq!(1, card.delegate().sent.len());
    }

    #[test]
    fn test_select_application_with_empty_aid() {
        let mut card = card(vec![vec![0x00]]);

        assert_eq!(Vec::<u8>::new(), card.select_application((), &[]).unwrap());
        assert_eq!(vec![vec![0x00, 0xA4, 0x04, 0x00, 0x00]], card.delegate().sent);
    }
}
