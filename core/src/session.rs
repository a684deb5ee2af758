//! One interaction with one tag: connect, authenticate, read or write, close.
//!
//! Every entry point returns a [`Report`] instead of an error. The link is closed before any of
//! them returns, whatever happened in between; a failure to close is added to the report but
//! never replaces the result of the operation itself.

use std::fmt::{Display, Formatter};
use std::ops::{Deref, DerefMut};

use crate::card::{AuthError, ReadError, WriteError};
use crate::key::{BlockData, Key, KeyError};
use crate::mifare::{self, CardSize};
use crate::nfc::{CloseError, LinkError, Transceiver};
use crate::tech::{self, Flow, Handler, Tag, UnsupportedTag};
use crate::Card;

/// Block written when the caller does not choose one: the first data block of sector 1.
pub const DEFAULT_BLOCK: u8 = 4;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Connection error: {0}")]
    Link(#[from] LinkError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Connecting,
    Authenticated,
    Completed,
    Failed,
}

/// Human readable outcome of an operation, one line per event.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Report {
    lines: Vec<String>,
    ok: bool,
}

impl Report {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            ok: true,
        }
    }

    /// A report consisting of a single failure.
    pub fn failed(line: impl Into<String>) -> Self {
        let mut report = Self::new();
        report.fail(line);
        report
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn fail(&mut self, line: impl Into<String>) {
        self.ok = false;
        self.push(line);
    }

    pub fn append(&mut self, other: Report) {
        self.ok &= other.ok;
        self.lines.extend(other.lines);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Whether the operation as a whole succeeded.
    pub fn is_ok(&self) -> bool {
        self.ok
    }

    fn closed(&mut self, result: Result<(), CloseError>) {
        if let Err(e) = result {
            warn!("Error closing tag: {}", e);
            self.push(format!("Error closing tag: {}", e));
        }
    }
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.lines.join("\n"))
    }
}

/// What to write and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub block: u8,
    pub key: Key,
    pub data: BlockData,
}

impl WriteRequest {
    /// Builds a request for the default block from what the user typed.
    /// An empty key selects the default key; the text is cut or zero-padded to one block.
    pub fn parse(key: &str, data: &str) -> Result<Self, KeyError> {
        Ok(Self {
            key: Key::from_hex(key)?,
            data: BlockData::from_text(data),
            ..Default::default()
        })
    }

    pub fn with_block(mut self, block: u8) -> Self {
        self.block = block;
        self
    }
}

impl Default for WriteRequest {
    fn default() -> Self {
        Self {
            block: DEFAULT_BLOCK,
            key: Key::DEFAULT,
            data: BlockData::default(),
        }
    }
}

/// How to enumerate the sectors of a card.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpRequest {
    pub key: Key,
    pub size: CardSize,
}

/// Closes the card when dropped, unless [`Link::finish`] already did.
struct Link<'a, T, Ctx>
where
    T: Transceiver<Ctx>,
    Ctx: Copy,
{
    card: &'a mut Card<T, Ctx>,
    ctx: Ctx,
    open: bool,
}

impl<'a, T, Ctx> Link<'a, T, Ctx>
where
    T: Transceiver<Ctx>,
    Ctx: Copy,
{
    fn new(card: &'a mut Card<T, Ctx>, ctx: Ctx) -> Self {
        Self {
            card,
            ctx,
            open: true,
        }
    }

    fn ensure_connected(&mut self) -> Result<(), LinkError> {
        if !self.card.is_connected(self.ctx) {
            self.card.connect(self.ctx)?;
        }

        Ok(())
    }

    fn finish(mut self) -> Result<(), CloseError> {
        self.open = false;
        self.card.close(self.ctx)
    }
}

impl<T, Ctx> Deref for Link<'_, T, Ctx>
where
    T: Transceiver<Ctx>,
    Ctx: Copy,
{
    type Target = Card<T, Ctx>;

    fn deref(&self) -> &Self::Target {
        self.card
    }
}

impl<T, Ctx> DerefMut for Link<'_, T, Ctx>
where
    T: Transceiver<Ctx>,
    Ctx: Copy,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.card
    }
}

impl<T, Ctx> Drop for Link<'_, T, Ctx>
where
    T: Transceiver<Ctx>,
    Ctx: Copy,
{
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.card.close(self.ctx) {
                warn!("Error closing tag: {}", e);
            }
        }
    }
}

struct Outcome<R> {
    result: Result<R, Error>,
    closed: Result<(), CloseError>,
}

/// Drives the card through one operation at a time.
pub struct Session<T, Ctx = ()>
where
    T: Transceiver<Ctx>,
    Ctx: Copy,
{
    card: Card<T, Ctx>,
    state: State,
}

impl<T, Ctx> Session<T, Ctx>
where
    T: Transceiver<Ctx>,
    Ctx: Copy,
{
    pub fn new(card: Card<T, Ctx>) -> Self {
        Self {
            card,
            state: State::Idle,
        }
    }

    /// The state the last operation ended in.
    pub fn state(&self) -> State {
        self.state
    }

    pub fn card(&self) -> &Card<T, Ctx> {
        &self.card
    }

    pub fn card_mut(&mut self) -> &mut Card<T, Ctx> {
        &mut self.card
    }

    /// Writes one block of an IsoDep tag, after reporting what the tag supports.
    /// Nothing is sent to tags without IsoDep.
    pub fn write_tag(&mut self, ctx: Ctx, tag: &Tag, request: &WriteRequest) -> Report {
        let (mut report, handler) = detect(Flow::Write, tag);
        if handler.is_ok() {
            report.append(self.write(ctx, request));
        }

        report
    }

    /// Reads whatever the tag allows, after reporting what the tag supports.
    ///
    /// IsoDep and Mifare Classic tags get every sector dumped with `key`; plain NfcA tags only
    /// get their anticollision parameters reported.
    pub fn read_tag(&mut self, ctx: Ctx, tag: &Tag, key: &Key) -> Report {
        let (mut report, handler) = detect(Flow::Read, tag);
        match handler {
            Ok(Handler::IsoDep | Handler::MifareClassic) => {
                let request = DumpRequest {
                    key: *key,
                    size: tag.size().unwrap_or_default(),
                };

                report.append(self.dump(ctx, &request));
            }
            Ok(Handler::NfcA) => report.append(inspect_nfca(tag)),
            Err(_) => {}
        }

        report
    }

    /// Authenticates the sector of `request.block`, then overwrites the block.
    pub fn write(&mut self, ctx: Ctx, request: &WriteRequest) -> Report {
        let outcome = self.run(ctx, |card, state| {
            card.authenticate(ctx, request.block, &request.key)?;
            *state = State::Authenticated;

            card.write_block(ctx, request.block, request.data.as_bytes())?;
            Ok(())
        });

        let mut report = Report::new();
        match outcome.result {
            Ok(()) => {
                info!("Wrote block {}", request.block);
                report.push("Write successful");
            }
            Err(e @ Error::Link(_)) => report.fail(e.to_string()),
            Err(e) => report.fail(format!("Write error: {}", e)),
        }

        report.closed(outcome.closed);
        report
    }

    /// Reads every block of every sector, authenticating each sector with key A.
    ///
    /// A sector that refuses the key, or a block that cannot be read, is noted and skipped.
    /// Only a broken link stops the enumeration.
    pub fn dump(&mut self, ctx: Ctx, request: &DumpRequest) -> Report {
        let mut report = Report::new();
        let outcome = self.run(ctx, |card, state| {
            for sector in 0..request.size.sector_count() {
                match card.authenticate(ctx, mifare::first_block(sector), &request.key) {
                    Ok(()) => *state = State::Authenticated,
                    Err(AuthError::Transport(e)) => return Err(AuthError::Transport(e).into()),
                    Err(e) => {
                        debug!("Sector {}: {}", sector, e);
                        report.push(format!("Sector {} : Authentication Failed", sector));
                        continue;
                    }
                }

                for block in mifare::sector_blocks(sector) {
                    match card.read_block(ctx, block) {
                        Ok(data) => report.push(format!(
                            "Sector {} Block {} : {}",
                            sector,
                            block,
                            hex::encode(data)
                        )),
                        Err(ReadError::Transport(e)) => {
                            return Err(ReadError::Transport(e).into())
                        }
                        Err(e) => {
                            debug!("Block {}: {}", block, e);
                            report.push(format!("Sector {} Block {} : Read Failed", sector, block));
                        }
                    }
                }
            }

            Ok(())
        });

        match outcome.result {
            Ok(()) => {}
            Err(e @ Error::Link(_)) => report.fail(e.to_string()),
            Err(e) => report.fail(format!("Read error: {}", e)),
        }

        report.closed(outcome.closed);
        report
    }

    fn run<R>(
        &mut self,
        ctx: Ctx,
        body: impl FnOnce(&mut Card<T, Ctx>, &mut State) -> Result<R, Error>,
    ) -> Outcome<R> {
        self.state = State::Connecting;

        let mut link = Link::new(&mut self.card, ctx);
        let result = link
            .ensure_connected()
            .map_err(Error::from)
            .and_then(|()| body(&mut link, &mut self.state));

        self.state = match result {
            Ok(_) => State::Completed,
            Err(_) => State::Failed,
        };

        Outcome {
            result,
            closed: link.finish(),
        }
    }
}

/// Reports the technologies of the tag and the handler chosen for them.
pub fn detect(flow: Flow, tag: &Tag) -> (Report, Result<Handler, UnsupportedTag>) {
    let mut report = Report::new();
    report.push(format!("Supported Technologies: {}", tag.technologies()));

    let handler = tech::classify(flow, tag.technologies());
    if let Err(e) = &handler {
        report.fail(e.to_string());
    }

    (report, handler)
}

/// Reports the anticollision parameters of an NfcA tag.
pub fn inspect_nfca(tag: &Tag) -> Report {
    let params = match tag.nfca() {
        Some(params) => params,
        None => return Report::failed("NfcA parameters unavailable"),
    };

    let mut report = Report::new();
    if !tag.id().is_empty() {
        report.push(format!("UID: {}", hex::encode(tag.id())));
    }

    report.push(format!("ATQA: {}", hex::encode(params.atqa)));
    report.push(format!("SAK: {:02x}", params.sak));
    report.push(format!("Type: {}", mifare::describe_sak(params.sak)));
    report
}
