//! Communicating with the tag using NFC technology

/// The underlying failure reported by a link implementation.
pub type Cause = Box<dyn std::error::Error + Send + Sync>;

/// The link to the tag could not be established.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct LinkError(#[source] pub Cause);

impl LinkError {
    pub fn new(cause: impl Into<Cause>) -> Self {
        Self(cause.into())
    }
}

/// The link failed while a command was in flight.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TransceiveError(#[source] pub Cause);

impl TransceiveError {
    pub fn new(cause: impl Into<Cause>) -> Self {
        Self(cause.into())
    }
}

/// The link could not be released cleanly.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct CloseError(#[source] pub Cause);

impl CloseError {
    pub fn new(cause: impl Into<Cause>) -> Self {
        Self(cause.into())
    }
}

/// A half-duplex link to a single tag.
///
/// `Ctx` is handed through on every call for bindings that need a call-scoped environment,
/// such as a JNI env. Plain implementations use `()`.
pub trait Transceiver<Ctx = ()> {
    /// Whether the link is currently open.
    fn is_connected(&self, ctx: Ctx) -> bool;

    /// Opens the link. Does nothing if it is already open.
    fn connect(&mut self, ctx: Ctx) -> Result<(), LinkError>;

    /// Transmits one command and blocks until the tag answers.
    /// Implementations must not pipeline; one command is outstanding at a time.
    fn transceive(&mut self, ctx: Ctx, command: &[u8]) -> Result<Vec<u8>, TransceiveError>;

    /// Releases the link. Calling this on a closed link must succeed.
    fn close(&mut self, ctx: Ctx) -> Result<(), CloseError>;
}
