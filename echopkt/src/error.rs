//! Error type shared by every decoder in the crate.

use log::debug;
use quick_error::quick_error;

/// A specialized `Result` type for packet decoding.
pub type Result<T> = core::result::Result<T, Error>;

quick_error! {
    /// The toplevel error type.
    ///
    /// Decoding either fully succeeds or fails with this error, no partially
    /// decoded value is ever returned. `layer` names the protocol that
    /// rejected the buffer and `reason` says which length or field check
    /// failed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Error {
        /// The buffer does not hold a well-formed packet.
        MalformedPacket { layer: &'static str, reason: &'static str } {
            display("malformed {} packet: {}", layer, reason)
        }
    }
}

impl Error {
    pub(crate) fn malformed(layer: &'static str, reason: &'static str) -> Self {
        Self::MalformedPacket { layer, reason }
    }

    // Logs the rejected buffer length before handing the error back.
    pub(crate) fn reject<T>(layer: &'static str, reason: &'static str, len: usize) -> Result<T> {
        debug!("rejecting {}-byte buffer as {}: {}", len, layer, reason);
        Err(Self::malformed(layer, reason))
    }

    /// The protocol layer that rejected the buffer.
    pub fn layer(&self) -> &'static str {
        match self {
            Self::MalformedPacket { layer, .. } => *layer,
        }
    }

    /// A short description of the failed check.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MalformedPacket { reason, .. } => *reason,
        }
    }
}
