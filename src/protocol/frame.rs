//! Binary media frames
//!
//! Every binary WebSocket message from a publisher is one frame:
//!
//! ```text
//! +--------+---------------------------+
//! | kind   | payload (opaque)          |
//! | 1 byte | rest of the message       |
//! +--------+---------------------------+
//! ```
//!
//! There is no length prefix; the WebSocket message boundary is the frame
//! boundary.

use bytes::Bytes;

use super::error::ProtocolError;

/// fMP4 initialization segment
pub const KIND_INIT: u8 = 1;
/// fMP4 media segment
pub const KIND_MEDIA: u8 = 2;
/// Stream metadata
pub const KIND_META: u8 = 3;

/// Kind tag of a binary frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Decoder initialization data, cached for late joiners
    Init,
    /// Media segment, forwarded live only
    Media,
    /// Metadata, cached for late joiners
    Meta,
    /// A tag this relay does not know; parsed but routed nowhere
    Unknown(u8),
}

impl FrameKind {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            KIND_INIT => FrameKind::Init,
            KIND_MEDIA => FrameKind::Media,
            KIND_META => FrameKind::Meta,
            other => FrameKind::Unknown(other),
        }
    }
}

/// A decoded binary frame
///
/// Holds the complete message (tag included) so it can be cached and
/// forwarded verbatim without re-encoding. Cloning only bumps the `Bytes`
/// reference count.
#[derive(Debug, Clone)]
pub struct MediaFrame {
    kind: FrameKind,
    data: Bytes,
}

impl MediaFrame {
    /// Parse a frame from a complete binary message
    pub fn parse(data: Bytes) -> Result<Self, ProtocolError> {
        let tag = *data.first().ok_or(ProtocolError::EmptyFrame)?;
        Ok(Self {
            kind: FrameKind::from_tag(tag),
            data,
        })
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// The full frame, tag byte included
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }
}
