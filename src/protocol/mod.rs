//! Wire protocol
//!
//! Two disjoint message domains share one WebSocket connection:
//! - binary messages carry media frames ([`frame`])
//! - text messages carry JSON control envelopes ([`control`])

pub mod control;
pub mod error;
pub mod frame;

pub use control::{
    ControlMessage, DeviceEntry, Hello, HelloRole, PublisherRegistration, ServerMessage,
    VideoCodec, ViewerRegistration,
};
pub use error::ProtocolError;
pub use frame::{FrameKind, MediaFrame, KIND_INIT, KIND_MEDIA, KIND_META};
