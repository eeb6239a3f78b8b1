//! JSON control envelopes
//!
//! Control messages travel as WebSocket text messages, one JSON object each,
//! discriminated by a `type` field.
//!
//! Inbound (client to relay):
//! - `hello` with `role: "viewer"` subscribes to device-list pushes
//! - `pub.register` binds the connection as a device's publisher
//! - `viewer.register` binds the connection as a device's viewer
//!
//! Outbound (relay to client): `device-list`, `stream.ended` and the reserved
//! `error`.

use serde::{Deserialize, Serialize};

use super::error::ProtocolError;

/// Minimum device id length accepted in registrations
pub const MIN_DEVICE_ID_LEN: usize = 3;

/// Upper bound for the advertised publisher frame rate
pub const MAX_FPS: u32 = 120;

/// Inbound control envelope
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    #[serde(rename = "hello")]
    Hello(Hello),

    #[serde(rename = "pub.register")]
    RegisterPublisher(PublisherRegistration),

    #[serde(rename = "viewer.register")]
    RegisterViewer(ViewerRegistration),

    /// Any other `type` value
    #[serde(other)]
    Unrecognized,
}

impl ControlMessage {
    /// Decode and validate a text message
    ///
    /// Unknown `type` values decode to [`ControlMessage::Unrecognized`];
    /// known types whose fields break their constraints are an error.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let msg: ControlMessage = serde_json::from_str(text)?;
        msg.validate()?;
        Ok(msg)
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            ControlMessage::Hello(_) | ControlMessage::Unrecognized => Ok(()),
            ControlMessage::RegisterPublisher(reg) => reg.validate(),
            ControlMessage::RegisterViewer(reg) => reg.validate(),
        }
    }
}

/// Role announced in a `hello` handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HelloRole {
    Viewer,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Hello {
    pub role: HelloRole,
}

/// Video codec advertised by a publisher; only H.264/AVC is relayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    Avc,
}

/// `pub.register` payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherRegistration {
    pub device_id: String,
    pub device_name: Option<String>,
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Carried through, not verified
    pub token: Option<String>,
}

impl PublisherRegistration {
    fn validate(&self) -> Result<(), ProtocolError> {
        validate_device_id(&self.device_id)?;
        if self.width == 0 {
            return Err(ProtocolError::invalid("width", "must be positive"));
        }
        if self.height == 0 {
            return Err(ProtocolError::invalid("height", "must be positive"));
        }
        if self.fps == 0 || self.fps > MAX_FPS {
            return Err(ProtocolError::invalid("fps", "must be within 1..=120"));
        }
        Ok(())
    }
}

/// `viewer.register` payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerRegistration {
    pub device_id: String,
    /// Carried through, not verified
    pub token: Option<String>,
}

impl ViewerRegistration {
    fn validate(&self) -> Result<(), ProtocolError> {
        validate_device_id(&self.device_id)
    }
}

fn validate_device_id(id: &str) -> Result<(), ProtocolError> {
    if id.chars().count() < MIN_DEVICE_ID_LEN {
        return Err(ProtocolError::invalid("deviceId", "too short"));
    }
    Ok(())
}

/// One entry of a device-list push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEntry {
    pub id: String,
    pub device_name: String,
}

/// Outbound control envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "device-list")]
    DeviceList { items: Vec<DeviceEntry> },

    #[serde(rename = "stream.ended", rename_all = "camelCase")]
    StreamEnded { device_id: String },

    /// Reserved for client diagnostics; the relay does not emit it today
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
