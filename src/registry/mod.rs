//! Room registry and frame routing
//!
//! The registry binds connections into per-device rooms and routes media
//! from each room's publisher to its single viewer.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<ConnectionRegistry>
//!                  ┌──────────────────────────────────┐
//!                  │ Mutex<                           │
//!                  │   rooms: HashMap<DeviceId, Room {│
//!                  │     publisher, viewer,           │
//!                  │     last_init, last_meta,        │
//!                  │   }>,                            │
//!                  │   subscribers, connections,      │
//!                  │ >                                │
//!                  └────────────────┬─────────────────┘
//!                                   │
//!         ┌─────────────────────────┼─────────────────────────┐
//!         │                         │                         │
//!         ▼                         ▼                         ▼
//!    [Publisher]               [Viewer]              [Directory subscriber]
//!    handle_binary()           outbound queue        device-list pushes
//!         │                         ▲
//!         └──► fanout::route() ─────┘
//! ```
//!
//! # Lossy delivery
//!
//! Frames are shared `bytes::Bytes`; the cached INIT/META and every queued
//! copy point at the same allocation. When a viewer's outbound queue is over
//! the high-water mark the frame is dropped rather than queued, and the next
//! INIT resynchronizes the viewer.

pub mod config;
pub mod directory;
pub mod fanout;
pub mod room;
pub mod store;

pub use config::RegistryConfig;
pub use fanout::Delivery;
pub use room::{Room, RoomSummary};
pub use store::ConnectionRegistry;
