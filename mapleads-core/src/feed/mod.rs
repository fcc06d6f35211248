//! Real-time job channel: wire codec, typed messages and the reducer that
//! consumes them.

pub mod codec;
pub mod message;
pub mod state;

pub use codec::{CodecError, Handshake, Packet, SocketPacket};
pub use message::FeedMessage;
pub use state::{FeedEffect, FeedState};
