//! Message codec: packed binary payloads inside a text envelope.
//!
//! Payloads are little-endian packed field sequences built with [`Packet`];
//! for transport they are hex-encoded and wrapped in the pipe-delimited
//! [`Message`] envelope, so the payload can never collide with the envelope's
//! delimiter.

mod message;
mod packet;
mod payloads;

pub use message::{unix_timestamp, Message, MessageError, MessageKind};
pub use packet::{CodecError, Packet, PacketReader};
pub use payloads::{KitchenStatus, PizzaCompletion, PizzaOrder, PizzaRecord};
