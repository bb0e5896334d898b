//! The pipe-delimited text envelope carried on the queues.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use super::CodecError;

/// The fixed set of message kinds exchanged between reception and kitchens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Reception → kitchen: a single expanded pizza order.
    PizzaOrder = 1,
    /// Kitchen → reception: a pizza finished cooking.
    PizzaCompleted = 2,
    /// Reception → kitchen: please report your status.
    StatusRequest = 3,
    /// Kitchen → reception: status snapshot.
    StatusResponse = 4,
    /// Reception → kitchen: stop and exit.
    Shutdown = 5,
    /// Kitchen → reception: periodic liveness signal.
    Heartbeat = 6,
}

impl MessageKind {
    /// Decode a wire value, if it names a message kind.
    #[must_use]
    pub const fn from_wire(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::PizzaOrder),
            2 => Some(Self::PizzaCompleted),
            3 => Some(Self::StatusRequest),
            4 => Some(Self::StatusResponse),
            5 => Some(Self::Shutdown),
            6 => Some(Self::Heartbeat),
            _ => None,
        }
    }
}

/// Envelope decode failures. The listener logs these and drops the message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// The envelope did not have five pipe-separated fields.
    #[error("invalid message format")]
    MalformedEnvelope,

    /// A numeric header field failed to parse.
    #[error("invalid message field {field:?}: {text:?}")]
    InvalidField {
        /// Which header field was malformed.
        field: &'static str,
        /// The text that failed to parse.
        text: String,
    },

    /// The kind field named no known message kind.
    #[error("unknown message kind: {0}")]
    UnknownKind(u8),

    /// The declared payload length did not match the payload.
    #[error("payload length mismatch: declared {declared}, got {actual}")]
    LengthMismatch {
        /// Length the envelope declared.
        declared: usize,
        /// Length actually present.
        actual: usize,
    },

    /// The raw queue bytes were not valid UTF-8.
    #[error("message envelope is not valid UTF-8")]
    InvalidUtf8,

    /// The payload failed to decode.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// A typed message: kind, sender, wall-clock timestamp, hex payload.
///
/// The serialized form is ASCII text:
/// `<kind>|<senderId>|<timestampSec>|<payloadLen>|<payload>`, where the
/// payload is the hex rendering of a packed [`super::Packet`] and so never
/// contains the delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// What this message is.
    pub kind: MessageKind,
    /// Kitchen id of the sender; 0 is reception.
    pub sender_id: u32,
    /// Seconds since the Unix epoch at send time.
    pub timestamp: u32,
    /// Hex-encoded packed payload; empty for payload-less kinds.
    pub payload: String,
}

impl Message {
    /// Build a message stamped with the current wall-clock time.
    #[must_use]
    pub fn new(kind: MessageKind, sender_id: u32, payload: String) -> Self {
        Self {
            kind,
            sender_id,
            timestamp: unix_timestamp(),
            payload,
        }
    }

    /// Render the envelope.
    #[must_use]
    pub fn serialize(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.kind as u8,
            self.sender_id,
            self.timestamp,
            self.payload.len(),
            self.payload
        )
    }

    /// Parse an envelope.
    ///
    /// # Errors
    ///
    /// Fails when the field count, a numeric field, the kind, or the declared
    /// payload length is wrong.
    pub fn deserialize(data: &str) -> Result<Self, MessageError> {
        let mut fields = data.splitn(5, '|');
        let kind_text = fields.next().ok_or(MessageError::MalformedEnvelope)?;
        let sender_text = fields.next().ok_or(MessageError::MalformedEnvelope)?;
        let timestamp_text = fields.next().ok_or(MessageError::MalformedEnvelope)?;
        let length_text = fields.next().ok_or(MessageError::MalformedEnvelope)?;
        let payload = fields.next().ok_or(MessageError::MalformedEnvelope)?;

        let kind_value: u8 = parse_field("kind", kind_text)?;
        let kind = MessageKind::from_wire(kind_value)
            .ok_or(MessageError::UnknownKind(kind_value))?;
        let sender_id = parse_field("sender", sender_text)?;
        let timestamp = parse_field("timestamp", timestamp_text)?;
        let declared: usize = parse_field("payload length", length_text)?;

        if declared != payload.len() {
            return Err(MessageError::LengthMismatch {
                declared,
                actual: payload.len(),
            });
        }

        Ok(Self {
            kind,
            sender_id,
            timestamp,
            payload: payload.to_string(),
        })
    }
}

fn parse_field<T: std::str::FromStr>(
    field: &'static str,
    text: &str,
) -> Result<T, MessageError> {
    text.parse().map_err(|_| MessageError::InvalidField {
        field,
        text: text.to_string(),
    })
}

/// Seconds since the Unix epoch, saturating at zero for a misbehaving clock.
#[must_use]
pub fn unix_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_shape() {
        let message = Message {
            kind: MessageKind::PizzaOrder,
            sender_id: 0,
            timestamp: 1700000000,
            payload: "00aaff".to_string(),
        };
        assert_eq!(message.serialize(), "1|0|1700000000|6|00aaff");
    }

    #[test]
    fn round_trip_every_kind() {
        for (kind, payload) in [
            (MessageKind::PizzaOrder, "0102"),
            (MessageKind::PizzaCompleted, "ff"),
            (MessageKind::StatusRequest, ""),
            (MessageKind::StatusResponse, "00"),
            (MessageKind::Shutdown, ""),
            (MessageKind::Heartbeat, ""),
        ] {
            let message = Message {
                kind,
                sender_id: 3,
                timestamp: 123,
                payload: payload.to_string(),
            };
            let decoded = Message::deserialize(&message.serialize()).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn rejects_malformed_envelopes() {
        assert_eq!(
            Message::deserialize("1|2|3"),
            Err(MessageError::MalformedEnvelope)
        );
        assert!(matches!(
            Message::deserialize("x|0|0|0|"),
            Err(MessageError::InvalidField { field: "kind", .. })
        ));
        assert_eq!(
            Message::deserialize("9|0|0|0|"),
            Err(MessageError::UnknownKind(9))
        );
        assert_eq!(
            Message::deserialize("6|1|0|4|aa"),
            Err(MessageError::LengthMismatch {
                declared: 4,
                actual: 2
            })
        );
    }

    #[test]
    fn empty_payload_round_trips() {
        let message = Message {
            kind: MessageKind::Heartbeat,
            sender_id: 9,
            timestamp: 7,
            payload: String::new(),
        };
        assert_eq!(message.serialize(), "6|9|7|0|");
        assert_eq!(
            Message::deserialize(&message.serialize()).unwrap(),
            message
        );
    }
}
