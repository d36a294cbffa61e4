//! Protocol wire messages.
//!
//! Outgoing frames are JSON arrays tagged by their first element:
//! `["REQ", id, filter...]`, `["CLOSE", id]` and `["EVENT", event]`.
//! Incoming frames from relays are parsed into [`RelayMessage`].

use crate::error::{MuxError, Result};
use crate::types::{Event, Query, SubscriptionId};
use serde::ser::{Serialize, SerializeSeq, Serializer};
use serde_json::Value;

/// A message sent from a client to a relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    /// Start or update a filtered subscription.
    Req {
        subscription_id: SubscriptionId,
        query: Query,
    },
    /// Stop a subscription.
    Close(SubscriptionId),
    /// Publish an event.
    Event(Box<Event>),
}

impl ClientMessage {
    pub fn req(subscription_id: &SubscriptionId, query: &Query) -> Self {
        ClientMessage::Req {
            subscription_id: subscription_id.clone(),
            query: query.clone(),
        }
    }

    pub fn close(subscription_id: &SubscriptionId) -> Self {
        ClientMessage::Close(subscription_id.clone())
    }

    /// Frame verb (`"REQ"`, `"CLOSE"`, `"EVENT"`).
    pub fn verb(&self) -> &'static str {
        match self {
            ClientMessage::Req { .. } => "REQ",
            ClientMessage::Close(_) => "CLOSE",
            ClientMessage::Event(_) => "EVENT",
        }
    }

    /// Subscription this message addresses, if any.
    pub fn subscription_id(&self) -> Option<&SubscriptionId> {
        match self {
            ClientMessage::Req {
                subscription_id, ..
            } => Some(subscription_id),
            ClientMessage::Close(id) => Some(id),
            ClientMessage::Event(_) => None,
        }
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Serialize for ClientMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ClientMessage::Req {
                subscription_id,
                query,
            } => {
                let mut seq = serializer.serialize_seq(Some(2 + query.filters().len()))?;
                seq.serialize_element("REQ")?;
                seq.serialize_element(subscription_id)?;
                for filter in query.filters() {
                    seq.serialize_element(filter)?;
                }
                seq.end()
            }
            ClientMessage::Close(id) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element("CLOSE")?;
                seq.serialize_element(id)?;
                seq.end()
            }
            ClientMessage::Event(event) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element("EVENT")?;
                seq.serialize_element(event.as_ref())?;
                seq.end()
            }
        }
    }
}

/// An event as it arrives on a relay's inbound stream, tagged with the
/// subscription it was sent for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingEvent {
    pub subscription_id: SubscriptionId,
    pub body: Event,
}

/// A message received from a relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayMessage {
    Event(IncomingEvent),
    /// End of stored events for a subscription.
    Eose(SubscriptionId),
    Notice(String),
}

impl RelayMessage {
    /// Parse a JSON text frame.
    pub fn from_json(frame: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(frame).map_err(|e| MuxError::Deserialization(e.to_string()))?;
        let Value::Array(mut parts) = value else {
            return Err(MuxError::InvalidMessage("frame is not an array".to_string()));
        };
        if parts.is_empty() {
            return Err(MuxError::InvalidMessage("empty frame".to_string()));
        }

        let verb = match parts.remove(0) {
            Value::String(verb) => verb,
            other => {
                return Err(MuxError::InvalidMessage(format!(
                    "frame verb is not a string: {}",
                    other
                )))
            }
        };

        match (verb.as_str(), parts.len()) {
            ("EVENT", 2) => {
                let body = parts.pop().unwrap_or(Value::Null);
                let subscription_id = string_part(parts.pop(), "subscription id")?;
                let body: Event = serde_json::from_value(body)
                    .map_err(|e| MuxError::Deserialization(e.to_string()))?;
                Ok(RelayMessage::Event(IncomingEvent {
                    subscription_id: SubscriptionId(subscription_id),
                    body,
                }))
            }
            ("EOSE", 1) => Ok(RelayMessage::Eose(SubscriptionId(string_part(
                parts.pop(),
                "subscription id",
            )?))),
            ("NOTICE", 1) => Ok(RelayMessage::Notice(string_part(parts.pop(), "notice")?)),
            (verb, len) => Err(MuxError::InvalidMessage(format!(
                "unsupported frame {} with {} arguments",
                verb, len
            ))),
        }
    }
}

fn string_part(value: Option<Value>, what: &str) -> Result<String> {
    match value {
        Some(Value::String(s)) => Ok(s),
        _ => Err(MuxError::InvalidMessage(format!("{} must be a string", what))),
    }
}
