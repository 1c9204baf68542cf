//! Push message variants delivered to websocket clients.
//!
//! One closed enum, one case per event/notification kind. The wire envelope
//! is `{"kind": ..., ...payload fields}`; request/response correlated
//! variants additionally carry `id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chain::RawLogEntry;
use crate::events::Payload;

/// Every message/notification kind the daemon can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Connected,
    Block,
    BountyCreated,
    AssertionPosted,
    VerdictSettled,
    ArtifactUploaded,
    TransactionSigningRequest,
    TransactionSigningResponse,
    Error,
}

impl EventKind {
    /// Kinds backed by a contract filter; the only kinds a client may
    /// subscribe to (the rest are control/protocol traffic).
    pub const FILTERABLE: [EventKind; 5] = [
        EventKind::Block,
        EventKind::BountyCreated,
        EventKind::AssertionPosted,
        EventKind::VerdictSettled,
        EventKind::ArtifactUploaded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connected => "connected",
            EventKind::Block => "block",
            EventKind::BountyCreated => "bounty-created",
            EventKind::AssertionPosted => "assertion-posted",
            EventKind::VerdictSettled => "verdict-settled",
            EventKind::ArtifactUploaded => "artifact-uploaded",
            EventKind::TransactionSigningRequest => "transaction-signing-request",
            EventKind::TransactionSigningResponse => "transaction-signing-response",
            EventKind::Error => "error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "connected" => EventKind::Connected,
            "block" => EventKind::Block,
            "bounty-created" => EventKind::BountyCreated,
            "assertion-posted" => EventKind::AssertionPosted,
            "verdict-settled" => EventKind::VerdictSettled,
            "artifact-uploaded" => EventKind::ArtifactUploaded,
            "transaction-signing-request" => EventKind::TransactionSigningRequest,
            "transaction-signing-response" => EventKind::TransactionSigningResponse,
            "error" => EventKind::Error,
            _ => return Err(UnknownEventKind(s.to_string())),
        };
        Ok(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event kind '{0}'")]
pub struct UnknownEventKind(pub String);

/// Shared body of the contract-event variants: the schema-validated payload
/// plus provenance fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBody {
    #[serde(flatten)]
    pub data: Payload,
    pub block_number: u64,
    pub txhash: String,
}

impl EventBody {
    pub fn new(data: Payload, entry: &RawLogEntry) -> Self {
        Self {
            data,
            block_number: entry.block_number,
            txhash: format!("{:#x}", entry.transaction_hash),
        }
    }
}

/// A message deliverable over a client's websocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WsMessage {
    /// Greeting sent once per connection, before any event delivery.
    Connected { start_time: String },
    /// A newly observed block.
    Block { number: u64 },
    BountyCreated(EventBody),
    AssertionPosted(EventBody),
    VerdictSettled(EventBody),
    ArtifactUploaded(EventBody),
    /// Unsigned transaction pushed to the designated signing client.
    TransactionSigningRequest {
        id: u64,
        #[serde(rename = "chainId")]
        chain_id: u64,
        data: Value,
    },
    /// Echo of a signed transaction, correlated by `id`.
    TransactionSigningResponse {
        id: u64,
        #[serde(rename = "chainId")]
        chain_id: u64,
        data: String,
    },
    /// Non-fatal protocol or pipeline error surfaced to one client.
    Error { reason: String },
}

impl WsMessage {
    pub fn kind(&self) -> EventKind {
        match self {
            WsMessage::Connected { .. } => EventKind::Connected,
            WsMessage::Block { .. } => EventKind::Block,
            WsMessage::BountyCreated(_) => EventKind::BountyCreated,
            WsMessage::AssertionPosted(_) => EventKind::AssertionPosted,
            WsMessage::VerdictSettled(_) => EventKind::VerdictSettled,
            WsMessage::ArtifactUploaded(_) => EventKind::ArtifactUploaded,
            WsMessage::TransactionSigningRequest { .. } => EventKind::TransactionSigningRequest,
            WsMessage::TransactionSigningResponse { .. } => EventKind::TransactionSigningResponse,
            WsMessage::Error { .. } => EventKind::Error,
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        WsMessage::Error {
            reason: reason.into(),
        }
    }

    /// Wrap a decoded payload in the message variant for `kind`.
    ///
    /// Returns `None` for kinds that are not contract-event backed.
    pub fn from_decoded(kind: EventKind, payload: Payload, entry: &RawLogEntry) -> Option<Self> {
        let msg = match kind {
            EventKind::Block => {
                let number = payload
                    .get("number")
                    .and_then(Value::as_u64)
                    .unwrap_or(entry.block_number);
                WsMessage::Block { number }
            }
            EventKind::BountyCreated => WsMessage::BountyCreated(EventBody::new(payload, entry)),
            EventKind::AssertionPosted => {
                WsMessage::AssertionPosted(EventBody::new(payload, entry))
            }
            EventKind::VerdictSettled => WsMessage::VerdictSettled(EventBody::new(payload, entry)),
            EventKind::ArtifactUploaded => {
                WsMessage::ArtifactUploaded(EventBody::new(payload, entry))
            }
            _ => return None,
        };
        Some(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, B256};
    use serde_json::{json, Map};

    fn entry() -> RawLogEntry {
        RawLogEntry {
            event: "NewBounty".to_string(),
            args: Map::new(),
            log_index: 0,
            transaction_index: 1,
            transaction_hash: B256::repeat_byte(0xab),
            address: Address::ZERO,
            block_hash: B256::ZERO,
            block_number: 42,
        }
    }

    #[test]
    fn test_kind_round_trips_as_string() {
        for kind in EventKind::FILTERABLE {
            let parsed: EventKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("no-such-kind".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_event_envelope_flattens_payload() {
        let mut payload = Map::new();
        payload.insert("guid".into(), json!("0000-e"));
        payload.insert("author".into(), json!("0xdead"));
        let msg = WsMessage::from_decoded(EventKind::BountyCreated, payload, &entry()).unwrap();

        let wire = serde_json::to_value(&msg).unwrap();
        assert_eq!(wire["kind"], "bounty-created");
        assert_eq!(wire["guid"], "0000-e");
        assert_eq!(wire["author"], "0xdead");
        assert_eq!(wire["block_number"], 42);
        assert!(wire["txhash"].as_str().unwrap().starts_with("0xabab"));
    }

    #[test]
    fn test_signing_request_carries_correlation_id() {
        let msg = WsMessage::TransactionSigningRequest {
            id: 7,
            chain_id: 1,
            data: json!({"to": "0x0", "value": "0"}),
        };
        let wire = serde_json::to_value(&msg).unwrap();
        assert_eq!(wire["kind"], "transaction-signing-request");
        assert_eq!(wire["id"], 7);
        assert_eq!(wire["chainId"], 1);

        let back: WsMessage = serde_json::from_value(wire).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_block_message_wire_shape() {
        let mut payload = Map::new();
        payload.insert("number".into(), json!(42));
        let msg = WsMessage::from_decoded(EventKind::Block, payload, &entry()).unwrap();
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"kind": "block", "number": 42})
        );
    }

    #[test]
    fn test_non_event_kinds_have_no_envelope() {
        assert!(WsMessage::from_decoded(EventKind::Error, Map::new(), &entry()).is_none());
        assert!(WsMessage::from_decoded(EventKind::Connected, Map::new(), &entry()).is_none());
    }
}
