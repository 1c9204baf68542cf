//! Signing protocol types and error definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Correlation id linking a signing request to its eventual response.
pub type RequestId = u64;

/// An unsigned transaction handed to the designated signing client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningRequest {
    pub id: RequestId,
    pub chain_id: u64,
    /// Unsigned transaction fields, passed through opaquely.
    pub data: Value,
}

/// A signed transaction returned by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningResponse {
    pub id: RequestId,
    pub chain_id: u64,
    /// Hex-encoded signed transaction bytes.
    pub data: String,
}

/// Why a request left `AwaitingSignature` without a usable signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    ChainMismatch,
    MalformedPayload,
    SignerUnavailable,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            RejectReason::ChainMismatch => "chain id mismatch",
            RejectReason::MalformedPayload => "malformed signed payload",
            RejectReason::SignerUnavailable => "signing client unavailable",
        };
        f.write_str(reason)
    }
}

/// Signing protocol failures, reported to the caller of the request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SigningError {
    /// The single-flight invariant: an id may not be reused while a request
    /// for it is still awaiting a signature.
    #[error("signing request {0} already in flight")]
    DuplicateInFlight(RequestId),

    #[error("signing request {0} timed out")]
    Timeout(RequestId),

    #[error("signing request {id} rejected: {reason}")]
    Rejected { id: RequestId, reason: RejectReason },

    /// Response with no outstanding request; dropped, never fatal.
    #[error("no outstanding signing request with id {0}")]
    UnknownId(RequestId),

    #[error("no signing client connected")]
    NoSigner,
}

/// Whether a response payload looks like hex-encoded transaction bytes.
pub fn is_hex_payload(data: &str) -> bool {
    let digits = data.strip_prefix("0x").unwrap_or(data);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit())
}
