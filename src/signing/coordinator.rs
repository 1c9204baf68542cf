//! Signing delegation coordinator.
//!
//! # State machine (per request id)
//! ```text
//! Created → AwaitingSignature → Resolved   (matching response)
//!                             → TimedOut   (deadline elapsed)
//!                             → Rejected   (chain mismatch, malformed
//!                                           payload, signer gone)
//! ```
//!
//! At most one request may be outstanding per id; once a request leaves
//! `AwaitingSignature` its id is retired and only then becomes reusable.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::events::WsMessage;
use crate::observability::metrics;
use crate::signing::types::{is_hex_payload, RejectReason, RequestId, SigningError, SigningResponse};
use crate::ws::bus::{DeliveryOutcome, MessageBus};
use crate::ws::client::ClientId;

struct PendingRequest {
    client: ClientId,
    chain_id: u64,
    responder: oneshot::Sender<Result<String, SigningError>>,
}

pub struct SigningCoordinator {
    bus: Arc<MessageBus>,
    chain_id: u64,
    deadline: Duration,
    next_id: AtomicU64,
    pending: DashMap<RequestId, PendingRequest>,
}

impl SigningCoordinator {
    pub fn new(bus: Arc<MessageBus>, chain_id: u64, deadline: Duration) -> Self {
        Self {
            bus,
            chain_id,
            deadline,
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
        }
    }

    /// Allocate a fresh correlation id.
    pub fn next_id(&self) -> RequestId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Sign via the designated signing client, with a fresh id.
    pub async fn sign_transaction(&self, data: Value) -> Result<String, SigningError> {
        let client = self.bus.signing_client().ok_or(SigningError::NoSigner)?;
        let id = self.next_id();
        self.sign_with_id(id, client, data).await
    }

    /// Issue one signing request and wait for its outcome.
    ///
    /// Rejects immediately with `DuplicateInFlight` when `id` is still
    /// awaiting a signature, leaving the original request untouched.
    pub async fn sign_with_id(
        &self,
        id: RequestId,
        client: ClientId,
        data: Value,
    ) -> Result<String, SigningError> {
        let (responder, waiter) = oneshot::channel();
        match self.pending.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(SigningError::DuplicateInFlight(id));
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(PendingRequest {
                    client,
                    chain_id: self.chain_id,
                    responder,
                });
            }
        }

        let request = WsMessage::TransactionSigningRequest {
            id,
            chain_id: self.chain_id,
            data,
        };
        if self.bus.send_to(client, request) != DeliveryOutcome::Delivered {
            self.pending.remove(&id);
            metrics::record_signing_outcome("rejected");
            return Err(SigningError::Rejected {
                id,
                reason: RejectReason::SignerUnavailable,
            });
        }
        tracing::debug!(id, client = %client, "Signing request issued");

        match tokio::time::timeout(self.deadline, waiter).await {
            Ok(Ok(outcome)) => {
                match &outcome {
                    Ok(_) => metrics::record_signing_outcome("resolved"),
                    Err(_) => metrics::record_signing_outcome("rejected"),
                }
                outcome
            }
            Ok(Err(_)) => {
                // Responder dropped without a verdict; treat as signer loss.
                self.pending.remove(&id);
                metrics::record_signing_outcome("rejected");
                Err(SigningError::Rejected {
                    id,
                    reason: RejectReason::SignerUnavailable,
                })
            }
            Err(_) => {
                self.pending.remove(&id);
                metrics::record_signing_outcome("timeout");
                tracing::warn!(id, "Signing request timed out");
                Err(SigningError::Timeout(id))
            }
        }
    }

    /// Correlate one signed response with its outstanding request.
    ///
    /// An unknown id is dropped and reported back to the sender; it never
    /// disturbs other outstanding requests.
    pub fn resolve(&self, response: SigningResponse) -> Result<(), SigningError> {
        let Some((_, request)) = self.pending.remove(&response.id) else {
            tracing::warn!(
                id = response.id,
                "Dropping signing response with no outstanding request"
            );
            return Err(SigningError::UnknownId(response.id));
        };

        if request.chain_id != response.chain_id {
            tracing::warn!(
                id = response.id,
                expected = request.chain_id,
                actual = response.chain_id,
                "Signing response for the wrong chain"
            );
            let _ = request.responder.send(Err(SigningError::Rejected {
                id: response.id,
                reason: RejectReason::ChainMismatch,
            }));
            return Ok(());
        }

        if !is_hex_payload(&response.data) {
            let _ = request.responder.send(Err(SigningError::Rejected {
                id: response.id,
                reason: RejectReason::MalformedPayload,
            }));
            return Ok(());
        }

        tracing::debug!(id = response.id, "Signing request resolved");
        let _ = request.responder.send(Ok(response.data));
        Ok(())
    }

    /// Fail fast every request awaiting this client's signature.
    pub fn client_disconnected(&self, client: ClientId) {
        let stale: Vec<RequestId> = self
            .pending
            .iter()
            .filter(|entry| entry.client == client)
            .map(|entry| *entry.key())
            .collect();
        for id in stale {
            if let Some((_, request)) = self.pending.remove_if(&id, |_, p| p.client == client) {
                tracing::warn!(id, client = %client, "Signer disconnected with request in flight");
                metrics::record_signing_outcome("rejected");
                let _ = request.responder.send(Err(SigningError::Rejected {
                    id,
                    reason: RejectReason::SignerUnavailable,
                }));
            }
        }
    }

    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    pub fn is_outstanding(&self, id: RequestId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Wait for outstanding requests to settle, up to `deadline`; whatever
    /// remains is failed so callers are not left hanging at shutdown.
    pub async fn drain(&self, deadline: Duration) {
        let started = tokio::time::Instant::now();
        while !self.pending.is_empty() {
            if started.elapsed() >= deadline {
                tracing::warn!(
                    outstanding = self.pending.len(),
                    "Signing drain deadline exceeded, failing outstanding requests"
                );
                let ids: Vec<RequestId> = self.pending.iter().map(|e| *e.key()).collect();
                for id in ids {
                    if let Some((_, request)) = self.pending.remove(&id) {
                        let _ = request.responder.send(Err(SigningError::Timeout(id)));
                    }
                }
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}
