//! Message bus and client registry.
//!
//! # Responsibilities
//! - Track connected clients and their declared interests
//! - Fan one message out to every interested client
//! - Keep one slow or dead client from stalling the rest
//!
//! Backpressure policy: each client gets a bounded outbound queue; a client
//! whose queue fills is disconnected (drop-the-slow-consumer, never
//! drop-the-message for the healthy ones).

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::events::{EventKind, WsMessage};
use crate::observability::metrics;
use crate::ws::client::{ClientHandle, ClientId, Interest};

/// What happened to one client during a delivery pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    NotInterested,
    /// Outbound queue full; the client was disconnected.
    Backpressured,
    /// Receiver already gone; the client was removed.
    Gone,
}

pub struct MessageBus {
    clients: DashMap<ClientId, ClientHandle>,
    /// Per-client outbound queue bound.
    capacity: usize,
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            clients: DashMap::new(),
            capacity,
        }
    }

    /// Register a client; returns its id and the outbound queue to drain
    /// into the socket.
    pub fn register(&self, interest: Interest, signer: bool) -> (ClientId, mpsc::Receiver<WsMessage>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let handle = ClientHandle::new(interest, signer, tx);
        let id = handle.id;
        self.clients.insert(id, handle);
        metrics::record_clients(self.clients.len());
        (id, rx)
    }

    /// Remove a client. Idempotent; returns whether it was present.
    pub fn unregister(&self, id: ClientId) -> bool {
        let removed = self.clients.remove(&id).is_some();
        if removed {
            metrics::record_clients(self.clients.len());
        }
        removed
    }

    /// Deliver `msg` to every client whose interest covers `kind`.
    ///
    /// `kind` is passed separately so error notifications can be routed to
    /// the subscribers of the filter they concern.
    pub fn notify(&self, kind: EventKind, msg: &WsMessage) -> Vec<(ClientId, DeliveryOutcome)> {
        let mut outcomes = Vec::new();
        let mut dropped = Vec::new();

        for client in self.clients.iter() {
            if !client.interest.covers(kind) {
                outcomes.push((client.id, DeliveryOutcome::NotInterested));
                continue;
            }
            match client.deliver(msg.clone()) {
                Ok(()) => outcomes.push((client.id, DeliveryOutcome::Delivered)),
                Err(TrySendError::Full(_)) => dropped.push((client.id, DeliveryOutcome::Backpressured)),
                Err(TrySendError::Closed(_)) => dropped.push((client.id, DeliveryOutcome::Gone)),
            }
        }

        // Removals happen outside the iteration so shard locks are free.
        for (id, outcome) in &dropped {
            if self.clients.remove(id).is_some() {
                match outcome {
                    DeliveryOutcome::Backpressured => {
                        tracing::warn!(client = %id, "Disconnecting client over outbound backlog");
                    }
                    _ => {
                        tracing::debug!(client = %id, "Removing client with closed channel");
                    }
                }
                metrics::record_clients(self.clients.len());
            }
        }
        outcomes.extend(dropped);

        metrics::record_broadcast(
            kind.as_str(),
            outcomes
                .iter()
                .filter(|(_, o)| *o == DeliveryOutcome::Delivered)
                .count() as u64,
        );
        outcomes
    }

    /// Deliver one message by the message's own kind.
    pub fn broadcast(&self, msg: &WsMessage) -> Vec<(ClientId, DeliveryOutcome)> {
        self.notify(msg.kind(), msg)
    }

    /// Deliver directly to one client, ignoring interest. Used for the
    /// connected greeting, signing traffic, replays, and error reports.
    pub fn send_to(&self, id: ClientId, msg: WsMessage) -> DeliveryOutcome {
        let Some(client) = self.clients.get(&id) else {
            return DeliveryOutcome::Gone;
        };
        match client.deliver(msg) {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(TrySendError::Full(_)) => {
                drop(client);
                if self.clients.remove(&id).is_some() {
                    tracing::warn!(client = %id, "Disconnecting client over outbound backlog");
                    metrics::record_clients(self.clients.len());
                }
                DeliveryOutcome::Backpressured
            }
            Err(TrySendError::Closed(_)) => DeliveryOutcome::Gone,
        }
    }

    /// Current subscriptions, for the management surface.
    pub fn subscriptions(&self) -> Vec<(ClientId, Interest)> {
        self.clients
            .iter()
            .map(|c| (c.id, c.interest.clone()))
            .collect()
    }

    /// The designated signing client, if one is connected.
    pub fn signing_client(&self) -> Option<ClientId> {
        self.clients
            .iter()
            .find(|c| c.signer)
            .map(|c| c.id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use std::collections::HashSet;

    fn block_msg(n: u64) -> WsMessage {
        WsMessage::Block { number: n }
    }

    #[tokio::test]
    async fn test_only_interested_clients_receive() {
        let bus = MessageBus::new(8);
        let (_all, mut all_rx) = bus.register(Interest::All, false);
        let (bounties, mut bounty_rx) = bus.register(
            Interest::Kinds(HashSet::from([EventKind::BountyCreated])),
            false,
        );

        let outcomes = bus.broadcast(&block_msg(5));
        assert!(outcomes.contains(&(bounties, DeliveryOutcome::NotInterested)));
        assert_eq!(all_rx.recv().await.unwrap(), block_msg(5));
        assert!(bounty_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_slow_client_is_disconnected_not_waited_on() {
        let bus = MessageBus::new(1);
        let (slow, _slow_rx) = bus.register(Interest::All, false);
        let (healthy, mut healthy_rx) = bus.register(Interest::All, false);

        bus.broadcast(&block_msg(1));
        // The healthy client keeps draining its queue; `slow` never does.
        assert_eq!(healthy_rx.recv().await.unwrap(), block_msg(1));

        // Queue of `slow` is now full; the next broadcast drops it.
        let outcomes = bus.broadcast(&block_msg(2));
        assert!(outcomes.contains(&(slow, DeliveryOutcome::Backpressured)));
        assert!(!bus.contains(slow));

        // The healthy client saw every message.
        assert_eq!(healthy_rx.recv().await.unwrap(), block_msg(2));
        assert!(bus.contains(healthy));
    }

    #[tokio::test]
    async fn test_send_to_ignores_interest() {
        let bus = MessageBus::new(8);
        let (id, mut rx) = bus.register(
            Interest::Kinds(HashSet::from([EventKind::Block])),
            false,
        );
        let outcome = bus.send_to(id, WsMessage::error("filter degraded"));
        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert!(matches!(rx.recv().await.unwrap(), WsMessage::Error { .. }));

        assert_eq!(
            bus.send_to(ClientId::new_v4(), block_msg(1)),
            DeliveryOutcome::Gone
        );
    }

    #[tokio::test]
    async fn test_signing_client_lookup() {
        let bus = MessageBus::new(8);
        assert!(bus.signing_client().is_none());
        let (_plain, _rx1) = bus.register(Interest::All, false);
        let (signer, _rx2) = bus.register(Interest::All, true);
        assert_eq!(bus.signing_client(), Some(signer));

        bus.unregister(signer);
        assert!(bus.signing_client().is_none());
    }
}
