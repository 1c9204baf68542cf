//! Connected-client bookkeeping.

use std::collections::HashSet;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events::messages::UnknownEventKind;
use crate::events::{EventKind, WsMessage};

/// Identifier of one connected websocket client.
pub type ClientId = Uuid;

/// What a client asked to receive at connect time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interest {
    /// Every filterable event kind.
    All,
    Kinds(HashSet<EventKind>),
}

/// A subscription string the daemon cannot honor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterestError {
    #[error(transparent)]
    Unknown(#[from] UnknownEventKind),

    /// Known kind, but control/protocol traffic rather than a filterable one.
    #[error("event kind '{0}' cannot be subscribed to")]
    NotFilterable(EventKind),
}

impl Interest {
    /// Parse the `events` query parameter: `"all"` or a comma-separated list
    /// of filterable kinds.
    pub fn parse(spec: &str) -> Result<Self, InterestError> {
        if spec.trim() == "all" || spec.trim().is_empty() {
            return Ok(Interest::All);
        }
        let mut kinds = HashSet::new();
        for part in spec.split(',') {
            let kind: EventKind = part.trim().parse()?;
            if !EventKind::FILTERABLE.contains(&kind) {
                return Err(InterestError::NotFilterable(kind));
            }
            kinds.insert(kind);
        }
        Ok(Interest::Kinds(kinds))
    }

    pub fn covers(&self, kind: EventKind) -> bool {
        match self {
            Interest::All => EventKind::FILTERABLE.contains(&kind),
            Interest::Kinds(kinds) => kinds.contains(&kind),
        }
    }

    /// Concrete kinds to keep filters alive for.
    pub fn kinds(&self) -> Vec<EventKind> {
        match self {
            Interest::All => EventKind::FILTERABLE.to_vec(),
            Interest::Kinds(kinds) => {
                let mut out: Vec<EventKind> = kinds.iter().copied().collect();
                out.sort();
                out
            }
        }
    }
}

/// Registry-side handle for one connected client.
#[derive(Debug)]
pub struct ClientHandle {
    pub id: ClientId,
    pub interest: Interest,
    /// Whether this client offered to sign transactions.
    pub signer: bool,
    sender: mpsc::Sender<WsMessage>,
}

impl ClientHandle {
    pub fn new(interest: Interest, signer: bool, sender: mpsc::Sender<WsMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            interest,
            signer,
            sender,
        }
    }

    /// Queue a message without waiting; the bound is the backpressure limit.
    pub fn deliver(&self, msg: WsMessage) -> Result<(), mpsc::error::TrySendError<WsMessage>> {
        self.sender.try_send(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_and_lists() {
        assert_eq!(Interest::parse("all").unwrap(), Interest::All);
        assert_eq!(Interest::parse("").unwrap(), Interest::All);

        let picked = Interest::parse("bounty-created, assertion-posted").unwrap();
        assert!(picked.covers(EventKind::BountyCreated));
        assert!(picked.covers(EventKind::AssertionPosted));
        assert!(!picked.covers(EventKind::Block));
    }

    #[test]
    fn test_parse_rejects_unknown_and_control_kinds() {
        assert!(matches!(
            Interest::parse("no-such-kind"),
            Err(InterestError::Unknown(_))
        ));
        assert!(matches!(
            Interest::parse("transaction-signing-request"),
            Err(InterestError::NotFilterable(_))
        ));
    }

    #[test]
    fn test_all_covers_only_filterable_kinds() {
        assert!(Interest::All.covers(EventKind::Block));
        assert!(!Interest::All.covers(EventKind::Error));
        assert!(!Interest::All.covers(EventKind::TransactionSigningRequest));
    }
}
