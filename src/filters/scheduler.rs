//! Polling authority over the set of live filters.
//!
//! # Data Flow
//! ```text
//! subscribe(client, kinds)
//!     → one ContractFilter per kind (created on first subscriber)
//!     → one poll loop per contract group, members polled in causal
//!       kind order against a shared head snapshot
//!     → new entries decoded per schema, handed to the bus as each
//!       filter's poll completes (no global batching barrier)
//! ```
//!
//! Filters watching the same contract share a poll task so that causally
//! related entries (a bounty and an assertion against it in the same block)
//! reach the bus in block order. Groups poll independently of each other;
//! no cross-group ordering is promised.
//!
//! Filters whose last subscriber leaves are marked stopped; the group loop
//! observes the flag on its next pass, completes any in-flight poll, and
//! removes the slot.

use alloy::primitives::Address;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::chain::{ChainError, ChainResult, FilterId, FilterQuery, LogSource, RawLogEntry};
use crate::config::schema::FiltersConfig;
use crate::events::schema::ContractRole;
use crate::events::{decode, EventKind, SchemaRegistry, WsMessage};
use crate::filters::filter::{ContractFilter, PollPolicy};
use crate::observability::metrics;
use crate::ws::bus::MessageBus;
use crate::ws::client::ClientId;

/// Contracts the daemon watches, parsed from configuration at startup.
#[derive(Debug, Clone, Copy)]
pub struct ContractAddresses {
    pub bounty_registry: Address,
    pub artifact_registry: Address,
}

impl ContractAddresses {
    fn for_role(&self, role: ContractRole) -> Address {
        match role {
            ContractRole::BountyRegistry => self.bounty_registry,
            ContractRole::ArtifactRegistry => self.artifact_registry,
        }
    }
}

/// Which poll loop drives a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PollGroup {
    Latest,
    BountyRegistry,
    ArtifactRegistry,
}

fn group_of(role: Option<ContractRole>) -> PollGroup {
    match role {
        None => PollGroup::Latest,
        Some(ContractRole::BountyRegistry) => PollGroup::BountyRegistry,
        Some(ContractRole::ArtifactRegistry) => PollGroup::ArtifactRegistry,
    }
}

struct FilterSlot {
    filter: Arc<ContractFilter>,
    subscribers: HashSet<ClientId>,
    group: PollGroup,
}

type FilterTable = Arc<DashMap<EventKind, FilterSlot>>;

pub struct FilterScheduler {
    source: Arc<dyn LogSource>,
    registry: Arc<SchemaRegistry>,
    bus: Arc<MessageBus>,
    addresses: ContractAddresses,
    config: FiltersConfig,
    slots: FilterTable,
    /// Groups with a live poll loop.
    running: Arc<DashMap<PollGroup, ()>>,
    next_filter_id: AtomicU64,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FilterScheduler {
    pub fn new(
        source: Arc<dyn LogSource>,
        registry: Arc<SchemaRegistry>,
        bus: Arc<MessageBus>,
        addresses: ContractAddresses,
        config: FiltersConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            source,
            registry,
            bus,
            addresses,
            config,
            slots: Arc::new(DashMap::new()),
            running: Arc::new(DashMap::new()),
            next_filter_id: AtomicU64::new(1),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe a client to the given kinds, installing filters as needed.
    ///
    /// Failure to allocate a filter at all is a daemon-level fault and is
    /// returned to the caller rather than swallowed.
    pub async fn subscribe(&self, client: ClientId, kinds: &[EventKind]) -> ChainResult<()> {
        for &kind in kinds {
            if self.join_existing(kind, client).await {
                continue;
            }
            let filter = Arc::new(self.install_filter(kind).await?);
            let group = group_of(self.registry.get(kind).and_then(|e| e.contract));
            match self.slots.entry(kind) {
                Entry::Occupied(mut slot) => {
                    // Lost the install race; ride the winner's filter.
                    slot.get_mut().subscribers.insert(client);
                    filter.stop();
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(FilterSlot {
                        filter: filter.clone(),
                        subscribers: HashSet::from([client]),
                        group,
                    });
                    tracing::debug!(
                        filter = %filter.id(),
                        kind = %kind,
                        "Registered new filter"
                    );
                    self.ensure_group_loop(group);
                }
            }
        }
        Ok(())
    }

    /// Join a live slot if there is one. Returns false when a new filter is
    /// needed.
    async fn join_existing(&self, kind: EventKind, client: ClientId) -> bool {
        let reclaimed = {
            let Some(mut slot) = self.slots.get_mut(&kind) else {
                return false;
            };
            let was_idle = slot.subscribers.is_empty();
            slot.subscribers.insert(client);
            was_idle.then(|| slot.filter.clone())
        };
        // Reclaimed before its removal pass: discard whatever accumulated
        // while nobody was watching.
        if let Some(filter) = reclaimed {
            if let Err(e) = filter.flush().await {
                tracing::warn!(filter = %filter.id(), error = %e, "Flush on resubscribe failed");
            }
        }
        true
    }

    async fn install_filter(&self, kind: EventKind) -> ChainResult<ContractFilter> {
        let entry = self.registry.get(kind).ok_or_else(|| {
            ChainError::FilterAllocation(format!("no schema registered for '{kind}'"))
        })?;
        let query = match entry.contract {
            None => FilterQuery::Latest,
            Some(role) => FilterQuery::event(self.addresses.for_role(role), entry.contract_event),
        };
        let min = Duration::from_millis(self.config.min_wait_ms);
        let max = Duration::from_millis(self.config.max_wait_ms);
        // Blocks and bounties should never lag behind an idle-stretched poll.
        let policy = match kind {
            EventKind::Block | EventKind::BountyCreated => PollPolicy::fixed(min),
            _ => PollPolicy::with_backoff(min, max),
        };
        let id = FilterId(self.next_filter_id.fetch_add(1, Ordering::SeqCst));
        ContractFilter::install(id, kind, query, self.source.clone(), policy).await
    }

    fn ensure_group_loop(&self, group: PollGroup) {
        match self.running.entry(group) {
            Entry::Occupied(_) => {}
            Entry::Vacant(vacant) => {
                vacant.insert(());
                self.spawn_group_loop(group);
            }
        }
    }

    fn spawn_group_loop(&self, group: PollGroup) {
        let source = self.source.clone();
        let registry = self.registry.clone();
        let bus = self.bus.clone();
        let slots = self.slots.clone();
        let running = self.running.clone();
        let degraded_threshold = self.config.degraded_threshold;
        let mut shutdown = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            let mut empty_polls: u32 = 0;
            tracing::debug!(?group, "Poll loop started");
            loop {
                // Scheduling pass: additions and removals take effect here.
                let live = group_members(&slots, group);
                if live.is_empty() {
                    running.remove(&group);
                    // A subscriber may have raced the exit; reclaim if so.
                    if group_members(&slots, group).is_empty() {
                        break;
                    }
                    match running.entry(group) {
                        Entry::Vacant(vacant) => {
                            vacant.insert(());
                            continue;
                        }
                        Entry::Occupied(_) => break,
                    }
                }

                let wait = live[0].policy().compute_wait(empty_polls);
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = tokio::time::sleep(wait) => {}
                }

                // One head snapshot per tick: members never observe each
                // other's blocks out of order.
                let head = match source.block_number().await {
                    Ok(head) => head,
                    Err(e) => {
                        for filter in &live {
                            note_failure(&bus, filter, degraded_threshold, &e);
                        }
                        empty_polls = empty_polls.saturating_add(2);
                        continue;
                    }
                };

                let mut delivered_any = false;
                for filter in &live {
                    if filter.is_stopped() {
                        continue;
                    }
                    match filter.get_new_entries_up_to(head).await {
                        Ok(entries) => {
                            filter.reset_failures();
                            // Removal mid-poll: the in-flight poll completed,
                            // its results are discarded.
                            if filter.is_stopped() || entries.is_empty() {
                                continue;
                            }
                            delivered_any = true;
                            dispatch(&registry, &bus, filter.kind(), entries);
                        }
                        Err(ChainError::FilterExhausted(id)) => {
                            tracing::warn!(
                                filter = %id,
                                kind = %filter.kind(),
                                "Filter no longer exists on the chain endpoint"
                            );
                            bus.notify(
                                filter.kind(),
                                &WsMessage::error(format!(
                                    "filter for '{}' exhausted by the chain endpoint",
                                    filter.kind()
                                )),
                            );
                            filter.stop();
                        }
                        Err(e) if e.is_transient() => {
                            note_failure(&bus, filter, degraded_threshold, &e);
                        }
                        Err(e) => {
                            tracing::error!(filter = %filter.id(), error = %e, "Poll failed");
                        }
                    }
                }
                empty_polls = if delivered_any { 0 } else { empty_polls + 1 };
            }
            running.remove(&group);
            tracing::debug!(?group, "Poll loop ended");
        });
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(handle);
        }
    }

    /// Drop a client from every slot; filters left without subscribers are
    /// marked for removal and disappear on their next scheduling pass.
    pub fn unsubscribe_client(&self, client: ClientId) {
        for mut slot in self.slots.iter_mut() {
            if slot.subscribers.remove(&client) && slot.subscribers.is_empty() {
                slot.filter.stop();
                tracing::debug!(
                    filter = %slot.filter.id(),
                    kind = %slot.filter.kind(),
                    "Sole subscriber left; filter marked for removal"
                );
            }
        }
    }

    /// Replay each filter's full backlog to one client.
    pub async fn replay_to(&self, client: ClientId, kinds: &[EventKind]) -> ChainResult<()> {
        for &kind in kinds {
            let filter = {
                let Some(slot) = self.slots.get(&kind) else { continue };
                slot.filter.clone()
            };
            let entries = filter.get_all_entries().await?;
            for raw in entries {
                if let Some(msg) = decode_entry(&self.registry, kind, &raw) {
                    self.bus.send_to(client, msg);
                }
            }
        }
        Ok(())
    }

    /// Live filters with their subscriber counts, for the management surface.
    pub fn active_filters(&self) -> Vec<(EventKind, FilterId, usize)> {
        self.slots
            .iter()
            .map(|slot| (*slot.key(), slot.filter.id(), slot.subscribers.len()))
            .collect()
    }

    /// Stop every filter and wait for in-flight polls to drain, up to
    /// `deadline`, then give up.
    pub async fn shutdown(&self, deadline: Duration) {
        let _ = self.shutdown_tx.send(());
        for slot in self.slots.iter() {
            slot.filter.stop();
        }
        let handles: Vec<JoinHandle<()>> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(deadline, drain).await.is_err() {
            tracing::warn!("Filter drain deadline exceeded, forcing shutdown");
        }
        self.slots.clear();
        self.running.clear();
    }
}

/// This group's live filters in causal kind order, pruning stopped slots
/// along the way.
fn group_members(slots: &FilterTable, group: PollGroup) -> Vec<Arc<ContractFilter>> {
    let mut stopped = Vec::new();
    let mut members = Vec::new();
    for slot in slots.iter() {
        if slot.group != group {
            continue;
        }
        if slot.filter.is_stopped() {
            stopped.push((*slot.key(), slot.filter.clone()));
        } else {
            members.push(slot.filter.clone());
        }
    }
    for (kind, filter) in stopped {
        slots.remove_if(&kind, |_, slot| Arc::ptr_eq(&slot.filter, &filter));
    }
    members.sort_by_key(|filter| filter.kind());
    members
}

fn note_failure(bus: &MessageBus, filter: &ContractFilter, threshold: u32, error: &ChainError) {
    let failures = filter.record_failure();
    tracing::warn!(
        filter = %filter.id(),
        error = %error,
        failures,
        "Transient poll failure, retrying on next tick"
    );
    if failures == threshold {
        bus.notify(
            filter.kind(),
            &WsMessage::error(format!(
                "filter for '{}' degraded after {} consecutive failures",
                filter.kind(),
                failures
            )),
        );
        metrics::record_filter_degraded(filter.kind().as_str());
    }
}

/// Decode one raw entry into its message, skipping (with a log line) entries
/// that fail; siblings keep flowing and the cursor stays advanced.
fn decode_entry(registry: &SchemaRegistry, kind: EventKind, raw: &RawLogEntry) -> Option<WsMessage> {
    let registered = registry.get(kind)?;
    match decode(raw, &registered.schema) {
        Ok(payload) => WsMessage::from_decoded(kind, payload, raw),
        Err(e) => {
            tracing::warn!(
                kind = %kind,
                block = raw.block_number,
                error = %e,
                "Skipping entry that failed to decode"
            );
            metrics::record_decode_failure(kind.as_str());
            None
        }
    }
}

/// Decode and fan out one poll's entries, preserving their order.
fn dispatch(
    registry: &SchemaRegistry,
    bus: &MessageBus,
    kind: EventKind,
    entries: Vec<RawLogEntry>,
) {
    metrics::record_entries(kind.as_str(), entries.len() as u64);
    for raw in entries {
        if let Some(msg) = decode_entry(registry, kind, &raw) {
            bus.broadcast(&msg);
        }
    }
}
