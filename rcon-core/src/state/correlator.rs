//! Request/response correlation.
//!
//! Tracks in-flight commands and hands each inbound response to the
//! caller that is waiting for it. Source-style packets are matched by
//! id. The opcode variant has no id on the wire, so responses are
//! matched to the oldest outstanding request.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::error::RconError;
use crate::opcode::WireVariant;
use crate::packet::Packet;

/// Completion side of a pending `execute()` call.
pub type Reply = oneshot::Sender<Result<String, RconError>>;

// ── PendingRequest ───────────────────────────────────────────────

/// A command that has been sent and not yet answered.
#[derive(Debug)]
pub struct PendingRequest {
    /// Sequence id (queue position on the opcode variant).
    pub id: i32,
    /// The command text, for logs and timeout errors.
    pub command: String,
    /// When the request was registered.
    pub sent_at: Instant,
    /// How long the caller is willing to wait. An abandoned slot is
    /// dropped once this has passed.
    pub deadline: Duration,
    /// `None` once the caller gave up: the slot only absorbs a late reply.
    reply: Option<Reply>,
}

impl PendingRequest {
    /// Whether a caller is still waiting on this request.
    pub fn is_live(&self) -> bool {
        self.reply.is_some()
    }

    fn is_expired(&self, now: Instant) -> bool {
        !self.is_live() && now.saturating_duration_since(self.sent_at) >= self.deadline
    }
}

/// What happened to an inbound packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Handed to the waiting caller.
    Delivered { id: i32 },
    /// Answer to a request whose caller already timed out or cancelled.
    Stale { id: i32, command: String },
    /// No request to match it against.
    Unmatched { id: Option<i32> },
}

// ── Correlator ───────────────────────────────────────────────────

/// Outstanding requests of one connection.
#[derive(Debug)]
pub struct Correlator {
    variant: WireVariant,
    /// Keyed by id. Ids are allocated increasing, so key order is
    /// send order, which is what FIFO matching needs.
    requests: BTreeMap<i32, PendingRequest>,
}

impl Correlator {
    pub fn new(variant: WireVariant) -> Self {
        Self {
            variant,
            requests: BTreeMap::new(),
        }
    }

    /// Register a request. Reusing an id that is still pending is a
    /// caller error.
    pub fn track(
        &mut self,
        id: i32,
        command: impl Into<String>,
        deadline: Duration,
        reply: Reply,
    ) -> Result<(), RconError> {
        if self.requests.contains_key(&id) {
            return Err(RconError::ProtocolViolation("request id already in flight"));
        }
        self.requests.insert(
            id,
            PendingRequest {
                id,
                command: command.into(),
                sent_at: Instant::now(),
                deadline,
                reply: Some(reply),
            },
        );
        Ok(())
    }

    /// Route an inbound response to its request.
    pub fn dispatch(&mut self, packet: &Packet) -> Dispatch {
        let entry = if self.variant.has_ids() {
            let id = packet.id().unwrap_or_default();
            match self.requests.remove(&id) {
                Some(req) => req,
                None => return Dispatch::Unmatched { id: Some(id) },
            }
        } else {
            self.discard_expired(Instant::now());
            match self.requests.pop_first() {
                Some((_, req)) => req,
                None => return Dispatch::Unmatched { id: None },
            }
        };

        let PendingRequest {
            id, command, reply, ..
        } = entry;
        match reply {
            Some(reply) => match reply.send(Ok(packet.text())) {
                Ok(()) => Dispatch::Delivered { id },
                // Receiver dropped between timeout and guard cleanup.
                Err(_) => Dispatch::Stale { id, command },
            },
            None => Dispatch::Stale { id, command },
        }
    }

    /// Stop waiting for `id`.
    ///
    /// On the Source variant the entry is removed and a late reply will
    /// be unmatched. On the opcode variant the slot stays queued until
    /// its deadline so a late reply is absorbed instead of reaching the
    /// next caller. Returns `true` if a live request was cancelled.
    pub fn cancel(&mut self, id: i32) -> bool {
        if self.variant.has_ids() {
            return self
                .requests
                .remove(&id)
                .is_some_and(|req| req.is_live());
        }
        match self.requests.get_mut(&id) {
            Some(req) => req.reply.take().is_some(),
            None => false,
        }
    }

    /// Reject every live request with `error` and forget all slots.
    /// Returns how many callers were notified.
    pub fn fail_all(&mut self, error: &RconError) -> usize {
        let mut failed = 0;
        for (_, req) in std::mem::take(&mut self.requests) {
            if let Some(reply) = req.reply {
                let _ = reply.send(Err(error.clone()));
                failed += 1;
            }
        }
        failed
    }

    /// Number of requests a caller is still waiting on.
    pub fn pending_count(&self) -> usize {
        self.requests.values().filter(|r| r.is_live()).count()
    }

    /// Number of abandoned slots waiting to absorb a late reply.
    pub fn stale_count(&self) -> usize {
        self.requests.len() - self.pending_count()
    }

    /// Forget abandoned slots whose deadline has passed by `now`.
    /// A reply that never came must not swallow the next caller's.
    pub fn discard_expired(&mut self, now: Instant) -> usize {
        let before = self.requests.len();
        self.requests.retain(|_, req| !req.is_expired(now));
        before - self.requests.len()
    }
}

// ── Tests ────────────────────────────────────────────────────────
