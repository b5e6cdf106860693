// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! The message bus: one mailbox per adapter, addressed by node name.
//!
//! The original transport was a process-local named-datagram socket per
//! adapter carrying the *pointer* to an envelope; moving the envelope by
//! value through a bounded channel keeps the same ownership transfer
//! without kernel copies. `send` never suspends: a full or unregistered
//! mailbox hands the envelope back to the caller, who retains ownership
//! and decides whether to drop, retry or count it.
//!
//! Ordering: envelopes from one sender to one receiver arrive in send
//! order (channel FIFO). There is no cross-sender ordering.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::BusError;
use crate::message::Envelope;
use crate::types::NodeName;

/// Default mailbox depth per adapter.
pub const MAILBOX_CAPACITY: usize = 256;

// =============================================================================
// MessageBus
// =============================================================================

/// Registry of adapter mailboxes.
#[derive(Clone)]
pub struct MessageBus {
    endpoints: Arc<DashMap<NodeName, mpsc::Sender<Envelope>>>,
    stats: Arc<AtomicBusStats>,
}

#[derive(Debug, Default)]
struct AtomicBusStats {
    sent: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time bus statistics.
#[derive(Debug, Default, Clone, Serialize)]
pub struct BusStats {
    /// Envelopes delivered to a mailbox.
    pub sent: u64,
    /// Envelopes refused (full, missing or closed mailbox).
    pub dropped: u64,
    /// Registered mailboxes.
    pub endpoints: u64,
}

impl MessageBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            endpoints: Arc::new(DashMap::new()),
            stats: Arc::new(AtomicBusStats::default()),
        }
    }

    /// Binds a mailbox under `name`, replacing any previous binding.
    pub fn bind(&self, name: NodeName) -> Mailbox {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        self.endpoints.insert(name.clone(), tx);
        Mailbox { name, rx }
    }

    /// Removes the mailbox bound under `name`.
    pub fn unbind(&self, name: &NodeName) {
        self.endpoints.remove(name);
    }

    /// Rebinds a mailbox under a new name, preserving the channel.
    ///
    /// Returns `false` when no mailbox is bound under `old`.
    pub fn rebind(&self, old: &NodeName, new: NodeName) -> bool {
        match self.endpoints.remove(old) {
            Some((_, tx)) => {
                self.endpoints.insert(new, tx);
                true
            }
            None => false,
        }
    }

    /// Returns `true` if a mailbox is bound under `name`.
    pub fn is_bound(&self, name: &NodeName) -> bool {
        self.endpoints.contains_key(name)
    }

    /// Delivers `envelope` to the mailbox of `envelope.receiver`.
    ///
    /// Never blocks. On failure the envelope comes back inside the error
    /// and the drop counter is bumped.
    pub fn send(&self, envelope: Envelope) -> Result<(), BusError<Envelope>> {
        let Some(endpoint) = self
            .endpoints
            .get(&envelope.receiver)
            .map(|e| e.value().clone())
        else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(BusError::NoSuchMailbox(envelope));
        };

        match endpoint.try_send(envelope) {
            Ok(()) => {
                self.stats.sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(envelope)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Err(BusError::MailboxFull(envelope))
            }
            Err(mpsc::error::TrySendError::Closed(envelope)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Err(BusError::MailboxClosed(envelope))
            }
        }
    }

    /// Returns current statistics.
    pub fn stats(&self) -> BusStats {
        BusStats {
            sent: self.stats.sent.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            endpoints: self.endpoints.len() as u64,
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("endpoints", &self.endpoints.len())
            .field("sent", &self.stats.sent.load(Ordering::Relaxed))
            .field("dropped", &self.stats.dropped.load(Ordering::Relaxed))
            .finish()
    }
}

// =============================================================================
// Mailbox
// =============================================================================

/// The receiving end of one adapter's mailbox.
pub struct Mailbox {
    name: NodeName,
    rx: mpsc::Receiver<Envelope>,
}

impl Mailbox {
    /// Returns the bound name.
    pub fn name(&self) -> &NodeName {
        &self.name
    }

    /// Receives the next envelope; `None` when the binding was replaced and
    /// all senders are gone.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }

    /// Consumes the mailbox into its raw receiver for reactor registration.
    pub fn into_receiver(self) -> mpsc::Receiver<Envelope> {
        self.rx
    }
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox").field("name", &self.name).finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
