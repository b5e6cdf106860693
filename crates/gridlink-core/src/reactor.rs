// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! The per-adapter reactor: timer and mailbox multiplexing.
//!
//! Each adapter owns exactly one reactor and polls it from its single
//! control task, so events are handled strictly serially. The capability
//! surface (`add_timer`, `del_timer`, `add_mailbox`, `poll`, `close`) is
//! platform-independent; tokio supplies the readiness machinery underneath.
//!
//! Timer kinds:
//!
//! - `NonBlock` timers tick at the nominal rate no matter how long event
//!   handling takes; delayed ticks fire in a burst.
//! - `Block` timers stay disarmed while their tick is being handled and
//!   re-arm once the [`TimerTick`] guard drops: a handler slower than the
//!   interval gets its next tick right after completion (one catch-up, no
//!   accumulation, no overlap), a faster one stays on the nominal schedule.
//!
//! `del_timer` guarantees that no tick for that timer is returned by `poll`
//! after it returns: the owner that could observe a tick is the caller
//! itself, and stale queued ticks are filtered out.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

use crate::message::Envelope;

/// Upper bound on registered timers plus sources per reactor.
///
/// Exceeding it is a fatal misconfiguration.
pub const EVENT_CAPACITY: usize = 1400;

// =============================================================================
// Ids & Events
// =============================================================================

/// Timer re-arm behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Tick at the nominal rate regardless of handling cost.
    NonBlock,
    /// Disarm across the tick; re-arm with the full interval on completion.
    Block,
}

/// Handle to a registered timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Handle to a registered event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

/// A delivered timer tick.
///
/// For `Block` timers the tick doubles as a completion guard: the timer
/// stays disarmed until this value drops.
#[derive(Debug)]
pub struct TimerTick {
    id: TimerId,
    rearm: Option<oneshot::Sender<()>>,
}

impl TimerTick {
    /// Returns the ticking timer's id.
    pub fn id(&self) -> TimerId {
        self.id
    }
}

impl Drop for TimerTick {
    fn drop(&mut self) {
        if let Some(rearm) = self.rearm.take() {
            let _ = rearm.send(());
        }
    }
}

/// Events delivered by [`Reactor::poll`].
#[derive(Debug)]
pub enum ReactorEvent {
    /// A timer fired.
    Tick(TimerTick),
    /// An envelope arrived on a registered mailbox.
    Mail(Envelope),
    /// A registered mailbox closed.
    SourceClosed(SourceId),
}

enum Internal {
    Tick {
        id: TimerId,
        rearm: Option<oneshot::Sender<()>>,
    },
    Mail(SourceId, Envelope),
    Closed(SourceId),
}

// =============================================================================
// Reactor
// =============================================================================

/// Timer/mailbox multiplexer serving one adapter.
pub struct Reactor {
    name: String,
    tx: mpsc::UnboundedSender<Internal>,
    rx: mpsc::UnboundedReceiver<Internal>,
    timers: HashMap<TimerId, JoinHandle<()>>,
    sources: HashMap<SourceId, JoinHandle<()>>,
    next_id: u64,
}

impl Reactor {
    /// Creates a reactor named after its adapter (for logging).
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            tx,
            rx,
            timers: HashMap::new(),
            sources: HashMap::new(),
            next_id: 0,
        }
    }

    fn check_capacity(&self) {
        let registered = self.timers.len() + self.sources.len();
        if registered >= EVENT_CAPACITY {
            // Fatal misconfiguration: the table never grows this large in a
            // correctly sized deployment.
            panic!(
                "reactor '{}' event table exhausted ({} events)",
                self.name, EVENT_CAPACITY
            );
        }
    }

    /// Registers a timer firing every `interval`, first fire one interval
    /// from now.
    pub fn add_timer(&mut self, interval: Duration, kind: TimerKind) -> TimerId {
        self.check_capacity();
        self.next_id += 1;
        let id = TimerId(self.next_id);
        let tx = self.tx.clone();

        let task = match kind {
            TimerKind::NonBlock => tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + interval, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
                loop {
                    ticker.tick().await;
                    if tx.send(Internal::Tick { id, rearm: None }).is_err() {
                        break;
                    }
                }
            }),
            TimerKind::Block => tokio::spawn(async move {
                let mut due = Instant::now() + interval;
                loop {
                    sleep_until(due).await;
                    let (rearm_tx, rearm_rx) = oneshot::channel();
                    if tx
                        .send(Internal::Tick {
                            id,
                            rearm: Some(rearm_tx),
                        })
                        .is_err()
                    {
                        break;
                    }
                    // Disarmed until the tick guard drops.
                    if rearm_rx.await.is_err() {
                        break;
                    }
                    // A handler slower than the interval earns one immediate
                    // catch-up tick; missed expirations never accumulate.
                    due = (due + interval).max(Instant::now());
                }
            }),
        };

        tracing::debug!(reactor = %self.name, ?id, ?kind, ?interval, "added timer");
        self.timers.insert(id, task);
        id
    }

    /// Removes a timer. No tick for `id` is delivered after this returns.
    pub fn del_timer(&mut self, id: TimerId) {
        if let Some(task) = self.timers.remove(&id) {
            task.abort();
            tracing::debug!(reactor = %self.name, ?id, "removed timer");
        }
    }

    /// Registers a mailbox receiver as an event source.
    pub fn add_mailbox(&mut self, mut receiver: mpsc::Receiver<Envelope>) -> SourceId {
        self.check_capacity();
        self.next_id += 1;
        let id = SourceId(self.next_id);
        let tx = self.tx.clone();

        let task = tokio::spawn(async move {
            while let Some(envelope) = receiver.recv().await {
                if tx.send(Internal::Mail(id, envelope)).is_err() {
                    return;
                }
            }
            let _ = tx.send(Internal::Closed(id));
        });

        self.sources.insert(id, task);
        id
    }

    /// Removes an event source.
    pub fn del_source(&mut self, id: SourceId) {
        if let Some(task) = self.sources.remove(&id) {
            task.abort();
        }
    }

    /// Waits for the next event. Stale events of removed registrations are
    /// filtered out.
    pub async fn poll(&mut self) -> ReactorEvent {
        loop {
            // The reactor holds its own sender, so the channel cannot close.
            let Some(event) = self.rx.recv().await else {
                unreachable!("reactor event channel closed while reactor alive");
            };
            match event {
                Internal::Tick { id, rearm } => {
                    if self.timers.contains_key(&id) {
                        return ReactorEvent::Tick(TimerTick { id, rearm });
                    }
                }
                Internal::Mail(source, envelope) => {
                    if self.sources.contains_key(&source) {
                        return ReactorEvent::Mail(envelope);
                    }
                }
                Internal::Closed(source) => {
                    if self.sources.remove(&source).is_some() {
                        return ReactorEvent::SourceClosed(source);
                    }
                }
            }
        }
    }

    /// Stops all feeder tasks.
    pub fn close(&mut self) {
        for (_, task) in self.timers.drain() {
            task.abort();
        }
        for (_, task) in self.sources.drain() {
            task.abort();
        }
        tracing::debug!(reactor = %self.name, "reactor closed");
    }

    /// Number of registered timers and sources.
    pub fn registered(&self) -> usize {
        self.timers.len() + self.sources.len()
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("name", &self.name)
            .field("timers", &self.timers.len())
            .field("sources", &self.sources.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::message::{Body, RespError};
    use tokio::time::{advance, timeout};

    async fn next_tick(reactor: &mut Reactor) -> TimerTick {
        match reactor.poll().await {
            ReactorEvent::Tick(tick) => tick,
            other => panic!("expected tick, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_nonblock_timer_nominal_rate() {
        let mut reactor = Reactor::new("t");
        let id = reactor.add_timer(Duration::from_millis(100), TimerKind::NonBlock);

        let start = Instant::now();
        for _ in 0..3 {
            let tick = next_tick(&mut reactor).await;
            assert_eq!(tick.id(), id);
        }
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_timer_slow_handler_catches_up_without_overlap() {
        let mut reactor = Reactor::new("t");
        reactor.add_timer(Duration::from_millis(100), TimerKind::Block);

        let tick = next_tick(&mut reactor).await;
        // Simulate a handler slower than the interval.
        advance(Duration::from_millis(250)).await;
        drop(tick);

        // One catch-up tick right after completion, never an overlapping one.
        let start = Instant::now();
        let tick = next_tick(&mut reactor).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        drop(tick);

        // Back on schedule afterwards: the next fire is one interval out.
        let start = Instant::now();
        let _tick = next_tick(&mut reactor).await;
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_timer_fast_handler_keeps_nominal_cadence() {
        let mut reactor = Reactor::new("t");
        reactor.add_timer(Duration::from_millis(100), TimerKind::Block);

        let start = Instant::now();
        for _ in 0..3 {
            let tick = next_tick(&mut reactor).await;
            // A handler faster than the interval.
            advance(Duration::from_millis(10)).await;
            drop(tick);
        }
        assert_eq!(start.elapsed(), Duration::from_millis(310));
    }

    #[tokio::test(start_paused = true)]
    async fn test_del_timer_suppresses_pending_ticks() {
        let mut reactor = Reactor::new("t");
        let id = reactor.add_timer(Duration::from_millis(10), TimerKind::NonBlock);

        let tick = next_tick(&mut reactor).await;
        drop(tick);
        // Let several ticks queue, then delete.
        advance(Duration::from_millis(50)).await;
        reactor.del_timer(id);

        let result = timeout(Duration::from_millis(200), reactor.poll()).await;
        assert!(result.is_err(), "no tick may arrive after del_timer");
    }

    #[tokio::test]
    async fn test_mailbox_source() {
        let mut reactor = Reactor::new("t");
        let (tx, rx) = mpsc::channel(8);
        let source = reactor.add_mailbox(rx);

        let env = Envelope::new(
            "a",
            "b",
            Body::RespError(RespError {
                error: ErrorCode::Success,
            }),
        );
        tx.send(env.clone()).await.unwrap();
        match reactor.poll().await {
            ReactorEvent::Mail(received) => assert_eq!(received, env),
            other => panic!("expected mail, got {:?}", other),
        }

        drop(tx);
        match reactor.poll().await {
            ReactorEvent::SourceClosed(id) => assert_eq!(id, source),
            other => panic!("expected closed, got {:?}", other),
        }
        assert_eq!(reactor.registered(), 0);
    }

    #[tokio::test]
    #[should_panic(expected = "event table exhausted")]
    async fn test_event_capacity_is_fatal() {
        let mut reactor = Reactor::new("t");
        for _ in 0..=EVENT_CAPACITY {
            reactor.add_timer(Duration::from_secs(3600), TimerKind::NonBlock);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_delivery() {
        let mut reactor = Reactor::new("t");
        reactor.add_timer(Duration::from_millis(10), TimerKind::NonBlock);
        reactor.close();
        let result = timeout(Duration::from_millis(100), reactor.poll()).await;
        assert!(result.is_err());
    }
}
