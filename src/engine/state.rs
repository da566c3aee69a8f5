// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Engine state: the queue, the stage list and the readiness flags, all owned
//! by a single mutex in [`Shared`](super::stream::Shared).

use std::collections::VecDeque;
use std::sync::Arc;

use crate::errors::StageError;
use crate::record::Record;

use super::stages::Stage;

/// Observable lifecycle phase of a stream.
///
/// ```text
/// Idle -> Running <-> Paused -> Draining -> Ended
///   any non-terminal phase -> Failed | Destroyed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No consumer or no stage yet; writes are held.
    Idle,
    /// Dispatching queued records.
    Running,
    /// Dispatch of new records halted; in-flight records finish.
    Paused,
    /// `end()` was called and the queue is empty; in-flight records finish.
    Draining,
    Ended,
    Failed,
    Destroyed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Ended | Phase::Failed | Phase::Destroyed)
    }
}

/// A queued unit of work.
#[derive(Debug)]
pub(crate) enum Entry {
    Record(Record),
    /// An error value written by the producer; fails the stream when dispatched.
    Poison(anyhow::Error),
}

pub(crate) struct EngineState {
    pub queue: VecDeque<Entry>,
    pub stages: Arc<Vec<Stage>>,
    /// A terminal consumer (`done`, `to_array`) is attached.
    pub consumed: bool,
    /// At least one stage is registered.
    pub pipeline_attached: bool,
    /// Set once, when `consumed` and `pipeline_attached` first both hold.
    pub ready: bool,
    /// The worker pool has been spawned. Lags `ready` when readiness was
    /// reached outside a runtime.
    pub workers_started: bool,
    pub paused: bool,
    /// The producer side is closed.
    pub full: bool,
    pub ended: bool,
    pub failure: Option<StageError>,
    pub destroyed: bool,
    /// Records leaving the last stage are accumulated into `results`.
    pub collecting: bool,
    pub results: Vec<Record>,
    pub running: usize,
    pub processed: usize,
    pub written: usize,
    pub waiting_writers: usize,
}

impl EngineState {
    pub fn new(seed: Vec<Record>, full: bool) -> Self {
        let written = seed.len();
        Self {
            queue: seed.into_iter().map(Entry::Record).collect(),
            stages: Arc::new(Vec::new()),
            consumed: false,
            pipeline_attached: false,
            ready: false,
            workers_started: false,
            paused: false,
            full,
            ended: false,
            failure: None,
            destroyed: false,
            collecting: false,
            results: Vec::new(),
            running: 0,
            processed: 0,
            written,
            waiting_writers: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.destroyed {
            Phase::Destroyed
        } else if self.failure.is_some() {
            Phase::Failed
        } else if self.ended {
            Phase::Ended
        } else if !self.ready {
            Phase::Idle
        } else if self.full && self.queue.is_empty() {
            Phase::Draining
        } else if self.paused {
            Phase::Paused
        } else {
            Phase::Running
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.ended || self.failure.is_some() || self.destroyed
    }

    /// `write` may begin: producer side open and engine not terminal.
    pub fn accepts_writes(&self) -> bool {
        !self.full && !self.is_terminal()
    }

    /// A waiting write may enqueue now.
    pub fn can_enqueue(&self, high_water_mark: usize) -> bool {
        self.ready && !self.paused && self.queue.len() < high_water_mark
    }

    /// Everything written has been dispatched and finished.
    pub fn is_drained(&self) -> bool {
        self.full
            && !self.is_terminal()
            && self.queue.is_empty()
            && self.running == 0
            && self.waiting_writers == 0
    }

    /// Records queued but not yet dispatched.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
