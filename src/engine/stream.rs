// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The stream engine: queue, readiness state machine and bounded worker pool.
//!
//! # Coordination
//!
//! All engine state lives in one [`EngineState`] behind a single mutex. Every
//! transition (stage attached, consumer attached, write, dispatch, completion,
//! pause, end, destroy) happens under that lock and is followed by a wake-up of
//! everything waiting on the shared [`Notify`]: idle workers and suspended
//! writers re-check their condition and either proceed or wait again. The lock
//! is never held across an `.await`.
//!
//! The terminal outcome is published once through a `watch` channel, so every
//! `done()` and `to_array()` caller, including ones attached after the stream
//! finished, observes the same result.
//!
//! # Readiness
//!
//! Nothing is dispatched until both a stage and a terminal consumer are
//! attached. At that instant the engine becomes ready (never to revert) and
//! spawns `concurrency` workers onto the current Tokio runtime. Each worker
//! pulls one record at a time, so at most `concurrency` records are
//! mid-pipeline, and with a single worker records finish in write order.
//!
//! # Termination
//!
//! * **End**: after `end()`, the stream ends once the queue is empty, no record
//!   is in flight and no write is still waiting.
//! * **Failure**: the first stage error discards every queued record, drops
//!   accumulated results and fails all completions with that error. In-flight
//!   records finish but are not accumulated.
//! * **Destroy**: dispatch stops at once, in-flight stage futures are cancelled
//!   and all bookkeeping is dropped.
//! * **Abandon**: dropping every `Stream`, `Producer` and pending completion
//!   of an unfinished stream destroys it, so idle workers exit and release
//!   the engine.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;

use crate::config::StreamOptions;
use crate::errors::{StageError, StreamError};
use crate::observability::messages::engine::{
    EndRequested, StreamAbandoned, StreamCreated, StreamDestroyed, StreamDrained, StreamFailed,
    StreamPaused, StreamReady, StreamResumed, WorkersDeferred,
};
use crate::observability::messages::StructuredLog;
use crate::record::{Record, RecordOptions};
use crate::traits::{Effect, Predicate, Transform};

use super::producer::{Input, Producer, Written};
use super::stages::{EachAsyncFn, EachFn, FilterFn, MapAsyncFn, MapFn, PassThrough, Stage, StageOutcome};
use super::state::{EngineState, Entry, Phase};
use super::worker::run_worker;

type Outcome = Option<Result<(), StreamError>>;

/// State shared between the stream handle, producers, completions and workers.
pub(crate) struct Shared {
    pub options: StreamOptions,
    state: Mutex<EngineState>,
    wakeup: Notify,
    outcome: watch::Sender<Outcome>,
    pub cancel: CancellationToken,
    started: Instant,
}

impl Shared {
    fn new(options: StreamOptions, state: EngineState) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            options: options.normalized(),
            state: Mutex::new(state),
            wakeup: Notify::new(),
            outcome,
            cancel: CancellationToken::new(),
            started: Instant::now(),
        }
    }

    /// Locks the engine state. A panic in another holder leaves the state
    /// consistent (every transition is a few field writes), so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wake_all(&self) {
        self.wakeup.notify_waiters();
    }

    /// Flips the engine to ready and starts the worker pool, the first time a
    /// consumer and a stage are both attached.
    fn maybe_start(self: &Arc<Self>, state: &mut EngineState) {
        if state.ready || state.is_terminal() || !(state.consumed && state.pipeline_attached) {
            return;
        }
        state.ready = true;

        StreamReady {
            concurrency: self.options.concurrency,
            stage_count: state.stages.len(),
            queued: state.pending(),
        }
        .log();

        self.spawn_workers(state);
        self.wake_all();
    }

    /// Spawns the worker pool onto the current runtime. Outside a runtime the
    /// start is deferred to [`ensure_workers`](Shared::ensure_workers).
    fn spawn_workers(self: &Arc<Self>, state: &mut EngineState) {
        match Handle::try_current() {
            Ok(handle) => {
                for id in 0..self.options.concurrency {
                    handle.spawn(run_worker(self.clone(), id));
                }
                state.workers_started = true;
            }
            Err(_) => WorkersDeferred {
                concurrency: self.options.concurrency,
            }
            .log(),
        }
    }

    /// Starts a deferred worker pool. Called from async entry points, which
    /// always run inside a runtime.
    pub fn ensure_workers(self: &Arc<Self>) {
        let mut state = self.lock();
        if state.ready && !state.workers_started && !state.is_terminal() {
            self.spawn_workers(&mut state);
            self.wake_all();
        }
    }

    fn publish(&self, outcome: Result<(), StreamError>) {
        if self.outcome.borrow().is_none() {
            self.outcome.send_replace(Some(outcome));
        }
    }

    /// Ends the stream if everything written has been processed.
    fn try_finish(&self, state: &mut EngineState) {
        if !state.is_drained() {
            return;
        }
        state.ended = true;

        StreamDrained {
            processed: state.processed,
            written: state.written,
            duration: self.started.elapsed(),
        }
        .log();

        self.publish(Ok(()));
        self.wake_all();
    }

    /// Records the first stage failure and discards all undispatched work.
    fn fail(&self, state: &mut EngineState, error: StageError) {
        if state.is_terminal() {
            return;
        }
        let discarded = state.queue.len();
        state.queue.clear();
        state.results.clear();

        StreamFailed {
            processed: state.processed,
            discarded,
            error: &error,
        }
        .log();

        state.failure = Some(error.clone());
        self.publish(Err(StreamError::Stage(error)));
        self.wake_all();
    }

    /// Waits for the next entry to dispatch. Returns `None` once the stream is
    /// finished and the worker should exit.
    pub async fn next_entry(&self) -> Option<(Entry, Arc<Vec<Stage>>)> {
        loop {
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.is_terminal() {
                    return None;
                }
                if !state.paused {
                    if let Some(entry) = state.queue.pop_front() {
                        state.running += 1;
                        let stages = state.stages.clone();
                        // Queue space freed for suspended writers.
                        self.wake_all();
                        return Some((entry, stages));
                    }
                }
            }

            notified.await;
        }
    }

    /// Books the result of one dispatched entry.
    pub fn complete(&self, outcome: Result<StageOutcome, StageError>) {
        let mut state = self.lock();
        if state.destroyed {
            return;
        }
        state.running = state.running.saturating_sub(1);

        match outcome {
            Ok(StageOutcome::Passed(record)) => {
                state.processed += 1;
                if state.collecting && state.failure.is_none() {
                    state.results.push(record);
                }
            }
            Ok(StageOutcome::Dropped { .. }) => state.processed += 1,
            Err(error) => self.fail(&mut state, error),
        }

        self.try_finish(&mut state);
        self.wake_all();
    }

    /// Suspends until `entries` may be enqueued, then enqueues them.
    pub async fn enqueue(&self, entries: Vec<Entry>) -> Result<(), StreamError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut slot = WriterSlot::register(self)?;
        let mut entries = Some(entries);

        loop {
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.is_terminal() {
                    return Err(StreamError::StreamEnded);
                }
                if state.can_enqueue(self.options.high_water_mark) {
                    if let Some(entries) = entries.take() {
                        state.written += entries
                            .iter()
                            .filter(|entry| matches!(entry, Entry::Record(_)))
                            .count();
                        state.queue.extend(entries);
                    }
                    slot.release(&mut state);
                    self.wake_all();
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    pub fn end(&self) {
        let mut state = self.lock();
        if state.full || state.is_terminal() {
            return;
        }
        state.full = true;

        EndRequested {
            pending: state.pending(),
            running: state.running,
        }
        .log();

        self.try_finish(&mut state);
        self.wake_all();
    }

    /// Drops all work and fails every completion with `Destroyed`.
    fn tear_down(&self, state: &mut EngineState) {
        state.destroyed = true;
        state.queue.clear();
        state.results.clear();
        state.running = 0;
        state.waiting_writers = 0;

        self.cancel.cancel();
        self.publish(Err(StreamError::Destroyed));
        self.wake_all();
    }

    pub fn destroy(&self) {
        let mut state = self.lock();
        if state.destroyed {
            return;
        }
        StreamDestroyed {
            discarded: state.pending(),
            running: state.running,
        }
        .log();
        self.tear_down(&mut state);
    }

    /// The last handle is gone: nobody can write, end or await the stream.
    fn abandon(&self) {
        let mut state = self.lock();
        if state.is_terminal() {
            self.cancel.cancel();
            return;
        }
        StreamAbandoned {
            discarded: state.pending(),
            running: state.running,
        }
        .log();
        self.tear_down(&mut state);
    }

    async fn wait_outcome(self: &Arc<Self>) -> Result<(), StreamError> {
        self.ensure_workers();
        let mut rx = self.outcome.subscribe();
        let outcome = rx.wait_for(Option::is_some).await.map(|outcome| outcome.clone());
        match outcome {
            Ok(Some(result)) => result,
            _ => Err(StreamError::Destroyed),
        }
    }
}

/// A user-facing reference to the engine, held by `Stream`, `Producer` and
/// pending completions. Workers hold [`Shared`] directly and exit once the
/// stream is terminal, so when the last owner drops the engine is freed.
pub(crate) struct Owner {
    shared: Arc<Shared>,
}

impl Owner {
    pub fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}

impl Drop for Owner {
    fn drop(&mut self) {
        self.shared.abandon();
    }
}

/// Counts a suspended writer so the stream cannot end under it. Dropping the
/// slot (the write future was cancelled, or it failed) releases the count.
struct WriterSlot<'a> {
    shared: &'a Shared,
    active: bool,
}

impl<'a> WriterSlot<'a> {
    fn register(shared: &'a Shared) -> Result<Self, StreamError> {
        let mut state = shared.lock();
        if !state.accepts_writes() {
            return Err(StreamError::StreamClosed);
        }
        state.waiting_writers += 1;
        Ok(Self { shared, active: true })
    }

    fn release(&mut self, state: &mut EngineState) {
        if self.active {
            state.waiting_writers = state.waiting_writers.saturating_sub(1);
            self.active = false;
        }
    }
}

impl Drop for WriterSlot<'_> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let mut state = self.shared.lock();
        self.release(&mut state);
        self.shared.try_finish(&mut state);
        self.shared.wake_all();
    }
}

/// Counters describing a stream's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamStats {
    /// Records whose stage chain completed, including ones a filter dropped.
    pub processed: usize,
    /// Records currently mid-pipeline.
    pub running: usize,
    /// Records queued but not yet dispatched.
    pub pending: usize,
    /// Records accepted by `write`, plus any seeded records.
    pub written: usize,
}

/// A backpressure-aware record stream.
///
/// Register stages with [`map`](Stream::map), [`filter`](Stream::filter) and
/// [`each`](Stream::each), attach a consumer with [`done`](Stream::done) or
/// [`to_array`](Stream::to_array), write records, then [`end`](Stream::end).
///
/// Handles are cheap to clone and all refer to the same engine.
///
/// The worker pool is spawned onto the current Tokio runtime when the stream
/// becomes ready. Outside a runtime the start is deferred until the first
/// `write` or awaited completion.
///
/// Dropping every handle (streams, producers and unawaited completions) of an
/// unfinished stream destroys it. A stage closure that captures a `Stream`
/// clone keeps the stream alive until it ends, fails or is destroyed.
///
/// # Example
///
/// ```rust
/// use record_stream::config::StreamOptions;
/// use record_stream::engine::Stream;
/// use record_stream::record::{Record, RecordOptions};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let stream = Stream::new(StreamOptions::default());
/// let results = stream
///     .map(|record: Record| {
///         let upper = record.as_string().to_uppercase();
///         Ok(record.with_data(upper))
///     })
///     .filter(|record: &Record| record.as_string() != "SKIP")
///     .to_array();
///
/// for word in ["hello", "skip", "world"] {
///     stream.write(word, RecordOptions::default()).await?;
/// }
/// stream.end();
///
/// let records = results.await?;
/// let words: Vec<_> = records.iter().map(|r| r.as_string().into_owned()).collect();
/// assert_eq!(words, vec!["HELLO", "WORLD"]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Stream {
    owner: Arc<Owner>,
}

impl Default for Stream {
    fn default() -> Self {
        Self::new(StreamOptions::default())
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("options", &self.shared().options)
            .field("phase", &self.phase())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Stream {
    pub fn new(options: StreamOptions) -> Self {
        Self::build(options, EngineState::new(Vec::new(), false))
    }

    /// A stream pre-filled with `records` whose producer side is already closed.
    pub fn from_records(records: Vec<Record>, options: StreamOptions) -> Self {
        Self::build(options, EngineState::new(records, true))
    }

    fn build(options: StreamOptions, state: EngineState) -> Self {
        let seeded = state.written;
        let shared = Shared::new(options, state);

        StreamCreated {
            concurrency: shared.options.concurrency,
            high_water_mark: shared.options.high_water_mark,
            seeded,
        }
        .log();

        Self {
            owner: Arc::new(Owner {
                shared: Arc::new(shared),
            }),
        }
    }

    fn shared(&self) -> &Arc<Shared> {
        self.owner.shared()
    }

    pub fn options(&self) -> StreamOptions {
        self.shared().options
    }

    /// A cloneable write handle for this stream.
    pub fn producer(&self) -> Producer {
        Producer::new(self.owner.clone())
    }

    /// See [`Producer::write`].
    pub async fn write(&self, input: impl Into<Input>, options: RecordOptions) -> Result<Written, StreamError> {
        self.producer().write(input, options).await
    }

    /// Signals that no further writes will occur. Idempotent.
    pub fn end(&self) -> &Self {
        self.shared().end();
        self
    }

    /// Halts dispatch of new records; records already mid-pipeline finish.
    pub fn pause(&self) -> &Self {
        let mut state = self.shared().lock();
        if !state.paused && !state.is_terminal() {
            state.paused = true;
            StreamPaused {
                running: state.running,
                pending: state.pending(),
            }
            .log();
        }
        self
    }

    pub fn resume(&self) -> &Self {
        let mut state = self.shared().lock();
        if state.paused {
            state.paused = false;
            StreamResumed {
                pending: state.pending(),
            }
            .log();
            self.shared().wake_all();
        }
        self
    }

    pub fn is_paused(&self) -> bool {
        self.shared().lock().paused
    }

    pub fn is_ended(&self) -> bool {
        self.shared().lock().ended
    }

    pub fn is_failed(&self) -> bool {
        self.shared().lock().failure.is_some()
    }

    pub fn phase(&self) -> Phase {
        self.shared().lock().phase()
    }

    pub fn stats(&self) -> StreamStats {
        let state = self.shared().lock();
        StreamStats {
            processed: state.processed,
            running: state.running,
            pending: state.pending(),
            written: state.written,
        }
    }

    /// Appends a stage to the pipeline.
    pub fn pipe(&self, stage: Stage) -> &Self {
        let mut state = self.shared().lock();
        Arc::make_mut(&mut state.stages).push(stage);
        state.pipeline_attached = true;
        self.shared().maybe_start(&mut state);
        self
    }

    /// Appends a transform stage.
    pub fn map<F>(&self, f: F) -> &Self
    where
        F: Fn(Record) -> anyhow::Result<Record> + Send + Sync + 'static,
    {
        self.pipe(Stage::transform(MapFn(f)))
    }

    /// Appends an asynchronous transform stage.
    pub fn map_async<F, Fut>(&self, f: F) -> &Self
    where
        F: Fn(Record) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Record>> + Send + 'static,
    {
        self.pipe(Stage::transform(MapAsyncFn(f)))
    }

    /// Appends a predicate stage; rejected records go no further.
    pub fn filter<F>(&self, f: F) -> &Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.pipe(Stage::predicate(FilterFn(f)))
    }

    /// Appends a side-effecting stage that passes records through unchanged.
    pub fn each<F>(&self, f: F) -> &Self
    where
        F: Fn(&Record) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.pipe(Stage::effect(EachFn(f)))
    }

    /// Appends an asynchronous side-effecting stage. The closure receives a
    /// clone of each record.
    pub fn each_async<F, Fut>(&self, f: F) -> &Self
    where
        F: Fn(Record) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.pipe(Stage::effect(EachAsyncFn(f)))
    }

    pub fn transform(&self, stage: impl Transform + 'static) -> &Self {
        self.pipe(Stage::transform(stage))
    }

    pub fn predicate(&self, stage: impl Predicate + 'static) -> &Self {
        self.pipe(Stage::predicate(stage))
    }

    pub fn effect(&self, stage: impl Effect + 'static) -> &Self {
        self.pipe(Stage::effect(stage))
    }

    fn attach_consumer(&self, collect: bool) {
        let mut state = self.shared().lock();
        state.consumed = true;
        if collect {
            state.collecting = true;
            if state.stages.is_empty() {
                Arc::make_mut(&mut state.stages).push(Stage::effect(PassThrough));
                state.pipeline_attached = true;
            }
        }
        self.shared().maybe_start(&mut state);
    }

    /// Attaches the terminal consumer and returns its completion.
    ///
    /// The consumer is attached when `done` is called, not when the returned
    /// future is first polled. The future resolves once the stream has ended,
    /// or fails with the first stage error.
    pub fn done(&self) -> impl Future<Output = Result<(), StreamError>> + Send + 'static {
        self.attach_consumer(false);
        let owner = self.owner.clone();
        async move { owner.shared().wait_outcome().await }
    }

    /// Like [`done`](Stream::done), but accumulates every record leaving the
    /// pipeline and resolves with them. Registers a pass-through stage when no
    /// stage exists yet.
    pub fn to_array(&self) -> impl Future<Output = Result<Vec<Record>, StreamError>> + Send + 'static {
        self.attach_consumer(true);
        let owner = self.owner.clone();
        async move {
            owner.shared().wait_outcome().await?;
            let results = owner.shared().lock().results.clone();
            Ok(results)
        }
    }

    /// Collects this stream and returns a new, already-closed stream seeded
    /// with the collected records and the same options.
    pub async fn into_stream(self) -> Result<Stream, StreamError> {
        let records = self.to_array().await?;
        Ok(Stream::from_records(records, self.options()))
    }

    /// Stops the stream immediately without draining.
    ///
    /// Queued records are discarded, in-flight stages are cancelled, pending
    /// writes and completions fail with [`StreamError::Destroyed`] (writes with
    /// [`StreamError::StreamEnded`]), and the stream accepts nothing further.
    pub fn destroy(&self) {
        self.shared().destroy();
    }
}
