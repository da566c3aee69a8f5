// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Stage composition: the ordered list of map/filter/each stages and the
//! dispatcher that runs one record through it.
//!
//! Every stage is one of three variants:
//! - **Transform**: projects a record into the record that continues
//! - **Predicate**: drops records that fail a test, without error
//! - **Effect**: observes a record and passes it through unchanged
//!
//! Closures registered through `Stream::map`, `filter`, `each` and their async
//! forms are wrapped into the adapters below; custom stage types implement the
//! traits in [`crate::traits`] directly and are registered with `Stream::pipe`.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::errors::StageError;
use crate::observability::messages::stage::{RecordFiltered, StageFailed};
use crate::observability::messages::StructuredLog;
use crate::record::Record;
use crate::traits::{Effect, Predicate, Transform};

/// One registered stage.
#[derive(Clone)]
pub enum Stage {
    Transform(Arc<dyn Transform>),
    Predicate(Arc<dyn Predicate>),
    Effect(Arc<dyn Effect>),
}

impl Stage {
    pub fn transform(stage: impl Transform + 'static) -> Self {
        Stage::Transform(Arc::new(stage))
    }

    pub fn predicate(stage: impl Predicate + 'static) -> Self {
        Stage::Predicate(Arc::new(stage))
    }

    pub fn effect(stage: impl Effect + 'static) -> Self {
        Stage::Effect(Arc::new(stage))
    }

    pub fn name(&self) -> &str {
        match self {
            Stage::Transform(stage) => stage.name(),
            Stage::Predicate(stage) => stage.name(),
            Stage::Effect(stage) => stage.name(),
        }
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            Stage::Transform(_) => "Transform",
            Stage::Predicate(_) => "Predicate",
            Stage::Effect(_) => "Effect",
        };
        f.debug_tuple(variant).field(&self.name()).finish()
    }
}

/// Result of running one record through the stage list.
#[derive(Debug)]
pub(crate) enum StageOutcome {
    /// The record left the last stage.
    Passed(Record),
    /// A predicate at `stage` rejected the record.
    Dropped { stage: usize },
}

/// Runs `record` through `stages` in registration order.
///
/// Stops at the first predicate that rejects the record or the first stage
/// that fails.
pub(crate) async fn run_stages(stages: &[Stage], mut record: Record) -> Result<StageOutcome, StageError> {
    for (index, stage) in stages.iter().enumerate() {
        match stage {
            Stage::Transform(transform) => {
                let key = record.key().to_string();
                record = match transform.apply(record).await {
                    Ok(next) => next,
                    Err(e) => return Err(stage_failed(index, transform.name(), &key, e)),
                };
            }
            Stage::Predicate(predicate) => {
                if !predicate.test(&record) {
                    RecordFiltered {
                        stage_index: index,
                        record_key: record.key(),
                    }
                    .log();
                    return Ok(StageOutcome::Dropped { stage: index });
                }
            }
            Stage::Effect(effect) => {
                if let Err(e) = effect.apply(&record).await {
                    return Err(stage_failed(index, effect.name(), record.key(), e));
                }
            }
        }
    }
    Ok(StageOutcome::Passed(record))
}

fn stage_failed(index: usize, name: &str, record_key: &str, error: anyhow::Error) -> StageError {
    StageFailed {
        stage_index: index,
        stage_name: name,
        record_key,
        error: &*error,
    }
    .log();
    StageError::new(index, name, record_key, error)
}

/// Sync closure as a transform.
pub(crate) struct MapFn<F>(pub F);

#[async_trait]
impl<F> Transform for MapFn<F>
where
    F: Fn(Record) -> anyhow::Result<Record> + Send + Sync,
{
    async fn apply(&self, record: Record) -> anyhow::Result<Record> {
        (self.0)(record)
    }
}

/// Async closure as a transform.
pub(crate) struct MapAsyncFn<F>(pub F);

#[async_trait]
impl<F, Fut> Transform for MapAsyncFn<F>
where
    F: Fn(Record) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Record>> + Send + 'static,
{
    async fn apply(&self, record: Record) -> anyhow::Result<Record> {
        (self.0)(record).await
    }
}

pub(crate) struct FilterFn<F>(pub F);

impl<F> Predicate for FilterFn<F>
where
    F: Fn(&Record) -> bool + Send + Sync,
{
    fn test(&self, record: &Record) -> bool {
        (self.0)(record)
    }
}

/// Sync closure as an effect.
pub(crate) struct EachFn<F>(pub F);

#[async_trait]
impl<F> Effect for EachFn<F>
where
    F: Fn(&Record) -> anyhow::Result<()> + Send + Sync,
{
    async fn apply(&self, record: &Record) -> anyhow::Result<()> {
        (self.0)(record)
    }
}

/// Async closure as an effect. The closure receives a clone of the record so
/// its future may outlive the borrow; the original passes through.
pub(crate) struct EachAsyncFn<F>(pub F);

#[async_trait]
impl<F, Fut> Effect for EachAsyncFn<F>
where
    F: Fn(Record) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn apply(&self, record: &Record) -> anyhow::Result<()> {
        (self.0)(record.clone()).await
    }
}

/// Pass-through effect registered by `to_array` when no stage exists.
pub(crate) struct PassThrough;

#[async_trait]
impl Effect for PassThrough {
    async fn apply(&self, _record: &Record) -> anyhow::Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "pass_through"
    }
}
