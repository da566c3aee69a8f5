// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;
use tokio::task::JoinError;
use tracing::Instrument;

use crate::errors::StageError;
use crate::observability::messages::stage::{PoisonDispatched, RecordDispatched, StagePanicked};
use crate::observability::messages::StructuredLog;

use super::stages::run_stages;
use super::state::Entry;
use super::stream::Shared;

/// One member of the worker pool: pulls entries until the stream finishes.
///
/// Each record runs in its own task so a panicking stage surfaces as a join
/// error and fails the stream instead of taking the worker down with it. The
/// task is raced against the stream's cancellation token so that `destroy()`
/// abandons in-flight work instead of waiting for it.
pub(crate) async fn run_worker(shared: Arc<Shared>, id: usize) {
    tracing::trace!(worker = id, "worker started");

    while let Some((entry, stages)) = shared.next_entry().await {
        let outcome = match entry {
            Entry::Record(record) => {
                let dispatched = RecordDispatched {
                    record_key: record.key(),
                    payload_kind: record.data.kind(),
                    stage_count: stages.len(),
                };
                dispatched.log();
                let span = dispatched.span("dispatch");
                let record_key = record.key().to_string();

                let mut task = tokio::spawn(async move { run_stages(&stages, record).await }.instrument(span));

                tokio::select! {
                    biased;
                    _ = shared.cancel.cancelled() => {
                        task.abort();
                        break;
                    }
                    joined = &mut task => match joined {
                        Ok(result) => result,
                        Err(join_error) => Err(stage_panicked(&record_key, join_error)),
                    },
                }
            }
            Entry::Poison(error) => {
                PoisonDispatched { error: &*error }.log();
                Err(StageError::poisoned(error))
            }
        };

        shared.complete(outcome);
    }

    tracing::trace!(worker = id, "worker stopped");
}

fn stage_panicked(record_key: &str, join_error: JoinError) -> StageError {
    let message = if join_error.is_panic() {
        let payload = join_error.into_panic();
        if let Some(text) = payload.downcast_ref::<&str>() {
            text.to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "stage panicked".to_string()
        }
    } else {
        format!("stage task failed: {}", join_error)
    };

    StagePanicked {
        record_key,
        message: &message,
    }
    .log();
    StageError::panicked(record_key, &message)
}
