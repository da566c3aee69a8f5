use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};

use crate::config::StreamOptions;
use crate::engine::{Phase, Stage, Stream, Written};
use crate::errors::StreamError;
use crate::record::{Record, RecordOptions};
use crate::traits::Transform;

/// End-to-end tests for the stream engine using closure and trait stages
#[cfg(test)]
mod tests {
    use super::*;

    const BATCH_SIZE: usize = 100;

    fn indexed(i: usize) -> Value {
        json!({ "index": i })
    }

    fn index_of(record: &Record) -> usize {
        record.as_json().unwrap()["index"].as_u64().unwrap() as usize
    }

    async fn write_indexed(stream: &Stream, count: usize) {
        for i in 0..count {
            stream.write(indexed(i), RecordOptions::default()).await.unwrap();
        }
        stream.end();
    }

    #[tokio::test]
    async fn test_single_worker_preserves_write_order() {
        let stream = Stream::new(StreamOptions::default());
        let observed = Arc::new(Mutex::new(Vec::new()));

        let sink = observed.clone();
        let done = stream
            .each(move |record: &Record| {
                sink.lock().unwrap().push(index_of(record));
                Ok(())
            })
            .done();

        write_indexed(&stream, BATCH_SIZE).await;
        done.await.unwrap();

        let observed = observed.lock().unwrap().clone();
        assert_eq!(observed, (0..BATCH_SIZE).collect::<Vec<_>>());
        assert!(stream.is_ended());
    }

    #[tokio::test]
    async fn test_pause_mid_stream_keeps_result_count() {
        let stream = Stream::new(StreamOptions::default());
        let seen = Arc::new(AtomicUsize::new(0));
        let paused_during_stage = Arc::new(AtomicUsize::new(0));

        let handle = stream.clone();
        let counter = seen.clone();
        let paused_flag = paused_during_stage.clone();
        let results = stream
            .each_async(move |_record: Record| {
                let handle = handle.clone();
                let counter = counter.clone();
                let paused_flag = paused_flag.clone();
                async move {
                    if handle.is_paused() {
                        paused_flag.fetch_add(1, Ordering::SeqCst);
                    }
                    if counter.fetch_add(1, Ordering::SeqCst) + 1 == 10 {
                        handle.pause();
                        sleep(Duration::from_millis(10)).await;
                        handle.resume();
                    }
                    Ok::<_, anyhow::Error>(())
                }
            })
            .to_array();

        let producer = stream.producer();
        tokio::spawn(async move {
            for i in 0..BATCH_SIZE {
                producer.write(indexed(i), RecordOptions::default()).await.unwrap();
            }
            producer.end();
        });

        let records = results.await.unwrap();
        assert_eq!(records.len(), BATCH_SIZE);
        assert_eq!(seen.load(Ordering::SeqCst), BATCH_SIZE);
        assert_eq!(paused_during_stage.load(Ordering::SeqCst), 0);
        assert_eq!(stream.stats().processed, BATCH_SIZE);
    }

    #[tokio::test]
    async fn test_paused_stream_holds_writes_until_resumed() {
        let stream = Stream::new(StreamOptions::default());
        let done = stream.each(|_record: &Record| Ok(())).done();
        stream.pause();
        assert_eq!(stream.phase(), Phase::Paused);

        let blocked = timeout(
            Duration::from_millis(50),
            stream.write("held", RecordOptions::default()),
        )
        .await;
        assert!(blocked.is_err(), "write should wait while paused");
        assert_eq!(stream.stats().written, 0);

        stream.resume();
        stream.write("released", RecordOptions::default()).await.unwrap();
        stream.end();
        done.await.unwrap();
        assert_eq!(stream.stats().processed, 1);
    }

    async fn assert_fails_fast_at(fail_at: usize) {
        let stream = Stream::new(StreamOptions::default());
        let after_failure = Arc::new(Mutex::new(Vec::new()));

        let sink = after_failure.clone();
        let results = stream
            .map(move |record: Record| {
                if index_of(&record) == fail_at {
                    return Err(anyhow!("Uh oh"));
                }
                Ok(record)
            })
            .each(move |record: &Record| {
                sink.lock().unwrap().push(index_of(record));
                Ok(())
            })
            .to_array();

        for i in 0..BATCH_SIZE {
            if stream.write(indexed(i), RecordOptions::default()).await.is_err() {
                break;
            }
        }
        stream.end();

        let err = results.await.unwrap_err();
        let stage = err.as_stage().expect("stage error");
        assert_eq!(stage.stage, Some(0), "fail_at={}", fail_at);
        assert_eq!(stage.cause().to_string(), "Uh oh");

        let reached = after_failure.lock().unwrap().clone();
        assert_eq!(reached, (0..fail_at).collect::<Vec<_>>(), "fail_at={}", fail_at);
        assert!(stream.is_failed());
        assert!(!stream.is_ended());
        assert_eq!(stream.stats().pending, 0);
        assert!(stream.done().await.is_err());

        let rejected = stream.write(indexed(0), RecordOptions::default()).await;
        assert!(matches!(rejected, Err(StreamError::StreamClosed)));
    }

    #[tokio::test]
    async fn test_fail_fast_discards_later_records() {
        // First record (later writes still suspended), middle, and last
        // record (failure racing the end of input).
        for fail_at in [0, 37, BATCH_SIZE - 1] {
            assert_fails_fast_at(fail_at).await;
        }
    }

    #[tokio::test]
    async fn test_panicking_stage_fails_stream() {
        let stream = Stream::new(StreamOptions::default());
        let done = stream
            .each(|record: &Record| {
                if record.as_string() == "bad" {
                    panic!("boom");
                }
                Ok(())
            })
            .done();

        stream.write("good", RecordOptions::with_key("k1")).await.unwrap();
        stream.write("bad", RecordOptions::with_key("k2")).await.unwrap();
        stream.end();

        let err = timeout(Duration::from_millis(500), done)
            .await
            .expect("completion should resolve")
            .unwrap_err();
        let stage = match &err {
            StreamError::Stage(stage) => stage,
            other => panic!("unexpected error: {:?}", other),
        };
        assert_eq!(stage.stage, None);
        assert_eq!(stage.record_key.as_deref(), Some("k2"));
        assert_eq!(stage.cause().to_string(), "boom");

        assert_eq!(stream.phase(), Phase::Failed);
        let stats = stream.stats();
        assert_eq!(stats.running, 0);
        assert_eq!(stats.processed, 1);
    }

    #[tokio::test]
    async fn test_every_completion_sees_the_same_failure() {
        let stream = Stream::new(StreamOptions::default());
        let first = stream.each(|_record: &Record| Err(anyhow!("broken sink"))).done();
        let second = stream.done();

        stream.write("x", RecordOptions::default()).await.unwrap();
        stream.end();

        let first = first.await.unwrap_err();
        let second = second.await.unwrap_err();
        assert_eq!(first.to_string(), second.to_string());

        let late = stream.done().await.unwrap_err();
        assert!(late.as_stage().is_some());
    }

    #[tokio::test]
    async fn test_filter_keeps_even_records() {
        let stream = Stream::new(StreamOptions::default());
        let results = stream
            .filter(|record: &Record| index_of(record) % 2 == 0)
            .to_array();

        write_indexed(&stream, BATCH_SIZE).await;
        let records = results.await.unwrap();

        assert_eq!(records.len(), BATCH_SIZE / 2);
        assert!(records.iter().all(|r| index_of(r) % 2 == 0));
        // Filtered records still count as processed.
        assert_eq!(stream.stats().processed, BATCH_SIZE);
    }

    #[tokio::test]
    async fn test_write_after_end_is_rejected() {
        let stream = Stream::new(StreamOptions::default());
        let gate = Arc::new(Semaphore::new(0));

        let permits = gate.clone();
        let done = stream
            .each_async(move |_record: Record| {
                let permits = permits.clone();
                async move {
                    permits.acquire().await?.forget();
                    Ok::<_, anyhow::Error>(())
                }
            })
            .done();

        stream.write("one", RecordOptions::default()).await.unwrap();
        stream.end();

        // Closed but not yet drained.
        assert!(!stream.is_ended());
        let before_drain = stream.write("two", RecordOptions::default()).await;
        assert!(matches!(before_drain, Err(StreamError::StreamClosed)));

        gate.add_permits(1);
        done.await.unwrap();
        assert!(stream.is_ended());

        let after_drain = stream.write("three", RecordOptions::default()).await;
        assert!(matches!(after_drain, Err(StreamError::StreamClosed)));
        assert!(stream.producer().is_closed());
        assert_eq!(stream.stats().processed, 1);
    }

    #[tokio::test]
    async fn test_end_is_idempotent_and_ends_empty_stream() {
        let stream = Stream::new(StreamOptions::default());
        stream.end();
        stream.end();
        assert!(stream.is_ended());

        // Consumers attached after the end still complete.
        assert!(stream.done().await.is_ok());
        assert!(stream.to_array().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_writes_wait_for_consumer_and_stage() {
        let stream = Stream::new(StreamOptions::default());
        assert_eq!(stream.phase(), Phase::Idle);

        stream.map(|record: Record| Ok(record));
        let waiting = timeout(
            Duration::from_millis(50),
            stream.write("early", RecordOptions::default()),
        )
        .await;
        assert!(waiting.is_err(), "write should wait until a consumer attaches");

        let results = stream.to_array();
        assert_eq!(stream.phase(), Phase::Running);

        let producer = stream.producer();
        let writer = tokio::spawn(async move { producer.write("late", RecordOptions::default()).await });
        let written = writer.await.unwrap().unwrap();
        stream.end();

        let records = results.await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key(), written.record().unwrap().key());
    }

    #[tokio::test]
    async fn test_high_water_mark_suspends_writer() {
        let stream = Stream::new(StreamOptions {
            concurrency: 1,
            high_water_mark: 2,
        });
        let gate = Arc::new(Semaphore::new(0));

        let permits = gate.clone();
        let done = stream
            .each_async(move |_record: Record| {
                let permits = permits.clone();
                async move {
                    permits.acquire().await?.forget();
                    Ok::<_, anyhow::Error>(())
                }
            })
            .done();

        for i in 0..3 {
            stream.write(indexed(i), RecordOptions::default()).await.unwrap();
        }
        // One record is stuck in the stage, two fill the queue.
        let blocked = timeout(
            Duration::from_millis(50),
            stream.write(indexed(3), RecordOptions::default()),
        )
        .await;
        assert!(blocked.is_err(), "write should wait at the high-water mark");
        let stats = stream.stats();
        assert_eq!(stats.running, 1);
        assert_eq!(stats.pending, 2);

        gate.add_permits(BATCH_SIZE);
        stream.write(indexed(3), RecordOptions::default()).await.unwrap();
        stream.end();
        done.await.unwrap();

        let stats = stream.stats();
        assert_eq!(stats.processed, 4);
        assert_eq!(stats.written, 4);
        assert_eq!(stats.running, 0);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_bounds_in_flight_records() {
        let concurrency = 4;
        let stream = Stream::new(StreamOptions::with_concurrency(concurrency));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let current = in_flight.clone();
        let max_seen = peak.clone();
        let results = stream
            .each_async(move |_record: Record| {
                let current = current.clone();
                let max_seen = max_seen.clone();
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(5)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .to_array();

        write_indexed(&stream, 40).await;
        let records = results.await.unwrap();

        assert_eq!(records.len(), 40);
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= concurrency, "peak {} exceeded bound", peak);
        assert!(peak > 1, "expected records to overlap");
    }

    #[tokio::test]
    async fn test_concurrent_failure_is_not_accumulated() {
        let stream = Stream::new(StreamOptions::with_concurrency(3));
        let results = stream
            .map_async(|record: Record| async move {
                sleep(Duration::from_millis(5)).await;
                if index_of(&record) == 4 {
                    return Err(anyhow!("record 4 rejected"));
                }
                Ok(record)
            })
            .to_array();

        for i in 0..20 {
            if stream.write(indexed(i), RecordOptions::default()).await.is_err() {
                break;
            }
        }
        stream.end();

        let err = results.await.unwrap_err();
        assert_eq!(err.as_stage().unwrap().cause().to_string(), "record 4 rejected");
        assert_eq!(stream.phase(), Phase::Failed);
    }

    #[tokio::test]
    async fn test_error_written_by_producer_fails_stream() {
        let stream = Stream::new(StreamOptions::default());
        let done = stream.each(|_record: &Record| Ok(())).done();

        stream.write("fine", RecordOptions::default()).await.unwrap();
        let written = stream
            .write(anyhow!("reader failed"), RecordOptions::default())
            .await
            .unwrap();
        assert!(matches!(written, Written::Error));

        let err = done.await.unwrap_err();
        let stage = err.as_stage().unwrap();
        assert_eq!(stage.stage, None);
        assert_eq!(stage.cause().to_string(), "reader failed");
        assert_eq!(stream.stats().written, 1);
    }

    #[tokio::test]
    async fn test_batch_write_returns_records_in_order() {
        let stream = Stream::new(StreamOptions::default());
        let results = stream.to_array();

        let batch: Vec<Record> = (0..5)
            .map(|i| Record::from_value(indexed(i), RecordOptions::default()).unwrap())
            .collect();
        let written = stream.write(batch.clone(), RecordOptions::default()).await.unwrap();
        assert_eq!(written.into_records(), batch);

        let invalid = stream.write(json!([{"index": 9}]), RecordOptions::default()).await;
        assert!(matches!(invalid, Err(StreamError::InvalidBatchInput { index: 0 })));

        let null = stream.write(Value::Null, RecordOptions::default()).await;
        assert!(matches!(null, Err(StreamError::InvalidPayloadKind(_))));

        stream.end();
        let records = results.await.unwrap();
        assert_eq!(records, batch);
    }

    struct Tag(&'static str);

    #[async_trait]
    impl Transform for Tag {
        async fn apply(&self, record: Record) -> anyhow::Result<Record> {
            let mut value = record.as_json()?;
            value["tag"] = json!(self.0);
            Ok(record.with_data(serde_json::from_value::<serde_json::Map<String, Value>>(value)?))
        }

        fn name(&self) -> &str {
            "tag"
        }
    }

    #[tokio::test]
    async fn test_custom_and_async_stages_compose() {
        let stream = Stream::new(StreamOptions::default());
        let results = stream
            .pipe(Stage::transform(Tag("seen")))
            .map_async(|record: Record| async move {
                sleep(Duration::from_millis(1)).await;
                let mut value = record.as_json()?;
                value["doubled"] = json!(index_of(&record) * 2);
                Ok::<_, anyhow::Error>(record.with_data(serde_json::from_value::<serde_json::Map<String, Value>>(value)?))
            })
            .to_array();

        write_indexed(&stream, 3).await;
        let records = results.await.unwrap();

        let values: Vec<Value> = records.iter().map(|r| r.as_json().unwrap()).collect();
        assert_eq!(
            values,
            vec![
                json!({"index": 0, "tag": "seen", "doubled": 0}),
                json!({"index": 1, "tag": "seen", "doubled": 2}),
                json!({"index": 2, "tag": "seen", "doubled": 4}),
            ]
        );
    }

    #[tokio::test]
    async fn test_seeded_stream_drains_and_restreams() {
        let records: Vec<Record> = (0..10)
            .map(|i| Record::from_value(indexed(i), RecordOptions::default()).unwrap())
            .collect();
        let stream = Stream::from_records(records.clone(), StreamOptions::default());
        assert!(stream.producer().is_closed());

        stream.filter(|record: &Record| index_of(record) < 5);
        let restreamed = stream.into_stream().await.unwrap();
        assert_eq!(restreamed.stats().pending, 5);

        let collected = restreamed.to_array().await.unwrap();
        assert_eq!(collected, records[..5].to_vec());
    }

    #[tokio::test]
    async fn test_destroy_fails_pending_completions() {
        let stream = Stream::new(StreamOptions::default());
        let gate = Arc::new(Semaphore::new(0));

        let permits = gate.clone();
        let done = stream
            .each_async(move |_record: Record| {
                let permits = permits.clone();
                async move {
                    permits.acquire().await?.forget();
                    Ok::<_, anyhow::Error>(())
                }
            })
            .done();

        stream.write("stuck", RecordOptions::default()).await.unwrap();
        stream.write("queued", RecordOptions::default()).await.unwrap();
        stream.destroy();

        assert!(matches!(done.await, Err(StreamError::Destroyed)));
        assert_eq!(stream.phase(), Phase::Destroyed);
        assert_eq!(stream.stats().pending, 0);
        assert_eq!(stream.stats().running, 0);

        let rejected = stream.write("after", RecordOptions::default()).await;
        assert!(matches!(rejected, Err(StreamError::StreamClosed)));
    }

    #[tokio::test]
    async fn test_destroy_releases_waiting_writer() {
        let stream = Stream::new(StreamOptions::default());
        stream.map(|record: Record| Ok(record));

        // No consumer: the write waits for readiness until the stream is destroyed.
        let producer = stream.producer();
        let writer = tokio::spawn(async move { producer.write("waiting", RecordOptions::default()).await });
        sleep(Duration::from_millis(20)).await;
        stream.destroy();

        let result = writer.await.unwrap();
        assert!(matches!(result, Err(StreamError::StreamEnded)));
    }
}
