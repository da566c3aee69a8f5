// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use record_stream::config::{load_options, StreamOptions};
use record_stream::engine::{Input, Producer, Stream};
use record_stream::record::{Record, RecordOptions};

const USAGE: &str = "Usage: record-stream [--config <file.yaml|file.toml>] [--concurrency N] < input";

/// Command line settings, applied over the defaults in that order:
/// config file first, then `--concurrency`.
struct Args {
    config: Option<String>,
    concurrency: Option<usize>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        concurrency: None,
    };
    let mut iter = env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().ok_or_else(|| anyhow!("--config needs a path"))?;
                args.config = Some(path);
            }
            "--concurrency" => {
                let value = iter.next().ok_or_else(|| anyhow!("--concurrency needs a value"))?;
                let concurrency = value
                    .parse::<usize>()
                    .with_context(|| format!("invalid --concurrency '{}'", value))?;
                if concurrency == 0 {
                    bail!("--concurrency must be at least 1");
                }
                args.concurrency = Some(concurrency);
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other => bail!("unexpected argument '{}'\n{}", other, USAGE),
        }
    }
    Ok(args)
}

/// JSON objects become map payloads; every other line is text.
fn line_to_input(line: String) -> Input {
    match serde_json::from_str::<Value>(&line) {
        Ok(Value::Object(map)) => Input::from(map),
        _ => Input::from(line),
    }
}

/// Copies stdin into the stream one line at a time, then ends it. A read
/// error is written into the stream so the run fails with it.
async fn feed_stdin(producer: Producer) {
    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        let input = match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => line_to_input(line),
            Ok(None) => break,
            Err(e) => Input::from(anyhow::Error::new(e).context("failed to read stdin")),
        };
        if producer.write(input, RecordOptions::default()).await.is_err() {
            break;
        }
    }
    producer.end();
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = parse_args()?;

    let mut options = match &args.config {
        Some(path) => load_options(path).with_context(|| format!("failed to load {}", path))?,
        None => StreamOptions::default(),
    };
    if let Some(concurrency) = args.concurrency {
        options.concurrency = concurrency;
    }

    let stream = Stream::new(options);
    let counted = Arc::new(AtomicUsize::new(0));
    let bytes = Arc::new(AtomicUsize::new(0));

    let counter = counted.clone();
    let byte_counter = bytes.clone();
    let started = Instant::now();
    let done = stream
        .each(move |record: &Record| {
            counter.fetch_add(1, Ordering::Relaxed);
            byte_counter.fetch_add(record.data.len(), Ordering::Relaxed);
            Ok(())
        })
        .done();

    let feeder = tokio::spawn(feed_stdin(stream.producer()));
    let outcome = done.await;
    feeder.await.context("stdin reader task panicked")?;

    let stats = stream.stats();
    println!("records written:   {}", stats.written);
    println!("records processed: {}", stats.processed);
    println!("records counted:   {}", counted.load(Ordering::Relaxed));
    println!("payload bytes:     {}", bytes.load(Ordering::Relaxed));
    println!("concurrency:       {}", stream.options().concurrency);
    println!("elapsed:           {:?}", started.elapsed());

    outcome.context("stream failed")?;
    Ok(())
}
