// Copyright 2024 The read-until Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Read-until host program: runs a client session and a pool of demo
//! analysis workers against it.

use std::{process::ExitCode, sync::Arc, time::Duration};

use clap::Parser;
use read_until_client::{ClientOptions, ReadUntilClient, RunOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Read until client with a demonstration analysis", long_about = None)]
struct Args {
    /// Sequencer host.
    #[clap(long, default_value = "127.0.0.1")]
    host: String,

    /// Sequencer gRPC port.
    #[clap(long, default_value_t = 8000)]
    port: u16,

    /// Number of analysis worker tasks.
    #[clap(long, default_value_t = 1)]
    workers: usize,

    /// Seconds to wait before starting analysis.
    #[clap(long = "analysis_delay", default_value_t = 1)]
    analysis_delay: u64,

    /// Seconds to run the analysis.
    #[clap(long = "run_time", default_value_t = 30)]
    run_time: u64,

    /// Seconds of reverse voltage to apply when unblocking.
    #[clap(long = "unblock_duration", default_value_t = 0.1)]
    unblock_duration: f64,

    /// Receive at most one chunk per read.
    #[clap(long = "one_chunk")]
    one_chunk: bool,

    /// Minimum raw-sample count per chunk.
    #[clap(long = "min_chunk_size", default_value_t = 2000)]
    min_chunk_size: u64,

    /// Print all debugging information.
    #[clap(long)]
    debug: bool,

    /// Print verbose messaging.
    #[clap(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("read until session failed: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> read_until_client::Result<()> {
    let addr = format!("http://{}:{}", args.host, args.port);
    let client = Arc::new(
        ReadUntilClient::connect(
            addr,
            ClientOptions {
                one_chunk: args.one_chunk,
                ..Default::default()
            },
        )
        .await?,
    );

    info!("creating {} analysis workers", args.workers);
    let workers: Vec<_> = (0..args.workers)
        .map(|worker| {
            tokio::spawn(simple_analysis(
                client.clone(),
                worker,
                Duration::from_secs(args.analysis_delay),
                Duration::from_secs_f64(args.unblock_duration),
            ))
        })
        .collect();

    let result = client
        .run(RunOptions {
            run_time: Duration::from_secs(args.run_time),
            min_chunk_size: args.min_chunk_size,
            ..Default::default()
        })
        .await;

    for worker in workers {
        let _ = worker.await;
    }
    result
}

/// A demo analysis: keep reads whose current level dropped well below the
/// preceding open-pore level, eject everything else.
async fn simple_analysis(
    client: Arc<ReadUntilClient>,
    worker: usize,
    delay: Duration,
    unblock_duration: Duration,
) {
    info!(worker, "starting analysis in {:?}", delay);
    tokio::time::sleep(delay).await;

    let throttle = Duration::from_millis(100);
    let mut kept = 0u64;
    let mut ejected = 0u64;
    while client.is_running() {
        let started = tokio::time::Instant::now();
        for (channel, read) in client.get_read_chunks(10, true) {
            if read.median_before > read.median && read.median_before - read.median > 60.0 {
                client.stop_receiving_read(channel, read.number);
                kept += 1;
            } else {
                client.unblock_read_for(channel, read.number, unblock_duration);
                ejected += 1;
            }
        }
        tokio::time::sleep_until(started + throttle).await;
    }
    info!(worker, kept, ejected, "finished analysis");
}
