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

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use sequencer_api::{
    acquisition_service_client::AcquisitionServiceClient,
    data_service_client::DataServiceClient,
    get_live_reads_request::{Actions, Request, StreamSetup},
    GetLiveReadsRequest, GetLiveReadsResponse, GetProgressRequest, RawDataType,
};
use tokio::{sync::mpsc, time::Instant};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{transport::Channel, Streaming};
use tracing::{debug, info, warn};

use crate::{
    cache::ChunkCache,
    classifier::Classifier,
    error::{Error, Result},
    queue::{ActionKind, ActionQueue},
};

/// The largest minimum chunk size the sequencer accepts.
pub const ALLOWED_MIN_CHUNK_SIZE: u64 = 4000;

const REPORT_INTERVAL: Duration = Duration::from_secs(1);
const OUTBOUND_BUFFER: usize = 64;

/// Parameters of a single streaming session.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Wall-clock deadline after which no new outbound iteration begins.
    pub run_time: Duration,
    /// Lowest channel (inclusive) for which to receive raw data.
    pub first_channel: u32,
    /// Highest channel (inclusive) for which to receive raw data.
    pub last_channel: u32,
    /// Minimum raw samples per chunk; clamped to [`ALLOWED_MIN_CHUNK_SIZE`].
    pub min_chunk_size: u64,
    /// Maximum actions flushed in a single outbound message.
    pub action_batch: usize,
    /// Minimum interval between outbound flushes.
    pub action_throttle: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            run_time: Duration::from_secs(30),
            first_channel: 1,
            last_channel: 512,
            min_chunk_size: 2000,
            action_batch: 1000,
            action_throttle: Duration::from_millis(1),
        }
    }
}

/// Drives the bidirectional stream for one session: sends the setup message,
/// pumps staged actions outbound on a throttle, and feeds inbound chunks
/// through the filter and one-chunk policies into the cache.
pub(crate) struct StreamCoordinator {
    data: DataServiceClient<Channel>,
    acquisition: AcquisitionServiceClient<Channel>,
    classifier: Arc<Classifier>,
    actions: Arc<ActionQueue>,
    cache: Arc<ChunkCache>,
    filter_strands: bool,
    one_chunk: bool,
    cancel: CancellationToken,
}

impl StreamCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        data: DataServiceClient<Channel>,
        acquisition: AcquisitionServiceClient<Channel>,
        classifier: Arc<Classifier>,
        actions: Arc<ActionQueue>,
        cache: Arc<ChunkCache>,
        filter_strands: bool,
        one_chunk: bool,
        cancel: CancellationToken,
    ) -> Self {
        StreamCoordinator {
            data,
            acquisition,
            classifier,
            actions,
            cache,
            filter_strands,
            one_chunk,
            cancel,
        }
    }

    pub(crate) async fn run(mut self, opts: RunOptions) -> Result<()> {
        let mut min_chunk_size = opts.min_chunk_size;
        if min_chunk_size > ALLOWED_MIN_CHUNK_SIZE {
            warn!(
                "reducing min chunk size from {} to {}",
                min_chunk_size, ALLOWED_MIN_CHUNK_SIZE
            );
            min_chunk_size = ALLOWED_MIN_CHUNK_SIZE;
        }

        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        info!("sending stream setup");
        let setup = GetLiveReadsRequest {
            request: Some(Request::Setup(StreamSetup {
                first_channel: opts.first_channel,
                last_channel: opts.last_channel,
                raw_data_type: RawDataType::Calibrated as i32,
                sample_minimum_chunk_size: min_chunk_size,
            })),
        };
        tx.send(setup)
            .await
            .map_err(|_| Error::Stream("outbound stream closed before setup".into()))?;

        let pump = {
            let actions = self.actions.clone();
            let cancel = self.cancel.clone();
            let deadline = Instant::now() + opts.run_time;
            let throttle = opts.action_throttle;
            let action_batch = opts.action_batch;
            info!("running for {:?}", opts.run_time);
            tokio::spawn(async move {
                while Instant::now() < deadline && !cancel.is_cancelled() {
                    let started = Instant::now();
                    let staged = actions.drain(action_batch);
                    if !staged.is_empty() {
                        debug!("sending {} actions", staged.len());
                        let request = GetLiveReadsRequest {
                            request: Some(Request::Actions(Actions { actions: staged })),
                        };
                        if tx.send(request).await.is_err() {
                            break;
                        }
                    }
                    tokio::select! {
                        _ = tokio::time::sleep_until(started + throttle) => {}
                        _ = cancel.cancelled() => break,
                    }
                }
                info!("outbound stream finished");
            })
        };

        let inbound = tokio::select! {
            response = self.data.get_live_reads(ReceiverStream::new(rx)) => response,
            _ = self.cancel.cancelled() => {
                let _ = pump.await;
                return Ok(());
            }
        };
        let result = match inbound {
            Ok(response) => {
                let mut stream = response.into_inner();
                self.process_reads(&mut stream).await
            }
            Err(status) => Err(status.into()),
        };

        self.cancel.cancel();
        let _ = pump.await;
        result
    }

    /// Consume the inbound half, caching chunks and aggregating telemetry
    /// until the stream ends or the session is cancelled.
    async fn process_reads(
        &mut self,
        inbound: &mut Streaming<GetLiveReadsResponse>,
    ) -> Result<()> {
        let mut response_counts: HashMap<i32, u64> = HashMap::new();
        let mut unique_reads: HashSet<String> = HashSet::new();
        let mut read_count: u64 = 0;
        let mut samples_behind: u64 = 0;
        let mut raw_data_bytes: u64 = 0;
        let mut last_report = Instant::now();

        loop {
            // The report timer runs even when the stream is idle, so a quiet
            // session still produces liveness output.
            let next = tokio::select! {
                message = inbound.message() => Some(message?),
                _ = tokio::time::sleep_until(last_report + REPORT_INTERVAL) => None,
                _ = self.cancel.cancelled() => {
                    info!("inbound stream cancelled");
                    return Ok(());
                }
            };

            if let Some(message) = next {
                let Some(batch) = message else {
                    info!("stream finished after timeout");
                    return Ok(());
                };

                for response in &batch.action_responses {
                    *response_counts.entry(response.response).or_default() += 1;
                }

                // Progress is telemetry only; a failed lookup never ends the
                // session.
                let acquired = match self.acquisition.get_progress(GetProgressRequest {}).await {
                    Ok(progress) => progress.into_inner().raw_per_channel.map(|p| p.acquired),
                    Err(status) => {
                        warn!("acquisition progress lookup failed: {}", status);
                        None
                    }
                };

                for (channel, chunk) in batch.channels {
                    read_count += 1;
                    if self.one_chunk {
                        self.actions
                            .stage(channel, chunk.number, ActionKind::StopFurtherData);
                    }
                    unique_reads.insert(chunk.id.clone());
                    if let Some(acquired) = acquired {
                        samples_behind += acquired.saturating_sub(chunk.chunk_start_sample);
                    }
                    raw_data_bytes += chunk.raw_data.len() as u64;

                    if !self.filter_strands
                        || self.classifier.is_strand_like(&chunk.chunk_classifications)
                    {
                        self.cache.put(channel, chunk);
                    }
                }
            }

            if last_report.elapsed() >= REPORT_INTERVAL {
                info!(
                    "interval update: {} read sections, {} unique reads (ever), \
                     average {:.0} samples behind, {:.2} MB raw data, \
                     {} reads cached, {} reads missed, {} chunks replaced",
                    read_count,
                    unique_reads.len(),
                    samples_behind as f64 / read_count.max(1) as f64,
                    raw_data_bytes as f64 / 1024.0 / 1024.0,
                    self.cache.len(),
                    self.cache.missed(),
                    self.cache.replaced(),
                );
                info!("response summary: {:?}", response_counts);

                read_count = 0;
                samples_behind = 0;
                raw_data_bytes = 0;
                last_report = Instant::now();
            }
        }
    }
}
