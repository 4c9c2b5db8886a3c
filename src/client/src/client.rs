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
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use sequencer_api::{
    acquisition_service_client::AcquisitionServiceClient,
    analysis_configuration_service_client::AnalysisConfigurationServiceClient,
    data_service_client::DataServiceClient,
    get_data_types_response::DataType,
    get_live_reads_response::ReadData,
    GetDataTypesRequest, GetReadClassificationsRequest,
};
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Endpoint};
use tracing::info;

use crate::{
    cache::ChunkCache,
    classifier::Classifier,
    coordinator::{RunOptions, StreamCoordinator},
    error::{Error, Result},
    queue::{ActionKind, ActionQueue},
};

/// Client construction parameters.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Maximum number of chunks cached. Setting this to the number of device
    /// channels allows caching the most recent data on every channel.
    ///
    /// Default: 512
    pub cache_size: usize,

    /// Keep only strand-like chunks.
    ///
    /// Default: true
    pub filter_strands: bool,

    /// Stage a stop-further-data request as soon as a read's first chunk
    /// arrives, so each read is seen at most once.
    ///
    /// Default: true
    pub one_chunk: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            cache_size: 512,
            filter_strands: true,
            one_chunk: true,
        }
    }
}

/// A read-until client.
///
/// Handles the interaction with the sequencer's live-reads stream and keeps
/// a thread-safe cache of the most recent chunk on each channel. `run` is
/// blocking, so it is typically spawned on its own task while analysis
/// workers poll [`get_read_chunks`](ReadUntilClient::get_read_chunks) and
/// stage decisions through
/// [`unblock_read`](ReadUntilClient::unblock_read) /
/// [`stop_receiving_read`](ReadUntilClient::stop_receiving_read).
pub struct ReadUntilClient {
    data: DataServiceClient<Channel>,
    acquisition: AcquisitionServiceClient<Channel>,
    classifier: Arc<Classifier>,
    actions: Arc<ActionQueue>,
    cache: Arc<ChunkCache>,
    running: AtomicBool,
    cancel: Mutex<CancellationToken>,
    signal_dtype: Option<DataType>,
    filter_strands: bool,
    one_chunk: bool,
}

impl ReadUntilClient {
    /// Connect to a sequencer and perform the one-shot session lookups: the
    /// raw-signal encoding and the read classification map.
    pub async fn connect(addr: impl Into<String>, options: ClientOptions) -> Result<Self> {
        let cache = Arc::new(ChunkCache::new(options.cache_size)?);

        let addr = addr.into();
        info!("connecting to sequencer at {}", addr);
        let channel = Endpoint::new(addr)?.connect().await?;

        let mut analysis = AnalysisConfigurationServiceClient::new(channel.clone());
        let classes = analysis
            .get_read_classifications(GetReadClassificationsRequest {})
            .await?
            .into_inner()
            .read_classifications;
        let classifier = Arc::new(Classifier::new(classes));

        let mut data = DataServiceClient::new(channel.clone());
        let data_types = data.get_data_types(GetDataTypesRequest {}).await?.into_inner();

        Ok(ReadUntilClient {
            data,
            acquisition: AcquisitionServiceClient::new(channel),
            classifier,
            actions: Arc::new(ActionQueue::new()),
            cache,
            running: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            signal_dtype: data_types.calibrated_signal,
            filter_strands: options.filter_strands,
            one_chunk: options.one_chunk,
        })
    }

    /// Run a streaming session until `run_time` elapses, [`reset`] is
    /// called, or the stream breaks. Blocking; run it on a dedicated task.
    ///
    /// [`reset`]: ReadUntilClient::reset
    pub async fn run(&self, opts: RunOptions) -> Result<()> {
        let cancel = CancellationToken::new();
        {
            // `reset` synchronises on this lock; the fresh token must be in
            // place by the time the running flag becomes visible.
            let mut slot = self.cancel.lock();
            if self.running.swap(true, Ordering::SeqCst) {
                return Err(Error::InvalidArgument(
                    "a streaming session is already running".into(),
                ));
            }
            *slot = cancel.clone();
        }

        let coordinator = StreamCoordinator::new(
            self.data.clone(),
            self.acquisition.clone(),
            self.classifier.clone(),
            self.actions.clone(),
            self.cache.clone(),
            self.filter_strands,
            self.one_chunk,
            cancel,
        );
        let result = coordinator.run(opts).await;

        self.running.store(false, Ordering::SeqCst);
        self.actions.reset();
        self.cache.clear();
        info!("finished processing stream");
        result
    }

    /// Request early termination of the current session. The inbound half is
    /// cancelled immediately; the outbound half closes within one throttle
    /// interval.
    pub fn reset(&self) {
        self.cancel.lock().cancel();
    }

    /// Remove and return up to `batch_size` cached chunks, most recent (or
    /// oldest) first.
    pub fn get_read_chunks(&self, batch_size: usize, newest: bool) -> Vec<(u32, ReadData)> {
        self.cache.pop_batch(batch_size, newest)
    }

    /// Request that a read be ejected from its channel.
    pub fn unblock_read(&self, channel: u32, number: u32) {
        self.actions.stage(
            channel,
            number,
            ActionKind::Unblock {
                duration_seconds: 0.0,
            },
        );
    }

    /// Like [`unblock_read`](ReadUntilClient::unblock_read), applying the
    /// reverse voltage for `duration` instead of the device default.
    pub fn unblock_read_for(&self, channel: u32, number: u32, duration: Duration) {
        self.actions.stage(
            channel,
            number,
            ActionKind::Unblock {
                duration_seconds: duration.as_secs_f64(),
            },
        );
    }

    /// Request to receive no more chunks for a read while sequencing
    /// proceeds.
    pub fn stop_receiving_read(&self, channel: u32, number: u32) {
        self.actions.stage(channel, number, ActionKind::StopFurtherData);
    }

    /// Whether a streaming session is currently being processed.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of chunks waiting in the cache.
    pub fn queue_length(&self) -> usize {
        self.cache.len()
    }

    /// Reads dropped from the cache before being delivered to the consumer.
    pub fn missed_reads(&self) -> u64 {
        self.cache.missed()
    }

    /// Chunks replaced in the cache by a later chunk of the same read.
    pub fn missed_chunks(&self) -> u64 {
        self.cache.replaced()
    }

    /// The calibrated raw-signal encoding announced by the sequencer.
    pub fn signal_dtype(&self) -> Option<DataType> {
        self.signal_dtype.clone()
    }
}
