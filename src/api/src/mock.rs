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

//! An in-process sequencer serving scripted live-read responses.
//!
//! Callers enqueue [`GetLiveReadsResponse`]s with [`MockSequencer::add_response`];
//! they are streamed to a connected client as soon as its stream is live.
//! Every request received on the stream is recorded for assertions. The
//! response stream closes when the client closes its outbound half, or on
//! [`MockSequencer::terminate_live_reads`].

use std::{collections::VecDeque, io, net::SocketAddr, sync::Arc};

use parking_lot::Mutex;
use tokio::{
    net::TcpListener,
    sync::{mpsc, Notify},
    task::JoinHandle,
};
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tokio_util::sync::CancellationToken;
use tonic::{transport::Server, Request, Response, Status, Streaming};
use tracing::{debug, info, warn};

use crate::{
    acquisition_service_server::{AcquisitionService, AcquisitionServiceServer},
    analysis_configuration_service_server::{
        AnalysisConfigurationService, AnalysisConfigurationServiceServer,
    },
    data_service_server::{DataService, DataServiceServer},
    get_data_types_response::{data_type::Type, DataType},
    get_live_reads_request,
    get_progress_response::Progress,
    GetDataTypesRequest, GetDataTypesResponse, GetLiveReadsRequest, GetLiveReadsResponse,
    GetProgressRequest, GetProgressResponse, GetReadClassificationsRequest,
    GetReadClassificationsResponse,
};

/// The classification map served by the mock.
pub const CLASS_MAP: &[(i32, &str)] = &[
    (83, "strand"),
    (67, "strand1"),
    (77, "multiple"),
    (90, "zero"),
    (65, "adapter"),
    (66, "mux_uncertain"),
    (70, "user2"),
    (68, "user1"),
    (69, "event"),
    (80, "pore"),
    (85, "unavailable"),
    (84, "transition"),
    (78, "unclassed"),
];

#[derive(Default)]
struct MockState {
    requests: Mutex<Vec<GetLiveReadsRequest>>,
    responses: Mutex<VecDeque<GetLiveReadsResponse>>,
    response_added: Notify,
    terminate: Notify,
    progress: Mutex<Progress>,
}

#[derive(Clone)]
struct MockService {
    state: Arc<MockState>,
}

#[tonic::async_trait]
impl DataService for MockService {
    type GetLiveReadsStream = ReceiverStream<Result<GetLiveReadsResponse, Status>>;

    async fn get_live_reads(
        &self,
        request: Request<Streaming<GetLiveReadsRequest>>,
    ) -> Result<Response<Self::GetLiveReadsStream>, Status> {
        let mut requests = request.into_inner();
        let (tx, rx) = mpsc::channel(16);
        let closed = CancellationToken::new();

        let state = self.state.clone();
        let reader_closed = closed.clone();
        tokio::spawn(async move {
            while let Ok(Some(request)) = requests.message().await {
                debug!("simulator received request");
                state.requests.lock().push(request);
            }
            reader_closed.cancel();
        });

        let state = self.state.clone();
        tokio::spawn(async move {
            loop {
                let next = state.responses.lock().pop_front();
                match next {
                    Some(response) => {
                        if tx.send(Ok(response)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        tokio::select! {
                            _ = state.response_added.notified() => {}
                            _ = state.terminate.notified() => break,
                            _ = closed.cancelled() => break,
                        }
                    }
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn get_data_types(
        &self,
        _request: Request<GetDataTypesRequest>,
    ) -> Result<Response<GetDataTypesResponse>, Status> {
        Ok(Response::new(GetDataTypesResponse {
            calibrated_signal: Some(DataType {
                r#type: Type::FloatingPoint as i32,
                big_endian: false,
                size: 4,
            }),
            uncalibrated_signal: Some(DataType {
                r#type: Type::SignedInteger as i32,
                big_endian: false,
                size: 2,
            }),
        }))
    }
}

#[tonic::async_trait]
impl AcquisitionService for MockService {
    async fn get_progress(
        &self,
        _request: Request<GetProgressRequest>,
    ) -> Result<Response<GetProgressResponse>, Status> {
        Ok(Response::new(GetProgressResponse {
            raw_per_channel: Some(self.state.progress.lock().clone()),
        }))
    }
}

#[tonic::async_trait]
impl AnalysisConfigurationService for MockService {
    async fn get_read_classifications(
        &self,
        _request: Request<GetReadClassificationsRequest>,
    ) -> Result<Response<GetReadClassificationsResponse>, Status> {
        Ok(Response::new(GetReadClassificationsResponse {
            read_classifications: CLASS_MAP
                .iter()
                .map(|(code, name)| (*code, name.to_string()))
                .collect(),
        }))
    }
}

/// Handle to a running mock sequencer.
pub struct MockSequencer {
    addr: SocketAddr,
    state: Arc<MockState>,
    server: JoinHandle<()>,
}

impl MockSequencer {
    /// Serves on an OS-assigned port.
    pub async fn spawn() -> io::Result<Self> {
        Self::spawn_on(0).await
    }

    pub async fn spawn_on(port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(MockState::default());
        let service = MockService {
            state: state.clone(),
        };
        let server = tokio::spawn(async move {
            let router = Server::builder()
                .add_service(DataServiceServer::new(service.clone()))
                .add_service(AcquisitionServiceServer::new(service.clone()))
                .add_service(AnalysisConfigurationServiceServer::new(service));
            if let Err(error) = router
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
            {
                warn!(%error, "sequencer simulator exited");
            }
        });
        info!(%addr, "sequencer simulator listening");
        Ok(MockSequencer {
            addr,
            state,
            server,
        })
    }

    /// Endpoint URI clients connect to.
    pub fn addr(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queue a response for the connected live-reads stream. If no stream is
    /// live it is sent as soon as one connects.
    pub fn add_response(&self, response: GetLiveReadsResponse) {
        self.state.responses.lock().push_back(response);
        self.state.response_added.notify_one();
    }

    /// Close one open live-reads stream without waiting for the client.
    pub fn terminate_live_reads(&self) {
        self.state.terminate.notify_one();
    }

    pub fn set_progress(&self, acquired: u64, processed: u64) {
        *self.state.progress.lock() = Progress {
            acquired,
            processed,
        };
    }

    /// Every request received on live-reads streams, in arrival order.
    pub fn requests(&self) -> Vec<GetLiveReadsRequest> {
        self.state.requests.lock().clone()
    }

    pub fn setup_requests(&self) -> Vec<get_live_reads_request::StreamSetup> {
        self.requests()
            .into_iter()
            .filter_map(|request| match request.request {
                Some(get_live_reads_request::Request::Setup(setup)) => Some(setup),
                _ => None,
            })
            .collect()
    }

    /// Recorded action batches, one entry per `Actions` message.
    pub fn action_batches(&self) -> Vec<Vec<get_live_reads_request::Action>> {
        self.requests()
            .into_iter()
            .filter_map(|request| match request.request {
                Some(get_live_reads_request::Request::Actions(batch)) => Some(batch.actions),
                _ => None,
            })
            .collect()
    }

    pub fn stop(self) {
        self.server.abort();
    }
}
