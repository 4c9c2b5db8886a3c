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

//! The coordination layer between a sequencer's live raw-signal stream and a
//! decision engine.
//!
//! [`ReadUntilClient`] drives the bidirectional live-reads stream and keeps
//! the most recent chunk per channel in a bounded [`ChunkCache`]. Analysis
//! workers poll the cache and stage per-read decisions — eject the read or
//! stop receiving its data — which the coordinator flushes back to the
//! sequencer in throttled batches.

mod cache;
mod classifier;
mod client;
mod coordinator;
mod error;
mod queue;

pub use self::{
    cache::ChunkCache,
    classifier::Classifier,
    client::{ClientOptions, ReadUntilClient},
    coordinator::{RunOptions, ALLOWED_MIN_CHUNK_SIZE},
    error::{Error, Result},
    queue::{ActionKind, ActionQueue},
};
