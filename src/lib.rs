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

//! Read until: selective sequencing against a live nanopore raw-signal
//! stream.
//!
//! The [`ReadUntilClient`] keeps the freshest chunk per channel in a bounded
//! cache while analysis workers decide, read by read, whether to keep
//! sampling, stop receiving data, or eject the strand from its pore.

pub use read_until_client::{
    ActionKind, ActionQueue, ChunkCache, Classifier, ClientOptions, Error, ReadUntilClient,
    Result, RunOptions, ALLOWED_MIN_CHUNK_SIZE,
};
pub use sequencer_api as api;
