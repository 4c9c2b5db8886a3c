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

//! Generated wire types for the sequencer's gRPC interface, plus an
//! in-process [`mock::MockSequencer`] implementing all three services for
//! tests and the simulator binary.

tonic::include_proto!("sequencer");

pub mod mock;
