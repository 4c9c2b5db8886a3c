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

use std::{error::Error, result::Result};

fn main() -> Result<(), Box<dyn Error>> {
    std::env::set_var(
        "PROTOC",
        protoc_bin_vendored::protoc_bin_path().expect("vendored protoc binary"),
    );
    tonic_build::configure().compile(
        &[
            "proto/sequencer/data.proto",
            "proto/sequencer/acquisition.proto",
            "proto/sequencer/analysis_configuration.proto",
        ],
        &["proto"],
    )?;
    Ok(())
}
