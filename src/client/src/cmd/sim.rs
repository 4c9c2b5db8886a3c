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

//! Stand-alone sequencer simulator serving the live-reads services.

use clap::Parser;
use sequencer_api::mock::MockSequencer;
use tracing::info;
use tracing_subscriber::EnvFilter;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Sequencer simulator", long_about = None)]
struct Args {
    /// Port to serve the sequencer services on.
    #[clap(long, default_value_t = 8000)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .init();

    let args = Args::parse();
    let server = MockSequencer::spawn_on(args.port).await?;
    info!("simulator ready at {}", server.addr());

    // A first empty batch so a connecting client sees a live stream.
    server.add_response(Default::default());

    tokio::signal::ctrl_c().await?;
    info!("simulator exiting");
    Ok(())
}
