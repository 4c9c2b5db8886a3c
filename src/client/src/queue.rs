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

use std::collections::VecDeque;

use parking_lot::Mutex;
use sequencer_api::get_live_reads_request::{action, Action, StopFurtherData, UnblockAction};
use tracing::debug;
use uuid::Uuid;

/// What to do with an in-progress read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionKind {
    /// Eject the read from its channel. A zero duration means the device
    /// default.
    Unblock { duration_seconds: f64 },
    /// Stop receiving chunks for the read while sequencing proceeds.
    StopFurtherData,
}

/// Unbounded FIFO of actions staged for the next outbound flush.
///
/// Producers are the public unblock/stop-receiving calls plus the one-chunk
/// policy; the sole consumer is the stream coordinator's outbound pump. An
/// action leaves the queue at most one flush after it was staged and is never
/// re-queued on failure.
pub struct ActionQueue {
    pending: Mutex<VecDeque<Action>>,
}

impl ActionQueue {
    pub fn new() -> Self {
        ActionQueue {
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Mint a fresh action id and stage the action. Returns the id.
    pub fn stage(&self, channel: u32, number: u32, kind: ActionKind) -> String {
        let action_id = Uuid::new_v4().to_string();
        let action = match kind {
            ActionKind::Unblock { duration_seconds } => action::Action::Unblock(UnblockAction {
                duration_seconds,
            }),
            ActionKind::StopFurtherData => {
                action::Action::StopFurtherData(StopFurtherData {})
            }
        };
        self.put(Action {
            action_id: action_id.clone(),
            channel,
            number,
            action: Some(action),
        });
        debug!(%action_id, channel, read = number, ?kind, "staged action");
        action_id
    }

    pub fn put(&self, action: Action) {
        self.pending.lock().push_back(action);
    }

    /// Remove and return up to `max` actions in FIFO order, without blocking.
    pub fn drain(&self, max: usize) -> Vec<Action> {
        let mut pending = self.pending.lock();
        let take = max.min(pending.len());
        pending.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Discard everything staged, as at session end.
    pub fn reset(&self) {
        self.pending.lock().clear();
    }
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new()
    }
}
