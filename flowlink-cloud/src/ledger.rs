// Copyright 2024 The FlowLink Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;
use std::time::Duration;

use flowlink_error::{error_if, Error, ResultExt};
use serde_json::json;
use tracing::{event, Level};

use crate::queue::MessageQueue;

/// Approximate live-worker accounting for one component, piggybacked on a
/// queue: each live worker contributes one message, and the queue's
/// approximate depth is the concurrency estimate. The counter is durable
/// and eventually consistent; workers that crash without decrementing are
/// absorbed when their message falls off retention (retention ≥ the
/// component's worker timeout, floored at 60 s by the service).
pub struct ConcurrencyLedger {
    queue: Arc<dyn MessageQueue>,
    queue_url: String,
    visibility: Duration,
    wait: Duration,
}

impl ConcurrencyLedger {
    /// `visibility` must be strictly positive; a zero value causes silent
    /// delete failures on the backing queue service.
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        queue_url: impl Into<String>,
        visibility: Duration,
        wait: Duration,
    ) -> Result<Self, Error> {
        error_if!(
            visibility.is_zero(),
            "Ledger visibility timeout must be strictly positive"
        );
        Ok(ConcurrencyLedger {
            queue,
            queue_url: queue_url.into(),
            visibility,
            wait,
        })
    }

    /// Registers one live worker by sending an empty message.
    pub async fn increment(&self) -> Result<(), Error> {
        self.queue
            .send(&self.queue_url, &json!({}))
            .await
            .err_tip(|| format!("Failed to increment ledger '{}'", self.queue_url))
    }

    /// Unregisters one live worker. Finding no message after the long poll
    /// is a soft error: another worker got there first or the reading is
    /// lagging, so it is logged and swallowed.
    pub async fn decrement(&self) -> Result<(), Error> {
        let received = self
            .queue
            .receive_one(&self.queue_url, self.visibility, self.wait)
            .await
            .err_tip(|| format!("Failed to receive from ledger '{}'", self.queue_url))?;
        match received {
            Some(message) => self
                .queue
                .delete(&self.queue_url, &message.receipt)
                .await
                .err_tip(|| format!("Failed to delete from ledger '{}'", self.queue_url)),
            None => {
                event!(
                    Level::WARN,
                    queue = %self.queue_url,
                    "Ledger decrement found no message to consume"
                );
                Ok(())
            }
        }
    }

    /// Current concurrency estimate. Always ≥ 0 and at most the true
    /// concurrency plus uncleaned crashes inside the retention window.
    pub async fn reading(&self) -> Result<usize, Error> {
        self.queue
            .approximate_depth(&self.queue_url)
            .await
            .err_tip(|| format!("Failed to read ledger '{}'", self.queue_url))
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}
