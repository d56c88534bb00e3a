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

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use flowlink_error::{make_err, Code, Error};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::{sleep, Instant};

use crate::queue::{MessageQueue, ReceivedMessage};

const LONG_POLL_INTERVAL: Duration = Duration::from_millis(10);

struct StoredMessage {
    body: String,
    receipt: Option<String>,
    visible_at: Instant,
}

#[derive(Default)]
struct Inner {
    queues: HashMap<String, VecDeque<StoredMessage>>,
    next_receipt: u64,
}

/// In-memory queue gateway with visibility-timeout simulation. Queues
/// spring into existence on first use. Uses the tokio clock, so paused-time
/// tests stay deterministic.
#[derive(Default)]
pub struct MemoryMessageQueue {
    inner: Mutex<Inner>,
}

impl MemoryMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_receive(&self, queue: &str, visibility: Duration) -> Option<ReceivedMessage> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let receipt_id = inner.next_receipt;
        let messages = inner.queues.get_mut(queue)?;
        let message = messages.iter_mut().find(|m| m.visible_at <= now)?;
        let receipt = format!("receipt-{receipt_id}");
        message.receipt = Some(receipt.clone());
        message.visible_at = now + visibility;
        let received = ReceivedMessage {
            body: message.body.clone(),
            receipt,
        };
        inner.next_receipt += 1;
        Some(received)
    }
}

#[async_trait]
impl MessageQueue for MemoryMessageQueue {
    async fn send(&self, queue: &str, payload: &Value) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        inner
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(StoredMessage {
                body: payload.to_string(),
                receipt: None,
                visible_at: Instant::now(),
            });
        Ok(())
    }

    async fn receive_one(
        &self,
        queue: &str,
        visibility: Duration,
        wait: Duration,
    ) -> Result<Option<ReceivedMessage>, Error> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(received) = self.try_receive(queue, visibility) {
                return Ok(Some(received));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(LONG_POLL_INTERVAL).await;
        }
    }

    async fn delete(&self, queue: &str, receipt: &str) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        let messages = inner
            .queues
            .get_mut(queue)
            .ok_or_else(|| make_err!(Code::NotFound, "Queue '{queue}' does not exist"))?;
        let position = messages
            .iter()
            .position(|m| m.receipt.as_deref() == Some(receipt))
            .ok_or_else(|| {
                make_err!(
                    Code::NotFound,
                    "No message with receipt '{receipt}' in '{queue}'"
                )
            })?;
        messages.remove(position);
        Ok(())
    }

    async fn approximate_depth(&self, queue: &str) -> Result<usize, Error> {
        let now = Instant::now();
        let inner = self.inner.lock();
        Ok(inner
            .queues
            .get(queue)
            .map_or(0, |messages| {
                messages.iter().filter(|m| m.visible_at <= now).count()
            }))
    }
}
