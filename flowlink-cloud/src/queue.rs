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

use std::time::Duration;

use async_trait::async_trait;
use flowlink_error::Error;
use serde_json::Value;

/// One message pulled off a queue. Holding the receipt is what keeps the
/// message invisible; deleting with it acknowledges the message for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub body: String,
    pub receipt: String,
}

/// Thin abstraction over a managed message queue service. One instance
/// serves every queue of the deployment; operations name the queue they
/// act on.
///
/// All operations except `delete` retry transient failures internally.
/// `delete` is deliberately not retried: a failed delete lets the message
/// reappear after its visibility timeout and be reprocessed, which is the
/// intended recovery.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn send(&self, queue: &str, payload: &Value) -> Result<(), Error>;

    /// Receives at most one message. `None` is not an error; it means the
    /// queue had nothing visible within `wait`.
    async fn receive_one(
        &self,
        queue: &str,
        visibility: Duration,
        wait: Duration,
    ) -> Result<Option<ReceivedMessage>, Error>;

    async fn delete(&self, queue: &str, receipt: &str) -> Result<(), Error>;

    /// The service's approximate count of visible messages. Eventually
    /// consistent; callers must treat it as an estimate.
    async fn approximate_depth(&self, queue: &str) -> Result<usize, Error>;
}
