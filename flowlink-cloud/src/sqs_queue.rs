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
use aws_sdk_sqs::types::QueueAttributeName;
use flowlink_error::{Error, ResultExt};
use flowlink_util::retry::{Retrier, RetryResult};
use futures::stream::unfold;
use serde_json::Value;
use tokio::time::sleep;

use crate::queue::{MessageQueue, ReceivedMessage};
use crate::sdk::{default_backoff, sdk_err, sdk_retry_result};

/// Queue gateway backed by the managed queue service.
pub struct SqsMessageQueue {
    client: aws_sdk_sqs::Client,
    retrier: Retrier,
}

impl SqsMessageQueue {
    pub fn new(client: aws_sdk_sqs::Client) -> Self {
        SqsMessageQueue {
            client,
            retrier: Retrier::new(Box::new(|duration| Box::pin(sleep(duration)))),
        }
    }

    pub async fn from_env() -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_sqs::Client::new(&sdk_config))
    }
}

#[async_trait]
impl MessageQueue for SqsMessageQueue {
    async fn send(&self, queue: &str, payload: &Value) -> Result<(), Error> {
        let body = payload.to_string();
        let client = &self.client;
        let body = &body;
        self.retrier
            .retry(
                "sqs_send",
                default_backoff(),
                unfold((), move |state| async move {
                    let result = client
                        .send_message()
                        .queue_url(queue)
                        .message_body(body.clone())
                        .send()
                        .await;
                    let retry_result = match result {
                        Ok(_) => RetryResult::Ok(()),
                        Err(e) => {
                            sdk_retry_result(e, &format!("Failed to send message to '{queue}'"))
                        }
                    };
                    Some((retry_result, state))
                }),
            )
            .await
    }

    async fn receive_one(
        &self,
        queue: &str,
        visibility: Duration,
        wait: Duration,
    ) -> Result<Option<ReceivedMessage>, Error> {
        let client = &self.client;
        self.retrier
            .retry(
                "sqs_receive_one",
                default_backoff(),
                unfold((), move |state| async move {
                    let result = client
                        .receive_message()
                        .queue_url(queue)
                        .max_number_of_messages(1)
                        .visibility_timeout(visibility.as_secs() as i32)
                        .wait_time_seconds(wait.as_secs() as i32)
                        .send()
                        .await;
                    let retry_result = match result {
                        Ok(output) => {
                            match output.messages.unwrap_or_default().into_iter().next() {
                                None => RetryResult::Ok(None),
                                Some(message) => {
                                    let body = message.body.err_tip(|| {
                                        format!("Message from '{queue}' came without a body")
                                    });
                                    let receipt = message.receipt_handle.err_tip(|| {
                                        format!("Message from '{queue}' came without a receipt")
                                    });
                                    match (body, receipt) {
                                        (Ok(body), Ok(receipt)) => {
                                            RetryResult::Ok(Some(ReceivedMessage { body, receipt }))
                                        }
                                        (Err(e), _) | (_, Err(e)) => RetryResult::Err(e),
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            sdk_retry_result(e, &format!("Failed to receive from '{queue}'"))
                        }
                    };
                    Some((retry_result, state))
                }),
            )
            .await
    }

    async fn delete(&self, queue: &str, receipt: &str) -> Result<(), Error> {
        // No retry here. A lost delete means the message becomes visible
        // again and gets reprocessed, which the protocol already tolerates.
        self.client
            .delete_message()
            .queue_url(queue)
            .receipt_handle(receipt)
            .send()
            .await
            .map_err(|e| sdk_err(e, &format!("Failed to delete message from '{queue}'")))?;
        Ok(())
    }

    async fn approximate_depth(&self, queue: &str) -> Result<usize, Error> {
        let client = &self.client;
        self.retrier
            .retry(
                "sqs_approximate_depth",
                default_backoff(),
                unfold((), move |state| async move {
                    let result = client
                        .get_queue_attributes()
                        .queue_url(queue)
                        .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
                        .send()
                        .await;
                    let retry_result = match result {
                        Ok(output) => {
                            let depth = output
                                .attributes
                                .as_ref()
                                .and_then(|attributes| {
                                    attributes
                                        .get(&QueueAttributeName::ApproximateNumberOfMessages)
                                })
                                .err_tip(|| {
                                    format!("Queue '{queue}' returned no depth attribute")
                                })
                                .and_then(|depth| {
                                    depth.parse::<usize>().err_tip(|| {
                                        format!("Queue '{queue}' returned a non-numeric depth")
                                    })
                                });
                            match depth {
                                Ok(depth) => RetryResult::Ok(depth),
                                Err(e) => RetryResult::Err(e),
                            }
                        }
                        Err(e) => {
                            sdk_retry_result(e, &format!("Failed to read depth of '{queue}'"))
                        }
                    };
                    Some((retry_result, state))
                }),
            )
            .await
    }
}
