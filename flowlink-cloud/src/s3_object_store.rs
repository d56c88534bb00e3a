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

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_smithy_runtime_api::client::result::SdkError;
use flowlink_error::{make_err, Code, Error, ResultExt};
use flowlink_util::retry::{Retrier, RetryResult};
use futures::stream::unfold;
use serde_json::Value;
use tokio::time::sleep;

use crate::object_store::ObjectStore;
use crate::sdk::{default_backoff, sdk_retry_result};

/// Object store gateway backed by S3.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    retrier: Retrier,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        S3ObjectStore {
            client,
            bucket: bucket.into(),
            retrier: Retrier::new(Box::new(|duration| Box::pin(sleep(duration)))),
        }
    }

    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_s3::Client::new(&sdk_config), bucket)
    }

    async fn put_bytes(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), Error> {
        let client = &self.client;
        let bucket = &self.bucket;
        let bytes = &bytes;
        self.retrier
            .retry(
                "s3_put",
                default_backoff(),
                unfold((), move |state| async move {
                    let result = client
                        .put_object()
                        .bucket(bucket)
                        .key(key)
                        .content_type(content_type)
                        .body(ByteStream::from(bytes.clone()))
                        .send()
                        .await;
                    let retry_result = match result {
                        Ok(_) => RetryResult::Ok(()),
                        Err(e) => sdk_retry_result(e, &format!("Failed to put '{key}' to s3")),
                    };
                    Some((retry_result, state))
                }),
            )
            .await
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_json(&self, key: &str, value: &Value) -> Result<(), Error> {
        let bytes = serde_json::to_vec(value)
            .err_tip(|| format!("Failed to serialize json for '{key}'"))?;
        self.put_bytes(key, bytes, "application/json").await
    }

    async fn put_text(&self, key: &str, contents: &str, content_type: &str) -> Result<(), Error> {
        self.put_bytes(key, contents.as_bytes().to_vec(), content_type)
            .await
    }

    async fn get_json(&self, key: &str) -> Result<Value, Error> {
        let client = &self.client;
        let bucket = &self.bucket;
        self.retrier
            .retry(
                "s3_get",
                default_backoff(),
                unfold((), move |state| async move {
                    let result = client.get_object().bucket(bucket).key(key).send().await;
                    let retry_result = match result {
                        Ok(output) => match output.body.collect().await {
                            Ok(bytes) => {
                                match serde_json::from_slice::<Value>(&bytes.into_bytes()) {
                                    Ok(value) => RetryResult::Ok(value),
                                    Err(e) => RetryResult::Err(make_err!(
                                        Code::InvalidArgument,
                                        "Object '{key}' is not valid json: {e}"
                                    )),
                                }
                            }
                            Err(e) => RetryResult::Retry(make_err!(
                                Code::Unavailable,
                                "Failed to stream body of '{key}' from s3: {e}"
                            )),
                        },
                        Err(e) => {
                            // A missing object will not appear on a retry.
                            if e.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                                RetryResult::Err(make_err!(
                                    Code::NotFound,
                                    "Object '{key}' not found in s3"
                                ))
                            } else {
                                sdk_retry_result(e, &format!("Failed to get '{key}' from s3"))
                            }
                        }
                    };
                    Some((retry_result, state))
                }),
            )
            .await
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        let client = &self.client;
        let bucket = &self.bucket;
        self.retrier
            .retry(
                "s3_exists",
                default_backoff(),
                unfold((), move |state| async move {
                    let result = client.head_object().bucket(bucket).key(key).send().await;
                    let retry_result = match result {
                        // Object found in s3.
                        Ok(_) => RetryResult::Ok(true),

                        // Object not found in s3; a definitive answer.
                        Err(e) if e.as_service_error().is_some_and(|e| e.is_not_found()) => {
                            RetryResult::Ok(false)
                        }
                        Err(SdkError::ServiceError(context))
                            if context.raw().status().as_u16() == 404 =>
                        {
                            RetryResult::Ok(false)
                        }

                        Err(e) => sdk_retry_result(e, &format!("Failed to head '{key}' in s3")),
                    };
                    Some((retry_result, state))
                }),
            )
            .await
    }
}
