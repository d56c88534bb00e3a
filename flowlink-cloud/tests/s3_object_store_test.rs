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

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_smithy_runtime::client::http::test_util::{ReplayEvent, StaticReplayClient};
use aws_smithy_types::body::SdkBody;
use flowlink_cloud::{ObjectStore, S3ObjectStore};
use flowlink_error::{Code, Error};
use serde_json::json;

const BUCKET: &str = "flowlink-test-bucket";

fn make_store(events: Vec<ReplayEvent>) -> S3ObjectStore {
    let http_client = StaticReplayClient::new(events);
    let config = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(Credentials::for_tests())
        .http_client(http_client)
        .build();
    S3ObjectStore::new(aws_sdk_s3::Client::from_conf(config), BUCKET)
}

fn request(uri: &str) -> http::Request<SdkBody> {
    http::Request::builder().uri(uri).body(SdkBody::empty()).unwrap()
}

fn response(status: u16, body: &str) -> http::Response<SdkBody> {
    http::Response::builder()
        .status(status)
        .body(SdkBody::from(body.to_string()))
        .unwrap()
}

#[cfg(test)]
mod s3_object_store_tests {
    use super::*;
    use pretty_assertions::assert_eq; // Must be declared in every module.

    #[tokio::test]
    async fn exists_true_on_200() -> Result<(), Error> {
        let store = make_store(vec![ReplayEvent::new(
            request("https://flowlink-test-bucket.s3.us-east-1.amazonaws.com/apps/x/1/confirm.txt"),
            response(200, ""),
        )]);
        assert_eq!(store.exists("apps/x/1/confirm.txt").await?, true);
        Ok(())
    }

    #[tokio::test]
    async fn exists_false_on_404_without_retrying() -> Result<(), Error> {
        // A single replay event proves the 404 short-circuits the retry
        // loop; a second attempt would have no response to consume.
        let store = make_store(vec![ReplayEvent::new(
            request("https://flowlink-test-bucket.s3.us-east-1.amazonaws.com/apps/x/1/confirm.txt"),
            response(404, ""),
        )]);
        assert_eq!(store.exists("apps/x/1/confirm.txt").await?, false);
        Ok(())
    }

    #[tokio::test]
    async fn get_json_parses_object_body() -> Result<(), Error> {
        let store = make_store(vec![ReplayEvent::new(
            request("https://flowlink-test-bucket.s3.us-east-1.amazonaws.com/apps/x/1/arnMap.json"),
            response(200, "{\"resizeInputQueue\":\"https://queue/resize\"}"),
        )]);
        let value = store.get_json("apps/x/1/arnMap.json").await?;
        assert_eq!(value, json!({"resizeInputQueue": "https://queue/resize"}));
        Ok(())
    }

    #[tokio::test]
    async fn get_json_maps_missing_key_to_not_found() {
        let body = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
            <Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>";
        let store = make_store(vec![ReplayEvent::new(
            request("https://flowlink-test-bucket.s3.us-east-1.amazonaws.com/apps/x/1/arnMap.json"),
            response(404, body),
        )]);
        let err = store.get_json("apps/x/1/arnMap.json").await.unwrap_err();
        assert_eq!(err.code, Code::NotFound);
    }

    #[tokio::test]
    async fn put_json_round_trips_on_200() -> Result<(), Error> {
        let store = make_store(vec![ReplayEvent::new(
            request("https://flowlink-test-bucket.s3.us-east-1.amazonaws.com/apps/x/1/arnMap.json"),
            response(200, ""),
        )]);
        store
            .put_json("apps/x/1/arnMap.json", &json!({"coordinatorFunction": "fn"}))
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn put_retries_transient_failure() -> Result<(), Error> {
        let uri = "https://flowlink-test-bucket.s3.us-east-1.amazonaws.com/apps/x/1/confirm.txt";
        let store = make_store(vec![
            ReplayEvent::new(request(uri), response(503, "")),
            ReplayEvent::new(request(uri), response(200, "")),
        ]);
        store.put_text("apps/x/1/confirm.txt", "confirmed", "text/plain").await?;
        Ok(())
    }
}
