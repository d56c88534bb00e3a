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

use flowlink_cloud::{
    MemoryFunctionInvoker, MemoryMessageQueue, MessageQueue, ResourceMap,
};
use flowlink_config::ApplicationConfig;
use flowlink_error::{make_err, Code, Error};
use flowlink_worker::{RouteEntry, Router, Routing};
use serde_json::{json, Value};

const APP_CONFIG: &str = r#"
{
  name: "routetest",
  version: "1",
  deployId: 1,
  deployment: { region: "us-east-1", s3Bucket: "bucket", s3KeyPrefix: "apps" },
  coordinator: {},
  roles: [{ name: "default" }],
  components: [
    {
      name: "a",
      kind: { fromMessage: { maxConcurrency: 5 } },
      worker: { handler: "a.handler", memory: 128, timeout: 60, role: "default" },
    },
    {
      name: "b",
      kind: "fromInvocation",
      worker: { handler: "b.handler", memory: 128, timeout: 30, role: "default" },
    },
  ],
}
"#;

fn make_router() -> (Router, Arc<MemoryMessageQueue>, Arc<MemoryFunctionInvoker>) {
    let app = Arc::new(ApplicationConfig::parse(APP_CONFIG).unwrap());
    let map: ResourceMap = [
        ("aInputQueue", "memory://aInput"),
        ("aLedgerQueue", "memory://aLedger"),
        ("aFunction", "aFn"),
        ("bLedgerQueue", "memory://bLedger"),
        ("bFunction", "bFn"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let queue = Arc::new(MemoryMessageQueue::new());
    let functions = Arc::new(MemoryFunctionInvoker::new());
    let router = Router::new(app, Arc::new(map), queue.clone(), functions.clone());
    (router, queue, functions)
}

#[cfg(test)]
mod routing_tests {
    use super::*;
    use pretty_assertions::assert_eq; // Must be declared in every module.

    #[test]
    fn name_routing_skips_on_error() {
        let error = make_err!(Code::Internal, "Worker failed");
        let entries = Router::entries(
            &Routing::Many(vec!["a".to_string(), "b".to_string()]),
            Some(&error),
            Some(&json!({"x": 2})),
        );
        assert_eq!(entries, Vec::<RouteEntry>::new());
    }

    #[test]
    fn name_routing_carries_result_unchanged() {
        let entries = Router::entries(
            &Routing::One("a".to_string()),
            None,
            Some(&json!({"x": 2})),
        );
        assert_eq!(
            entries,
            vec![RouteEntry {
                target: "a".to_string(),
                payload: json!({"x": 2}),
            }]
        );
    }

    #[test]
    fn expression_accepts_single_object_or_list() {
        let single: Routing = Routing::Expr(Arc::new(|_error, _result| {
            json!({ "target": "a", "payload": { "k": 1 } })
        }));
        assert_eq!(
            Router::entries(&single, None, None),
            vec![RouteEntry {
                target: "a".to_string(),
                payload: json!({"k": 1}),
            }]
        );

        let list: Routing = Routing::Expr(Arc::new(|_error, _result| {
            json!([
                { "target": "a", "payload": { "k": 1 } },
                { "target": "b", "payload": { "k": 2 } },
            ])
        }));
        assert_eq!(
            Router::entries(&list, None, None),
            vec![
                RouteEntry {
                    target: "a".to_string(),
                    payload: json!({"k": 1}),
                },
                RouteEntry {
                    target: "b".to_string(),
                    payload: json!({"k": 2}),
                },
            ]
        );
    }

    #[test]
    fn expression_drops_malformed_entries() {
        let routing: Routing = Routing::Expr(Arc::new(|_error, _result| {
            json!([
                null,
                42,
                "not-an-object",
                { "payload": { "orphan": true } },
                { "target": "" },
                { "target": "a", "payload": { "k": 1 } },
                { "target": "b" },
            ])
        }));
        assert_eq!(
            Router::entries(&routing, None, None),
            vec![
                RouteEntry {
                    target: "a".to_string(),
                    payload: json!({"k": 1}),
                },
                RouteEntry {
                    target: "b".to_string(),
                    payload: Value::Null,
                },
            ]
        );
    }

    #[tokio::test]
    async fn dispatch_sends_to_queue_and_invokes_function() -> Result<(), Error> {
        let (router, queue, functions) = make_router();
        let routing: Routing = Routing::Expr(Arc::new(|_error, _result| {
            json!([
                { "target": "a", "payload": { "k": 1 } },
                { "target": "b", "payload": { "k": 2 } },
            ])
        }));
        router.dispatch(&routing, None, None).await?;

        let queued = queue
            .receive_one("memory://aInput", Duration::from_secs(1), Duration::ZERO)
            .await?
            .expect("Expected a queued message");
        assert_eq!(queued.body, "{\"k\":1}");

        let recorded = functions.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].function, "bFn");
        assert_eq!(recorded[0].payload, json!({"k": 2}));
        Ok(())
    }

    #[tokio::test]
    async fn dispatch_to_unknown_component_is_invalid_destination() {
        let (router, _queue, _functions) = make_router();
        let routing = Routing::One("missing".to_string());
        let err = router
            .dispatch(&routing, None, Some(&json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
        assert!(
            err.message_string().contains("Invalid routing destination"),
            "Got: {err}"
        );
    }

    #[tokio::test]
    async fn dispatch_attempts_every_entry_despite_errors() -> Result<(), Error> {
        let (router, queue, _functions) = make_router();
        let routing: Routing = Routing::Expr(Arc::new(|_error, _result| {
            json!([
                { "target": "missing", "payload": {} },
                { "target": "a", "payload": { "k": 3 } },
            ])
        }));
        let result = router.dispatch(&routing, None, None).await;
        assert!(result.is_err(), "Expected the bad entry to surface");

        // The good entry was still dispatched.
        let queued = queue
            .receive_one("memory://aInput", Duration::from_secs(1), Duration::ZERO)
            .await?;
        assert!(queued.is_some(), "Expected the good entry to dispatch");
        Ok(())
    }
}
