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

use flowlink_cloud::{FunctionInvoker, ResourceMap};
use flowlink_config::INVOKER_COMPONENT;
use flowlink_error::Error;
use futures::stream::{self, StreamExt};
use serde_json::json;
use tracing::{event, Level};

use crate::plan::InvocationPlan;

/// Issues a plan: every local count becomes that many event-style worker
/// invocations with an empty payload, every remote bin becomes one invoker
/// invocation carrying the bin. API calls run at most
/// `max_api_concurrency` at a time. Every dispatch is attempted; the
/// first error is returned once all have settled.
pub async fn dispatch_plan(
    map: &ResourceMap,
    functions: &dyn FunctionInvoker,
    plan: &InvocationPlan,
    max_api_concurrency: usize,
) -> Result<(), Error> {
    let mut first_error: Option<Error> = None;
    let mut jobs: Vec<(String, serde_json::Value)> = Vec::new();

    for count in &plan.local {
        match map.function(&count.name) {
            Ok(function) => {
                for _ in 0..count.count {
                    jobs.push((function.to_string(), json!({})));
                }
            }
            Err(e) => {
                event!(
                    Level::ERROR,
                    component = %count.name,
                    err = %e,
                    "No function to dispatch to"
                );
                first_error.get_or_insert(e);
            }
        }
    }

    if !plan.remote.is_empty() {
        match map.function(INVOKER_COMPONENT) {
            Ok(invoker_function) => {
                for bin in &plan.remote {
                    jobs.push((invoker_function.to_string(), json!({ "components": bin })));
                }
            }
            Err(e) => {
                event!(Level::ERROR, err = %e, "No invoker function to delegate to");
                first_error.get_or_insert(e);
            }
        }
    }

    let results = stream::iter(jobs.into_iter().map(|(function, payload)| async move {
        let result = functions.invoke_event(&function, &payload).await;
        (function, result)
    }))
    .buffer_unordered(max_api_concurrency.max(1))
    .collect::<Vec<_>>()
    .await;

    for (function, result) in results {
        if let Err(e) = result {
            event!(
                Level::ERROR,
                function = %function,
                err = %e,
                "Plan dispatch invocation failed"
            );
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
