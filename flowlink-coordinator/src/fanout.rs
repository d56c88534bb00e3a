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

use flowlink_cloud::{
    DeploymentLayout, FunctionInvoker, LifecycleContext, MessageQueue, ObjectStore, ResourceMap,
};
use flowlink_config::{ApplicationConfig, INVOKER_COMPONENT};
use flowlink_error::Error;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{event, Level};

use crate::coordinator::internal_ledger;
use crate::dispatch::dispatch_plan;
use crate::plan::{pack_counts, InvocationCount};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct InvokerEvent {
    #[serde(default)]
    pub components: Vec<InvocationCount>,
}

/// Pure fan-out amplifier. A coordinator hands it one bin of invocation
/// counts; it re-packs the bin with the same splitter and dispatches,
/// recursively delegating to further invokers when even the bin exceeds
/// the batch limit.
pub struct Invoker {
    app: Arc<ApplicationConfig>,
    queue: Arc<dyn MessageQueue>,
    store: Arc<dyn ObjectStore>,
    functions: Arc<dyn FunctionInvoker>,
    layout: DeploymentLayout,
}

impl Invoker {
    pub fn new(
        app: Arc<ApplicationConfig>,
        queue: Arc<dyn MessageQueue>,
        store: Arc<dyn ObjectStore>,
        functions: Arc<dyn FunctionInvoker>,
    ) -> Self {
        let layout = DeploymentLayout::new(&app);
        Invoker {
            app,
            queue,
            store,
            functions,
            layout,
        }
    }

    pub async fn handle(&self, event: InvokerEvent, original: Arc<dyn LifecycleContext>) {
        let map = match ResourceMap::load(self.store.as_ref(), &self.layout).await {
            Ok(map) => map,
            Err(e) => {
                event!(Level::ERROR, err = %e, "Resource map load failed in invoker");
                original.fail(e).await;
                return;
            }
        };

        let mut first_error: Option<Error> = None;
        let mut incremented = false;
        let ledger = match internal_ledger(self.queue.clone(), &map, INVOKER_COMPONENT) {
            Ok(ledger) => Some(ledger),
            Err(e) => {
                event!(Level::WARN, err = %e, "Invoker has no ledger; count will read low");
                None
            }
        };
        if let Some(ledger) = &ledger {
            match ledger.increment().await {
                Ok(()) => incremented = true,
                Err(e) => event!(Level::WARN, err = %e, "Invoker increment failed"),
            }
        }

        let plan = pack_counts(
            event.components.clone(),
            self.app.coordinator.max_invocation_count,
        );
        if let Err(e) = dispatch_plan(
            &map,
            self.functions.as_ref(),
            &plan,
            self.app.coordinator.max_api_concurrency,
        )
        .await
        {
            first_error.get_or_insert(e);
        }

        if incremented {
            if let Some(ledger) = &ledger {
                if let Err(e) = ledger.decrement().await {
                    event!(Level::ERROR, err = %e, "Invoker decrement failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        let components = json!({ "components": event.components });
        original.done(first_error, Some(components)).await;
    }
}
