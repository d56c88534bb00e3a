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

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use flowlink_cloud::{
    ConcurrencyLedger, DeploymentLayout, FunctionInvoker, LifecycleContext, MessageQueue,
    ObjectStore, ResourceMap,
};
use flowlink_config::{ApplicationConfig, COORDINATOR_COMPONENT, MIN_QUEUE_RETENTION_S};
use flowlink_error::Error;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::{sleep, Instant};
use tracing::{event, Level};

use crate::dispatch::dispatch_plan;
use crate::plan::build_plan;
use crate::status::measure;

/// The coordinator never sleeps into the last stretch of the platform's
/// time budget; this much is always left for the tail of the pipeline.
const DEADLINE_RESERVE: Duration = Duration::from_secs(5);

/// Internal components have no user-configured worker timeout; their
/// ledger visibility uses the queue service's retention floor.
pub(crate) const INTERNAL_LEDGER_VISIBILITY: Duration =
    Duration::from_secs(MIN_QUEUE_RETENTION_S);

/// The event a coordinator invocation receives. External seeds send `{}`;
/// every self-chain carries the incremented generation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorEvent {
    #[serde(default)]
    pub generation: u64,
}

type SleepFn = Box<dyn Fn(Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct CoordinatorOptions {
    /// Injected so tests never wait out real control intervals.
    pub sleep_fn: SleepFn,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        CoordinatorOptions {
            sleep_fn: Box::new(|duration| Box::pin(sleep(duration))),
        }
    }
}

pub(crate) fn internal_ledger(
    queue: Arc<dyn MessageQueue>,
    map: &ResourceMap,
    component: &str,
) -> Result<ConcurrencyLedger, Error> {
    let queue_url = map.ledger_queue(component)?.to_string();
    ConcurrencyLedger::new(queue, queue_url, INTERNAL_LEDGER_VISIBILITY, Duration::ZERO)
}

/// The control loop, one pass per invocation: measure the application,
/// keep coordinator redundancy topped up, dispatch the invocation plan,
/// sleep out the control interval, and chain the next generation.
pub struct Coordinator {
    app: Arc<ApplicationConfig>,
    queue: Arc<dyn MessageQueue>,
    store: Arc<dyn ObjectStore>,
    functions: Arc<dyn FunctionInvoker>,
    layout: DeploymentLayout,
    options: CoordinatorOptions,
}

impl Coordinator {
    pub fn new(
        app: Arc<ApplicationConfig>,
        queue: Arc<dyn MessageQueue>,
        store: Arc<dyn ObjectStore>,
        functions: Arc<dyn FunctionInvoker>,
    ) -> Self {
        Self::new_with_options(app, queue, store, functions, CoordinatorOptions::default())
    }

    pub fn new_with_options(
        app: Arc<ApplicationConfig>,
        queue: Arc<dyn MessageQueue>,
        store: Arc<dyn ObjectStore>,
        functions: Arc<dyn FunctionInvoker>,
        options: CoordinatorOptions,
    ) -> Self {
        let layout = DeploymentLayout::new(&app);
        Coordinator {
            app,
            queue,
            store,
            functions,
            layout,
            options,
        }
    }

    pub async fn handle(&self, event: CoordinatorEvent, original: Arc<dyn LifecycleContext>) {
        let started = Instant::now();
        let generation = event.generation + 1;

        // 1. Load the resource map. Fatal: a coordinator that cannot see
        //    its application must not chain, which terminates the loop.
        let map = match ResourceMap::load(self.store.as_ref(), &self.layout).await {
            Ok(map) => map,
            Err(e) => {
                event!(
                    Level::ERROR,
                    generation,
                    err = %e,
                    "Resource map load failed; the control loop ends here"
                );
                original.fail(e).await;
                return;
            }
        };

        // 2. Increment the coordinator ledger. Fatal on failure.
        let ledger = match internal_ledger(self.queue.clone(), &map, COORDINATOR_COMPONENT) {
            Ok(ledger) => ledger,
            Err(e) => {
                original.fail(e).await;
                return;
            }
        };
        if let Err(e) = ledger.increment().await {
            original.fail(e).await;
            return;
        }

        let mut first_error: Option<Error> = None;

        // 3. Measure application status.
        let status = measure(&self.app, &map, self.queue.as_ref()).await;

        // 4. Ensure coordinator redundancy. Generation 1 is the seeding
        //    wave itself and skips this.
        if generation > 1 {
            if let Some(observed) = status
                .component(COORDINATOR_COMPONENT)
                .and_then(|c| c.concurrency)
            {
                let target = self.app.coordinator.coordinator_concurrency;
                if observed < target {
                    match map.function(COORDINATOR_COMPONENT) {
                        Ok(coordinator_function) => {
                            for _ in observed..target {
                                // Recipients increment this event themselves
                                // and join at our generation.
                                if let Err(e) = self
                                    .functions
                                    .invoke_event(
                                        coordinator_function,
                                        &json!({ "generation": event.generation }),
                                    )
                                    .await
                                {
                                    event!(
                                        Level::ERROR,
                                        generation,
                                        err = %e,
                                        "Failed to launch a redundant coordinator"
                                    );
                                    first_error.get_or_insert(e);
                                }
                            }
                        }
                        Err(e) => {
                            event!(Level::ERROR, err = %e, "No coordinator function in map");
                            first_error.get_or_insert(e);
                        }
                    }
                }
            }
        }

        // 5. Compute and dispatch the invocation plan.
        let plan = build_plan(&self.app, &status);
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

        // 6. Sleep out the remainder of the control interval, never into
        //    the reserved tail of the platform deadline.
        let elapsed = started.elapsed();
        let interval = Duration::from_secs(self.app.coordinator.min_interval);
        let budget = original.remaining_time().saturating_sub(DEADLINE_RESERVE);
        let sleep_for = interval.saturating_sub(elapsed).min(budget);
        if !sleep_for.is_zero() {
            (self.options.sleep_fn)(sleep_for).await;
        }

        // 7. Decrement the coordinator ledger.
        if let Err(e) = ledger.decrement().await {
            event!(Level::ERROR, generation, err = %e, "Coordinator decrement failed");
            first_error.get_or_insert(e);
        }

        // 8. Chain the next generation, then confirm the deployment if this
        //    was a clean first generation, then complete exactly once.
        match map.function(COORDINATOR_COMPONENT) {
            Ok(coordinator_function) => {
                if let Err(e) = self
                    .functions
                    .invoke_event(coordinator_function, &json!({ "generation": generation }))
                    .await
                {
                    event!(
                        Level::ERROR,
                        generation,
                        err = %e,
                        "Chain invocation failed; the control loop may stall"
                    );
                    first_error.get_or_insert(e);
                }
            }
            Err(e) => {
                event!(Level::ERROR, err = %e, "No coordinator function to chain to");
                first_error.get_or_insert(e);
            }
        }

        if generation == 1 && first_error.is_none() {
            let confirmation_key = self.layout.confirmation_key();
            match self.store.exists(&confirmation_key).await {
                Ok(true) => {}
                Ok(false) => {
                    if let Err(e) = self
                        .store
                        .put_text(&confirmation_key, "confirmed\n", "text/plain")
                        .await
                    {
                        event!(Level::ERROR, err = %e, "Confirmation write failed");
                        first_error.get_or_insert(e);
                    }
                }
                Err(e) => {
                    event!(Level::ERROR, err = %e, "Confirmation existence check failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        let status_value = serde_json::to_value(&status).ok();
        original.done(first_error, status_value).await;
    }
}
