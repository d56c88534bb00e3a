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
    DeploymentLayout, LifecycleOutcome, MemoryFunctionInvoker, MemoryMessageQueue,
    MemoryObjectStore, MessageQueue, ObjectStore, RecordingLifecycleContext, ResourceMap,
};
use flowlink_config::ApplicationConfig;
use flowlink_coordinator::{Coordinator, CoordinatorEvent, CoordinatorOptions};
use flowlink_error::Error;
use futures::future::ready;
use parking_lot::Mutex;
use serde_json::json;

const A_INPUT: &str = "memory://aInput";

fn app_config(coordinator_concurrency: usize) -> Arc<ApplicationConfig> {
    Arc::new(
        ApplicationConfig::parse(&format!(
            r#"{{
              name: "coordtest",
              version: "1",
              deployId: 7,
              deployment: {{ region: "us-east-1", s3Bucket: "b", s3KeyPrefix: "apps" }},
              coordinator: {{
                coordinatorConcurrency: {coordinator_concurrency},
                maxApiConcurrency: 10,
                maxInvocationCount: 20,
                minInterval: 10,
              }},
              roles: [{{ name: "default" }}],
              components: [
                {{
                  name: "a",
                  kind: {{ fromMessage: {{ maxConcurrency: 10 }} }},
                  worker: {{ handler: "a.handler", memory: 128, timeout: 60, role: "default" }},
                }},
              ],
            }}"#
        ))
        .unwrap(),
    )
}

struct Fixture {
    app: Arc<ApplicationConfig>,
    queue: Arc<MemoryMessageQueue>,
    store: Arc<MemoryObjectStore>,
    functions: Arc<MemoryFunctionInvoker>,
    layout: DeploymentLayout,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl Fixture {
    async fn new(coordinator_concurrency: usize) -> Self {
        let app = app_config(coordinator_concurrency);
        let store = Arc::new(MemoryObjectStore::new());
        let map: ResourceMap = [
            ("coordinatorLedgerQueue", "memory://coordinatorLedger"),
            ("coordinatorFunction", "coordinatorFn"),
            ("invokerLedgerQueue", "memory://invokerLedger"),
            ("invokerFunction", "invokerFn"),
            ("aInputQueue", A_INPUT),
            ("aLedgerQueue", "memory://aLedger"),
            ("aFunction", "aFn"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let layout = DeploymentLayout::new(&app);
        store
            .put_json(&layout.resource_map_key(), &map.to_value().unwrap())
            .await
            .unwrap();
        Fixture {
            app,
            queue: Arc::new(MemoryMessageQueue::new()),
            store,
            functions: Arc::new(MemoryFunctionInvoker::new()),
            layout,
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn coordinator(&self) -> Coordinator {
        let sleeps = self.sleeps.clone();
        Coordinator::new_with_options(
            self.app.clone(),
            self.queue.clone(),
            self.store.clone(),
            self.functions.clone(),
            CoordinatorOptions {
                sleep_fn: Box::new(move |duration| {
                    sleeps.lock().push(duration);
                    Box::pin(ready(()))
                }),
            },
        )
    }
}

#[cfg(test)]
mod coordinator_tests {
    use super::*;
    use pretty_assertions::assert_eq; // Must be declared in every module.

    #[tokio::test(start_paused = true)]
    async fn empty_application_only_chains() -> Result<(), Error> {
        let fixture = Fixture::new(1).await;
        let coordinator = fixture.coordinator();
        let lifecycle = Arc::new(RecordingLifecycleContext::new(Duration::from_secs(300)));
        coordinator
            .handle(CoordinatorEvent::default(), lifecycle.clone())
            .await;

        // No worker invocations, just the self-chain at generation 1.
        let recorded = fixture.functions.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].function, "coordinatorFn");
        assert_eq!(recorded[0].payload, json!({"generation": 1}));

        // The first clean generation confirms the deployment.
        assert_eq!(
            fixture.store.text(&fixture.layout.confirmation_key()),
            Some("confirmed\n".to_string())
        );

        // It slept out the whole interval and finished cleanly.
        assert_eq!(*fixture.sleeps.lock(), vec![Duration::from_secs(10)]);
        let outcomes = lifecycle.outcomes();
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            LifecycleOutcome::Done { error, result } => {
                assert_eq!(error, &None);
                let status = result.as_ref().expect("Expected a status payload");
                let components = status["components"].as_array().unwrap();
                let a = components
                    .iter()
                    .find(|c| c["name"] == "a")
                    .expect("Expected component a in the status");
                assert_eq!(a["concurrency"], json!(0));
                assert_eq!(a["queuedMessages"], json!(0));
            }
            other => panic!("Expected done, got {other:?}"),
        }

        // Its own ledger bracket balanced out.
        assert_eq!(
            fixture
                .queue
                .approximate_depth("memory://coordinatorLedger")
                .await?,
            0
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn queued_messages_dispatch_up_to_headroom() -> Result<(), Error> {
        let fixture = Fixture::new(1).await;
        for _ in 0..3 {
            fixture.queue.send(A_INPUT, &json!({"x": 1})).await?;
        }
        let coordinator = fixture.coordinator();
        let lifecycle = Arc::new(RecordingLifecycleContext::new(Duration::from_secs(300)));
        coordinator
            .handle(CoordinatorEvent::default(), lifecycle.clone())
            .await;

        assert_eq!(fixture.functions.count_for("aFn"), 3);
        assert_eq!(fixture.functions.count_for("coordinatorFn"), 1);
        // Worker invocations carry an empty payload; the wrapper fetches
        // the real input from the queue.
        for invocation in fixture.functions.recorded() {
            if invocation.function == "aFn" {
                assert_eq!(invocation.payload, json!({}));
            }
        }
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn generations_increment_and_confirmation_stays_untouched() -> Result<(), Error> {
        let fixture = Fixture::new(1).await;
        // A previous generation-1 pass already confirmed this deployment.
        fixture
            .store
            .put_text(&fixture.layout.confirmation_key(), "original", "text/plain")
            .await?;

        let coordinator = fixture.coordinator();
        let lifecycle = Arc::new(RecordingLifecycleContext::new(Duration::from_secs(300)));
        coordinator
            .handle(CoordinatorEvent { generation: 0 }, lifecycle.clone())
            .await;
        coordinator
            .handle(CoordinatorEvent { generation: 1 }, lifecycle.clone())
            .await;

        let chains: Vec<_> = fixture
            .functions
            .recorded()
            .into_iter()
            .filter(|i| i.function == "coordinatorFn")
            .collect();
        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].payload, json!({"generation": 1}));
        assert_eq!(chains[1].payload, json!({"generation": 2}));

        // Never overwritten by any later pass.
        assert_eq!(
            fixture.store.text(&fixture.layout.confirmation_key()),
            Some("original".to_string())
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn redundancy_tops_up_missing_coordinators() -> Result<(), Error> {
        let fixture = Fixture::new(3).await;
        let coordinator = fixture.coordinator();
        let lifecycle = Arc::new(RecordingLifecycleContext::new(Duration::from_secs(300)));
        // Generation 2 observes only itself on the coordinator ledger and
        // tops the pool up to three, re-sending its own incoming event.
        coordinator
            .handle(CoordinatorEvent { generation: 1 }, lifecycle.clone())
            .await;

        let coordinator_calls: Vec<_> = fixture
            .functions
            .recorded()
            .into_iter()
            .filter(|i| i.function == "coordinatorFn")
            .collect();
        let redundancy: Vec<_> = coordinator_calls
            .iter()
            .filter(|i| i.payload == json!({"generation": 1}))
            .collect();
        let chain: Vec<_> = coordinator_calls
            .iter()
            .filter(|i| i.payload == json!({"generation": 2}))
            .collect();
        assert_eq!(redundancy.len(), 2, "Expected two redundant launches");
        assert_eq!(chain.len(), 1, "Expected exactly one self-chain");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn generation_one_skips_redundancy() -> Result<(), Error> {
        let fixture = Fixture::new(3).await;
        let coordinator = fixture.coordinator();
        let lifecycle = Arc::new(RecordingLifecycleContext::new(Duration::from_secs(300)));
        coordinator
            .handle(CoordinatorEvent { generation: 0 }, lifecycle.clone())
            .await;

        // Only the self-chain; the seeding wave provides the redundancy.
        assert_eq!(fixture.functions.count_for("coordinatorFn"), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_never_eats_into_the_deadline_reserve() -> Result<(), Error> {
        let fixture = Fixture::new(1).await;
        let coordinator = fixture.coordinator();
        // 8 s left on the platform clock, 5 s reserved: sleep at most 3 s
        // even though the interval wants 10 s.
        let lifecycle = Arc::new(RecordingLifecycleContext::new(Duration::from_secs(8)));
        coordinator
            .handle(CoordinatorEvent::default(), lifecycle.clone())
            .await;

        assert_eq!(*fixture.sleeps.lock(), vec![Duration::from_secs(3)]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn missing_resource_map_fails_without_chaining() -> Result<(), Error> {
        let fixture = Fixture::new(1).await;
        fixture.store.remove(&fixture.layout.resource_map_key());
        let coordinator = fixture.coordinator();
        let lifecycle = Arc::new(RecordingLifecycleContext::new(Duration::from_secs(300)));
        coordinator
            .handle(CoordinatorEvent::default(), lifecycle.clone())
            .await;

        assert_eq!(fixture.functions.recorded().len(), 0, "No chain, no dispatch");
        let outcomes = lifecycle.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], LifecycleOutcome::Fail { .. }));
        // The ledger was never touched.
        assert_eq!(
            fixture
                .queue
                .approximate_depth("memory://coordinatorLedger")
                .await?,
            0
        );
        Ok(())
    }
}
