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

use flowlink_cloud::{DeploymentLayout, FunctionInvoker, ObjectStore, ResourceMap};
use flowlink_config::{ApplicationConfig, COORDINATOR_COMPONENT};
use flowlink_error::{make_err, Code, Error, ResultExt};
use serde_json::json;
use tokio::time::sleep;
use tracing::{event, Level};

const CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Optional user code run once the deployment is confirmed live.
pub type SwitchoverHook =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send>> + Send>;

type SleepFn = Box<dyn Fn(Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Drives the post-provisioning sequence: publish the resource map, seed
/// the coordinator wave, await the confirmation artifact, run the user
/// hook. Any step error aborts the chain and skips the hook.
pub struct SwitchoverController {
    app: Arc<ApplicationConfig>,
    store: Arc<dyn ObjectStore>,
    functions: Arc<dyn FunctionInvoker>,
    layout: DeploymentLayout,
    sleep_fn: SleepFn,
}

impl SwitchoverController {
    pub fn new(
        app: Arc<ApplicationConfig>,
        store: Arc<dyn ObjectStore>,
        functions: Arc<dyn FunctionInvoker>,
    ) -> Self {
        Self::new_with_sleep_fn(
            app,
            store,
            functions,
            Box::new(|duration| Box::pin(sleep(duration))),
        )
    }

    pub fn new_with_sleep_fn(
        app: Arc<ApplicationConfig>,
        store: Arc<dyn ObjectStore>,
        functions: Arc<dyn FunctionInvoker>,
        sleep_fn: SleepFn,
    ) -> Self {
        let layout = DeploymentLayout::new(&app);
        SwitchoverController {
            app,
            store,
            functions,
            layout,
            sleep_fn,
        }
    }

    pub async fn run(
        &self,
        resource_map: &ResourceMap,
        hook: Option<SwitchoverHook>,
    ) -> Result<(), Error> {
        self.publish(resource_map).await?;
        self.seed_coordinators(resource_map).await?;
        self.await_confirmation().await?;
        if let Some(hook) = hook {
            hook().await.err_tip(|| "Switchover hook failed")?;
        }
        Ok(())
    }

    /// Publishes the resource map at its well-known key, plus an advisory
    /// copy of the configuration next to it.
    async fn publish(&self, resource_map: &ResourceMap) -> Result<(), Error> {
        self.store
            .put_json(&self.layout.resource_map_key(), &resource_map.to_value()?)
            .await
            .err_tip(|| "Failed to publish resource map")?;
        let config_text = serde_json::to_string_pretty(self.app.as_ref())
            .err_tip(|| "Failed to serialize advisory config copy")?;
        self.store
            .put_text(&self.layout.config_key(), &config_text, "application/json")
            .await
            .err_tip(|| "Failed to publish advisory config copy")
    }

    /// Launches `coordinator_concurrency` seed invocations spaced evenly
    /// across one control interval so their chains stay staggered.
    async fn seed_coordinators(&self, resource_map: &ResourceMap) -> Result<(), Error> {
        let coordinator_function = resource_map.function(COORDINATOR_COMPONENT)?;
        let concurrency = self.app.coordinator.coordinator_concurrency.max(1);
        let spacing =
            Duration::from_secs(self.app.coordinator.min_interval) / concurrency as u32;
        for index in 0..concurrency {
            if index > 0 && !spacing.is_zero() {
                (self.sleep_fn)(spacing).await;
            }
            self.functions
                .invoke_event(coordinator_function, &json!({}))
                .await
                .err_tip(|| format!("Failed to seed coordinator {index}"))?;
            event!(Level::INFO, index, "Seeded coordinator");
        }
        Ok(())
    }

    /// Polls for the confirmation artifact on a 2 s cadence for up to
    /// twice (the control interval + 1) seconds.
    async fn await_confirmation(&self) -> Result<(), Error> {
        let confirmation_key = self.layout.confirmation_key();
        let limit = Duration::from_secs(2 * (self.app.coordinator.min_interval + 1));
        let mut waited = Duration::ZERO;
        loop {
            if self
                .store
                .exists(&confirmation_key)
                .await
                .err_tip(|| "Failed to poll for the confirmation artifact")?
            {
                event!(Level::INFO, "Deployment confirmed live");
                return Ok(());
            }
            if waited >= limit {
                return Err(make_err!(
                    Code::DeadlineExceeded,
                    "No confirmation artifact appeared within {}s",
                    limit.as_secs()
                ));
            }
            (self.sleep_fn)(CONFIRMATION_POLL_INTERVAL).await;
            waited += CONFIRMATION_POLL_INTERVAL;
        }
    }
}
