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

use flowlink_cloud::{MessageQueue, ResourceMap};
use flowlink_config::{ApplicationConfig, COORDINATOR_COMPONENT, INVOKER_COMPONENT};
use futures::future::join_all;
use serde::Serialize;
use tracing::{event, Level};

/// A single measurement pass over one component. A `None` field means the
/// measurement failed; it was logged and the planner treats the component
/// as unmeasurable rather than idle.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    pub name: String,

    /// Approximate live-worker count from the concurrency ledger.
    pub concurrency: Option<usize>,

    /// Approximate input-queue depth. Only message-driven components have
    /// one.
    pub queued_messages: Option<usize>,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationStatus {
    pub components: Vec<ComponentStatus>,
}

impl ApplicationStatus {
    pub fn component(&self, name: &str) -> Option<&ComponentStatus> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// Measures every component, internal ones included. Individual failures
/// are logged and leave their field unset; one flaky queue must not blind
/// the whole pass.
pub async fn measure(
    app: &ApplicationConfig,
    map: &ResourceMap,
    queue: &dyn MessageQueue,
) -> ApplicationStatus {
    let mut targets: Vec<(String, bool)> = vec![
        (COORDINATOR_COMPONENT.to_string(), false),
        (INVOKER_COMPONENT.to_string(), false),
    ];
    targets.extend(
        app.components
            .iter()
            .map(|c| (c.name.clone(), c.is_from_message())),
    );

    let components = join_all(targets.into_iter().map(|(name, from_message)| async move {
        let concurrency = depth_of(map.ledger_queue(&name), queue, &name, "ledger").await;
        let queued_messages = if from_message {
            depth_of(map.input_queue(&name), queue, &name, "input").await
        } else {
            None
        };
        ComponentStatus {
            name,
            concurrency,
            queued_messages,
        }
    }))
    .await;

    ApplicationStatus { components }
}

async fn depth_of(
    queue_url: Result<&str, flowlink_error::Error>,
    queue: &dyn MessageQueue,
    component: &str,
    which: &str,
) -> Option<usize> {
    let queue_url = match queue_url {
        Ok(url) => url,
        Err(e) => {
            event!(
                Level::WARN,
                component,
                which,
                err = %e,
                "No queue to measure"
            );
            return None;
        }
    };
    match queue.approximate_depth(queue_url).await {
        Ok(depth) => Some(depth),
        Err(e) => {
            event!(
                Level::WARN,
                component,
                which,
                err = %e,
                "Depth measurement failed"
            );
            None
        }
    }
}
