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

use std::collections::HashMap;

use flowlink_error::{make_input_err, Error, ResultExt};
use serde::{Deserialize, Serialize};

/// Name of the internal component that runs the control loop.
pub const COORDINATOR_COMPONENT: &str = "coordinator";

/// Name of the internal component that amplifies invocation batches.
pub const INVOKER_COMPONENT: &str = "invoker";

/// Component names user applications may not claim.
pub const RESERVED_COMPONENT_NAMES: [&str; 2] = [COORDINATOR_COMPONENT, INVOKER_COMPONENT];

/// The queue service will not retain messages for less than this, which
/// conveniently absorbs crashed workers that never decremented their ledger.
pub const MIN_QUEUE_RETENTION_S: u64 = 60;

/// Application configuration as produced by the external validator. The
/// runtime trusts these values; range checks live with the validator, not
/// here.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApplicationConfig {
    /// Alphanumeric application name. Used in queue, function and
    /// object-store key names.
    pub name: String,

    /// Free-form application version string.
    pub version: String,

    /// Identifier of this deployment. Successive deploys of the same
    /// application must use distinct values.
    pub deploy_id: DeployId,

    pub deployment: DeploymentConfig,

    pub coordinator: CoordinatorConfig,

    /// Permission roles referenced by component workers. Names are unique.
    pub roles: Vec<RoleConfig>,

    /// User components. Names are unique and outside the reserved set.
    pub components: Vec<ComponentConfig>,
}

impl ApplicationConfig {
    /// Loads a JSON5 configuration file. The path may contain shell
    /// variables or `~`.
    pub fn load_file(path: &str) -> Result<Self, Error> {
        let path = shellexpand::full(path)
            .map_err(|e| make_input_err!("Could not expand config path '{path}': {e}"))?;
        let contents = std::fs::read_to_string(path.as_ref())
            .err_tip(|| format!("Could not read config file '{path}'"))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, Error> {
        serde_json5::from_str(contents)
            .map_err(|e| make_input_err!("Could not parse application config: {e}"))
    }

    pub fn component(&self, name: &str) -> Option<&ComponentConfig> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// Deployment identifiers are strings or non-negative numbers in the
/// configuration file; both render into object-store keys the same way.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum DeployId {
    Number(u64),
    Text(String),
}

impl std::fmt::Display for DeployId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DeployId::Number(n) => write!(f, "{n}"),
            DeployId::Text(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeploymentConfig {
    /// Cloud region every resource of this application lives in.
    pub region: String,

    /// Bucket holding the resource map, the advisory config copy and the
    /// deployment confirmation artifact.
    pub s3_bucket: String,

    /// Key prefix inside the bucket. The full layout is
    /// `<s3KeyPrefix>/<name>/<deployId>/`.
    pub s3_key_prefix: String,

    /// Tags applied to provisioned resources. Advisory for the runtime.
    #[serde(default)]
    pub tags: HashMap<String, String>,

    /// Handler reference of an optional function the deployment driver runs
    /// after switchover completes.
    #[serde(default)]
    pub switchover_hook: Option<String>,

    /// Skip deleting the resources of the previous deployment. Consumed by
    /// the external deployment driver.
    #[serde(default)]
    pub skip_prior_cleanup: bool,

    /// Skip waiting for the confirmation artifact after seeding the
    /// coordinators. Consumed by the external deployment driver.
    #[serde(default)]
    pub skip_confirmation: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// How many coordinator instances run the control loop in parallel.
    /// Each contributes an even share of the invocation plan.
    #[serde(default = "default_coordinator_concurrency")]
    pub coordinator_concurrency: usize,

    /// Upper bound on concurrent cloud API calls issued while dispatching
    /// an invocation plan.
    #[serde(default = "default_max_api_concurrency")]
    pub max_api_concurrency: usize,

    /// Upper bound on the invocations a single coordinator or invoker
    /// issues itself; anything beyond is delegated to invokers.
    #[serde(default = "default_max_invocation_count")]
    pub max_invocation_count: usize,

    /// Target seconds between coordinator passes, in [0, 300].
    #[serde(default = "default_min_interval")]
    pub min_interval: u64,
}

fn default_coordinator_concurrency() -> usize {
    2
}

fn default_max_api_concurrency() -> usize {
    10
}

fn default_max_invocation_count() -> usize {
    20
}

fn default_min_interval() -> u64 {
    10
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            coordinator_concurrency: default_coordinator_concurrency(),
            max_api_concurrency: default_max_api_concurrency(),
            max_invocation_count: default_max_invocation_count(),
            min_interval: default_min_interval(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoleConfig {
    /// Unique role name referenced from component workers.
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ComponentConfig {
    /// Unique, non-empty component name outside the reserved set.
    pub name: String,

    pub kind: ComponentKind,

    pub worker: WorkerConfig,

    /// Where results of this component's worker go. Absent means results
    /// are dropped.
    #[serde(default)]
    pub routing: Option<RoutingConfig>,
}

impl ComponentConfig {
    pub fn from_message(&self) -> Option<&FromMessageConfig> {
        match &self.kind {
            ComponentKind::FromMessage(config) => Some(config),
            _ => None,
        }
    }

    pub fn is_from_message(&self) -> bool {
        matches!(self.kind, ComponentKind::FromMessage(_))
    }

    pub fn is_from_invocation(&self) -> bool {
        matches!(self.kind, ComponentKind::FromInvocation)
    }
}

/// How a component receives its input.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub enum ComponentKind {
    /// The wrapper pulls one message from the component's input queue per
    /// invocation. The coordinator watches the queue depth and invokes as
    /// many workers as the concurrency limit allows.
    FromMessage(FromMessageConfig),

    /// The component is invoked directly with its event; no input queue is
    /// provisioned. Upstream routing or external callers supply the event.
    FromInvocation,

    /// Reserved for the coordinator and invoker themselves.
    Internal,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FromMessageConfig {
    /// Upper bound on concurrently live workers of this component. The
    /// ledger reading is approximate, so this is a target, not a hard cap.
    pub max_concurrency: usize,

    /// Long-poll duration for input queue receives, in
    /// [0, worker timeout].
    #[serde(default)]
    pub queue_wait_seconds: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkerConfig {
    /// Handler reference the build step resolves to the user's code.
    pub handler: String,

    /// Memory ceiling in MiB, in [128, 1536].
    pub memory: u32,

    /// Hard deadline of one invocation in seconds, in [3, 300]. Doubles as
    /// the input-queue visibility timeout and the ledger visibility
    /// timeout.
    pub timeout: u64,

    /// Name of the permission role this worker executes under.
    pub role: String,
}

/// Routing is either absent, a component name, a list of component names,
/// or a reference to a compiled routing expression registered by the build
/// step.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum RoutingConfig {
    One(String),
    Many(Vec<String>),
    Expression {
        /// Name of a routing expression in the handler registry.
        expression: String,
    },
}
