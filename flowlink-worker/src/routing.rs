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

use flowlink_cloud::{FunctionInvoker, MessageQueue, ResourceMap};
use flowlink_config::{ApplicationConfig, ComponentKind, RoutingConfig};
use flowlink_error::{make_err, Code, Error};
use futures::future::join_all;
use serde_json::Value;
use tracing::{event, Level};

use crate::registry::HandlerRegistry;

/// A compiled routing expression. Evaluated with the worker's error and
/// result; returns a single `{target, payload}` object or a list of them.
pub type RoutingExpr = Arc<dyn Fn(Option<&Error>, Option<&Value>) -> Value + Send + Sync>;

/// A component's routing rule with its expression, if any, already
/// resolved from the registry.
#[derive(Clone, Default)]
pub enum Routing {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
    Expr(RoutingExpr),
}

impl Routing {
    /// Resolves the configured rule, looking expressions up by name.
    pub fn resolve(
        config: Option<&RoutingConfig>,
        registry: &HandlerRegistry,
    ) -> Result<Self, Error> {
        match config {
            None => Ok(Routing::None),
            Some(RoutingConfig::One(target)) => Ok(Routing::One(target.clone())),
            Some(RoutingConfig::Many(targets)) => Ok(Routing::Many(targets.clone())),
            Some(RoutingConfig::Expression { expression }) => {
                Ok(Routing::Expr(registry.expression(expression)?))
            }
        }
    }
}

/// One dispatchable routing decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub target: String,
    pub payload: Value,
}

/// Evaluates routing rules and dispatches the resulting entries to their
/// target components.
pub struct Router {
    app: Arc<ApplicationConfig>,
    resource_map: Arc<ResourceMap>,
    queue: Arc<dyn MessageQueue>,
    functions: Arc<dyn FunctionInvoker>,
}

impl Router {
    pub fn new(
        app: Arc<ApplicationConfig>,
        resource_map: Arc<ResourceMap>,
        queue: Arc<dyn MessageQueue>,
        functions: Arc<dyn FunctionInvoker>,
    ) -> Self {
        Router {
            app,
            resource_map,
            queue,
            functions,
        }
    }

    /// Produces the entries a rule yields for this outcome. Name-based
    /// rules do not propagate data on failure; expressions always run and
    /// see the error. Malformed expression entries are dropped.
    pub fn entries(
        routing: &Routing,
        error: Option<&Error>,
        result: Option<&Value>,
    ) -> Vec<RouteEntry> {
        match routing {
            Routing::None => Vec::new(),
            Routing::One(target) => {
                if error.is_some() {
                    return Vec::new();
                }
                vec![RouteEntry {
                    target: target.clone(),
                    payload: result.cloned().unwrap_or(Value::Null),
                }]
            }
            Routing::Many(targets) => {
                if error.is_some() {
                    return Vec::new();
                }
                targets
                    .iter()
                    .map(|target| RouteEntry {
                        target: target.clone(),
                        payload: result.cloned().unwrap_or(Value::Null),
                    })
                    .collect()
            }
            Routing::Expr(expression) => {
                let value = expression(error, result);
                let raw_entries = match value {
                    Value::Array(items) => items,
                    single => vec![single],
                };
                raw_entries
                    .into_iter()
                    .filter_map(|raw| {
                        let object = raw.as_object()?;
                        let target = object.get("target")?.as_str()?;
                        if target.is_empty() {
                            return None;
                        }
                        Some(RouteEntry {
                            target: target.to_string(),
                            payload: object.get("payload").cloned().unwrap_or(Value::Null),
                        })
                    })
                    .collect()
            }
        }
    }

    /// Evaluates and dispatches concurrently. Every entry is attempted;
    /// the first error is returned after all dispatches settle.
    pub async fn dispatch(
        &self,
        routing: &Routing,
        error: Option<&Error>,
        result: Option<&Value>,
    ) -> Result<(), Error> {
        let entries = Self::entries(routing, error, result);
        let results = join_all(entries.iter().map(|entry| self.dispatch_entry(entry))).await;
        let mut first_error = None;
        for (entry, result) in entries.iter().zip(results) {
            if let Err(e) = result {
                event!(
                    Level::ERROR,
                    target = %entry.target,
                    err = %e,
                    "Failed to dispatch routed result"
                );
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn dispatch_entry(&self, entry: &RouteEntry) -> Result<(), Error> {
        let component = self.app.component(&entry.target).ok_or_else(|| {
            make_err!(
                Code::InvalidArgument,
                "Invalid routing destination '{}': no such component",
                entry.target
            )
        })?;
        match &component.kind {
            ComponentKind::FromMessage(_) => {
                let queue_url = self.resource_map.input_queue(&entry.target)?;
                self.queue.send(queue_url, &entry.payload).await
            }
            ComponentKind::FromInvocation => {
                let function = self.resource_map.function(&entry.target)?;
                self.functions.invoke_event(function, &entry.payload).await
            }
            ComponentKind::Internal => Err(make_err!(
                Code::InvalidArgument,
                "Invalid routing destination '{}': internal components cannot receive results",
                entry.target
            )),
        }
    }
}
