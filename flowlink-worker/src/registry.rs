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
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use flowlink_error::{make_err, Code, Error};
use serde_json::Value;

use crate::context::WorkerContext;
use crate::routing::RoutingExpr;

/// A user-supplied worker. Handlers signal their outcome through the
/// context's completion channels; returning without signaling is treated
/// as a failure by the wrapper.
#[async_trait]
pub trait WorkerHandler: Send + Sync {
    async fn run(&self, event: Value, ctx: WorkerContext);
}

struct FnWorkerHandler<F> {
    handler: F,
}

#[async_trait]
impl<F, Fut> WorkerHandler for FnWorkerHandler<F>
where
    F: Fn(Value, WorkerContext) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn run(&self, event: Value, ctx: WorkerContext) {
        (self.handler)(event, ctx).await;
    }
}

/// Wraps an async closure as a [`WorkerHandler`].
pub fn handler_fn<F, Fut>(handler: F) -> Arc<dyn WorkerHandler>
where
    F: Fn(Value, WorkerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnWorkerHandler { handler })
}

/// The build step compiles every component's handler reference and routing
/// expression into this registry; the wrappers look their own pieces up by
/// name at run time.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn WorkerHandler>>,
    expressions: HashMap<String, RoutingExpr>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_handler(
        &mut self,
        component: impl Into<String>,
        handler: Arc<dyn WorkerHandler>,
    ) -> &mut Self {
        self.handlers.insert(component.into(), handler);
        self
    }

    pub fn register_expression(
        &mut self,
        name: impl Into<String>,
        expression: RoutingExpr,
    ) -> &mut Self {
        self.expressions.insert(name.into(), expression);
        self
    }

    pub fn handler(&self, component: &str) -> Result<Arc<dyn WorkerHandler>, Error> {
        self.handlers.get(component).cloned().ok_or_else(|| {
            make_err!(
                Code::NotFound,
                "No handler registered for component '{component}'"
            )
        })
    }

    pub fn expression(&self, name: &str) -> Result<RoutingExpr, Error> {
        self.expressions.get(name).cloned().ok_or_else(|| {
            make_err!(Code::NotFound, "No routing expression registered as '{name}'")
        })
    }
}
