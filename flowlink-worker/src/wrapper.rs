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
    ConcurrencyLedger, DeploymentLayout, FunctionInvoker, LifecycleContext, MessageQueue,
    ObjectStore, ResourceMap,
};
use flowlink_config::{ApplicationConfig, ComponentConfig, RESERVED_COMPONENT_NAMES};
use flowlink_error::{error_if, make_err, Code, Error, ResultExt};
use flowlink_util::task::JoinHandleDropGuard;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{event, Level};

use crate::context::{Completion, CompletionMode, WorkerContext};
use crate::registry::HandlerRegistry;
use crate::routing::{Router, Routing};

pub struct WrapperOptions {
    /// When set, a panicking handler is converted into a synthesized
    /// `fail` so finalization still runs. Disabled in tests that want the
    /// panic to surface.
    pub catch_panics: bool,
}

impl Default for WrapperOptions {
    fn default() -> Self {
        WrapperOptions { catch_panics: true }
    }
}

/// What one invocation accumulated on its way to finalization.
struct InvocationState {
    receipt: Option<String>,
    incremented: bool,
}

/// Replaces a user worker's entry point. Per invocation it loads the
/// resource map, brackets the concurrency ledger, fetches the input event,
/// runs the user handler under a wrapped lifecycle context, and drives
/// finalization exactly once, even when the handler crashes.
pub struct WorkerWrapper {
    app: Arc<ApplicationConfig>,
    component: ComponentConfig,
    routing: Routing,
    registry: Arc<HandlerRegistry>,
    queue: Arc<dyn MessageQueue>,
    store: Arc<dyn ObjectStore>,
    functions: Arc<dyn FunctionInvoker>,
    layout: DeploymentLayout,
    resource_map: OnceCell<Arc<ResourceMap>>,
    options: WrapperOptions,
}

impl WorkerWrapper {
    pub fn new(
        app: Arc<ApplicationConfig>,
        component_name: &str,
        registry: Arc<HandlerRegistry>,
        queue: Arc<dyn MessageQueue>,
        store: Arc<dyn ObjectStore>,
        functions: Arc<dyn FunctionInvoker>,
        options: WrapperOptions,
    ) -> Result<Self, Error> {
        error_if!(
            RESERVED_COMPONENT_NAMES.contains(&component_name),
            "'{component_name}' is an internal component and cannot be wrapped"
        );
        let component = app
            .component(component_name)
            .err_tip_with_code(|_| {
                (
                    Code::NotFound,
                    format!("Component '{component_name}' is not in the application config"),
                )
            })?
            .clone();
        let routing = Routing::resolve(component.routing.as_ref(), &registry)
            .err_tip(|| format!("While resolving routing for '{component_name}'"))?;
        let layout = DeploymentLayout::new(&app);
        Ok(WorkerWrapper {
            app,
            component,
            routing,
            registry,
            queue,
            store,
            functions,
            layout,
            resource_map: OnceCell::new(),
            options,
        })
    }

    /// The wrapped entry point: same `(event, lifecycle_context)` signature
    /// the platform calls on any worker.
    pub async fn handle(&self, event: Value, original: Arc<dyn LifecycleContext>) {
        // Without the resource map nothing else is safe to attempt; the
        // failure is surfaced verbatim.
        let map = match self
            .resource_map
            .get_or_try_init(|| async {
                ResourceMap::load(self.store.as_ref(), &self.layout)
                    .await
                    .map(Arc::new)
            })
            .await
        {
            Ok(map) => map.clone(),
            Err(e) => {
                original.fail(e).await;
                return;
            }
        };

        let ctx = WorkerContext::new(original);
        let mut state = InvocationState {
            receipt: None,
            incremented: false,
        };

        let ledger = self.make_ledger(&map);
        if let Some(ledger) = &ledger {
            // An increment failure only skews the count low for a moment;
            // the worker still runs, and finalization skips the decrement.
            match ledger.increment().await {
                Ok(()) => state.incremented = true,
                Err(e) => event!(
                    Level::WARN,
                    component = %self.component.name,
                    err = %e,
                    "Ledger increment failed; concurrency will read low"
                ),
            }
        }

        let event = self.acquire_input(&map, event, &ctx, &mut state).await;

        if ctx.completion().is_none() {
            self.run_handler(event, &ctx).await;
        }

        let completion = ctx.completion().unwrap_or_else(|| Completion {
            mode: CompletionMode::Fail,
            error: Some(make_err!(
                Code::Internal,
                "Worker '{}' reached finalization without a completion",
                self.component.name
            )),
            result: None,
        });
        self.finalize(&map, ledger, &state, completion, &ctx).await;
    }

    fn make_ledger(&self, map: &ResourceMap) -> Option<ConcurrencyLedger> {
        let queue_url = match map.ledger_queue(&self.component.name) {
            Ok(url) => url.to_string(),
            Err(e) => {
                event!(
                    Level::WARN,
                    component = %self.component.name,
                    err = %e,
                    "No ledger queue for component; concurrency is untracked"
                );
                return None;
            }
        };
        let wait = Duration::from_secs(
            self.component
                .from_message()
                .map_or(0, |c| c.queue_wait_seconds),
        );
        match ConcurrencyLedger::new(
            self.queue.clone(),
            queue_url,
            Duration::from_secs(self.component.worker.timeout),
            wait,
        ) {
            Ok(ledger) => Some(ledger),
            Err(e) => {
                event!(
                    Level::WARN,
                    component = %self.component.name,
                    err = %e,
                    "Could not build concurrency ledger"
                );
                None
            }
        }
    }

    /// For message-driven components, pulls one message off the input
    /// queue and parses it; any acquisition problem fails the wrapped
    /// context. Invocation-driven components pass the event through.
    async fn acquire_input(
        &self,
        map: &ResourceMap,
        event: Value,
        ctx: &WorkerContext,
        state: &mut InvocationState,
    ) -> Value {
        if !self.component.is_from_message() {
            return event;
        }
        let queue_url = match map.input_queue(&self.component.name) {
            Ok(url) => url,
            Err(e) => {
                ctx.fail(e);
                return Value::Null;
            }
        };
        let wait = Duration::from_secs(
            self.component
                .from_message()
                .map_or(0, |c| c.queue_wait_seconds),
        );
        let received = self
            .queue
            .receive_one(
                queue_url,
                Duration::from_secs(self.component.worker.timeout),
                wait,
            )
            .await;
        match received {
            Err(e) => {
                ctx.fail(e);
                Value::Null
            }
            Ok(None) => {
                ctx.fail(make_err!(
                    Code::NotFound,
                    "No message available on '{queue_url}'"
                ));
                Value::Null
            }
            Ok(Some(message)) => {
                state.receipt = Some(message.receipt);
                match serde_json::from_str(&message.body) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        ctx.fail(make_err!(
                            Code::InvalidArgument,
                            "Input message on '{queue_url}' is not valid json: {e}"
                        ));
                        Value::Null
                    }
                }
            }
        }
    }

    /// Runs the user handler in a supervised task. The task is the
    /// last-resort guard: a panic inside the handler synthesizes `fail` on
    /// the wrapped context so finalization still runs. Once the context
    /// completes, a still-running handler is dropped, mirroring the
    /// platform freezing a function that already signaled.
    async fn run_handler(&self, event: Value, ctx: &WorkerContext) {
        let handler = match self.registry.handler(&self.component.name) {
            Ok(handler) => handler,
            Err(e) => {
                ctx.fail(e);
                return;
            }
        };
        let handler_ctx = ctx.clone();
        let task = JoinHandleDropGuard::new(tokio::spawn(async move {
            handler.run(event, handler_ctx).await;
        }));
        tokio::select! {
            _ = ctx.completed() => {}
            join_result = task => match join_result {
                Ok(()) => {
                    if ctx.completion().is_none() {
                        ctx.fail(make_err!(
                            Code::Internal,
                            "Handler for '{}' finished without signaling completion",
                            self.component.name
                        ));
                    }
                }
                Err(join_error) => {
                    if join_error.is_panic() {
                        let panic_payload = join_error.into_panic();
                        if !self.options.catch_panics {
                            std::panic::resume_unwind(panic_payload);
                        }
                        let message = panic_payload
                            .downcast_ref::<&str>()
                            .map(|s| (*s).to_string())
                            .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "handler panicked".to_string());
                        ctx.fail(make_err!(
                            Code::Internal,
                            "Handler for '{}' crashed: {message}",
                            self.component.name
                        ));
                    } else {
                        ctx.fail(Error::from(join_error).append(format!(
                            "Handler task for '{}' did not complete",
                            self.component.name
                        )));
                    }
                }
            }
        }
    }

    /// The four finalization steps, strictly in order. Each step logs its
    /// own failure and never short-circuits its siblings.
    async fn finalize(
        &self,
        map: &Arc<ResourceMap>,
        ledger: Option<ConcurrencyLedger>,
        state: &InvocationState,
        completion: Completion,
        ctx: &WorkerContext,
    ) {
        // 1. Route the result. Failing outcomes pass the error through;
        //    name-based rules skip on failure, expressions always run.
        let router = Router::new(
            self.app.clone(),
            map.clone(),
            self.queue.clone(),
            self.functions.clone(),
        );
        let routing_error = router
            .dispatch(
                &self.routing,
                completion.error.as_ref(),
                completion.result.as_ref(),
            )
            .await
            .err();
        if let Some(e) = &routing_error {
            event!(
                Level::ERROR,
                component = %self.component.name,
                err = %e,
                "Routing failed during finalization"
            );
        }

        // 2. Delete the input message, only on success. On failure the
        //    message is left to reappear after its visibility timeout.
        if completion.is_success() && self.component.is_from_message() {
            if let Some(receipt) = &state.receipt {
                match map.input_queue(&self.component.name) {
                    Ok(queue_url) => {
                        if let Err(e) = self.queue.delete(queue_url, receipt).await {
                            event!(
                                Level::ERROR,
                                component = %self.component.name,
                                err = %e,
                                "Input delete failed; the message will be reprocessed"
                            );
                        }
                    }
                    Err(e) => event!(
                        Level::ERROR,
                        component = %self.component.name,
                        err = %e,
                        "No input queue to delete from"
                    ),
                }
            }
        }

        // 3. Decrement the ledger, but only if the entry increment landed.
        if state.incremented {
            if let Some(ledger) = &ledger {
                if let Err(e) = ledger.decrement().await {
                    event!(
                        Level::ERROR,
                        component = %self.component.name,
                        err = %e,
                        "Ledger decrement failed; retention will reconcile"
                    );
                }
            }
        }

        // 4. Forward to the platform context. A routing error upgrades a
        //    successful outcome to `fail`; an already-failing outcome keeps
        //    its original mode and error.
        let original = ctx.original();
        if completion.is_success() {
            if let Some(e) = routing_error {
                original.fail(e).await;
                return;
            }
        }
        match completion.mode {
            CompletionMode::Done => original.done(completion.error, completion.result).await,
            CompletionMode::Fail => {
                original
                    .fail(completion.error.unwrap_or_else(|| {
                        make_err!(
                            Code::Internal,
                            "Worker '{}' failed without an error",
                            self.component.name
                        )
                    }))
                    .await
            }
            CompletionMode::Succeed => original.succeed(completion.result).await,
        }
    }
}
