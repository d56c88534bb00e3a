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

use flowlink_cloud::LifecycleContext;
use flowlink_error::Error;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    Done,
    Fail,
    Succeed,
}

/// The mode and arguments of the first completion-channel call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub mode: CompletionMode,
    pub error: Option<Error>,
    pub result: Option<Value>,
}

impl Completion {
    /// `succeed` and error-free `done` are the success modes; only they
    /// acknowledge the input message.
    pub fn is_success(&self) -> bool {
        match self.mode {
            CompletionMode::Succeed => true,
            CompletionMode::Done => self.error.is_none(),
            CompletionMode::Fail => false,
        }
    }

    pub fn is_failing(&self) -> bool {
        !self.is_success()
    }
}

struct ContextInner {
    original: Arc<dyn LifecycleContext>,
    completion: Mutex<Option<Completion>>,
    notify: Notify,
}

/// The wrapped lifecycle context handed to user handlers. Its three
/// completion channels are guarded forwarders: collectively they fire at
/// most once, recording the mode and arguments of the first call; later
/// calls are silently ignored. The deadline query passes through to the
/// platform context unchanged.
#[derive(Clone)]
pub struct WorkerContext {
    inner: Arc<ContextInner>,
}

impl WorkerContext {
    pub(crate) fn new(original: Arc<dyn LifecycleContext>) -> Self {
        WorkerContext {
            inner: Arc::new(ContextInner {
                original,
                completion: Mutex::new(None),
                notify: Notify::new(),
            }),
        }
    }

    pub fn done(&self, error: Option<Error>, result: Option<Value>) {
        self.record(Completion {
            mode: CompletionMode::Done,
            error,
            result,
        });
    }

    pub fn fail(&self, error: Error) {
        self.record(Completion {
            mode: CompletionMode::Fail,
            error: Some(error),
            result: None,
        });
    }

    pub fn succeed(&self, result: Option<Value>) {
        self.record(Completion {
            mode: CompletionMode::Succeed,
            error: None,
            result,
        });
    }

    pub fn remaining_time(&self) -> Duration {
        self.inner.original.remaining_time()
    }

    fn record(&self, completion: Completion) {
        let mut slot = self.inner.completion.lock();
        if slot.is_none() {
            *slot = Some(completion);
            self.inner.notify.notify_one();
        }
    }

    pub(crate) fn completion(&self) -> Option<Completion> {
        self.inner.completion.lock().clone()
    }

    /// Resolves once any completion channel has fired, including calls that
    /// happened before this was awaited.
    pub(crate) async fn completed(&self) {
        if self.completion().is_some() {
            return;
        }
        self.inner.notify.notified().await;
    }

    pub(crate) fn original(&self) -> &Arc<dyn LifecycleContext> {
        &self.inner.original
    }
}
