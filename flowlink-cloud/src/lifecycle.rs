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

use std::time::Duration;

use async_trait::async_trait;
use flowlink_error::Error;
use parking_lot::Mutex;
use serde_json::Value;

/// The platform hands every invocation a lifecycle context with three
/// completion channels and a deadline query. Completing any channel ends
/// the invocation from the platform's point of view.
#[async_trait]
pub trait LifecycleContext: Send + Sync {
    /// Time left until the platform's hard deadline.
    fn remaining_time(&self) -> Duration;

    async fn done(&self, error: Option<Error>, result: Option<Value>);

    async fn fail(&self, error: Error);

    async fn succeed(&self, result: Option<Value>);
}

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleOutcome {
    Done {
        error: Option<Error>,
        result: Option<Value>,
    },
    Fail {
        error: Error,
    },
    Succeed {
        result: Option<Value>,
    },
}

/// Lifecycle context that records every completion call. The production
/// platform supplies the real thing; orchestration tests inspect this one.
pub struct RecordingLifecycleContext {
    remaining: Duration,
    outcomes: Mutex<Vec<LifecycleOutcome>>,
}

impl RecordingLifecycleContext {
    pub fn new(remaining: Duration) -> Self {
        RecordingLifecycleContext {
            remaining,
            outcomes: Mutex::new(Vec::new()),
        }
    }

    pub fn outcomes(&self) -> Vec<LifecycleOutcome> {
        self.outcomes.lock().clone()
    }
}

#[async_trait]
impl LifecycleContext for RecordingLifecycleContext {
    fn remaining_time(&self) -> Duration {
        self.remaining
    }

    async fn done(&self, error: Option<Error>, result: Option<Value>) {
        self.outcomes
            .lock()
            .push(LifecycleOutcome::Done { error, result });
    }

    async fn fail(&self, error: Error) {
        self.outcomes.lock().push(LifecycleOutcome::Fail { error });
    }

    async fn succeed(&self, result: Option<Value>) {
        self.outcomes
            .lock()
            .push(LifecycleOutcome::Succeed { result });
    }
}
