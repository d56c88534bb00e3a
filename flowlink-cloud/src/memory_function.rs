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

use async_trait::async_trait;
use flowlink_error::Error;
use parking_lot::Mutex;
use serde_json::Value;

use crate::function::FunctionInvoker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedInvocation {
    pub function: String,
    pub payload: Value,
}

/// In-memory function gateway that records every accepted event instead of
/// running anything.
#[derive(Default)]
pub struct MemoryFunctionInvoker {
    invocations: Mutex<Vec<RecordedInvocation>>,
}

impl MemoryFunctionInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<RecordedInvocation> {
        self.invocations.lock().clone()
    }

    pub fn take(&self) -> Vec<RecordedInvocation> {
        std::mem::take(&mut *self.invocations.lock())
    }

    pub fn count_for(&self, function: &str) -> usize {
        self.invocations
            .lock()
            .iter()
            .filter(|i| i.function == function)
            .count()
    }
}

#[async_trait]
impl FunctionInvoker for MemoryFunctionInvoker {
    async fn invoke_event(&self, function: &str, payload: &Value) -> Result<(), Error> {
        self.invocations.lock().push(RecordedInvocation {
            function: function.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}
