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
use serde_json::Value;

/// Gateway to the platform's function-invoke primitive.
#[async_trait]
pub trait FunctionInvoker: Send + Sync {
    /// Fire-and-forget, event-style asynchronous invocation. Returns once
    /// the platform has accepted the event, not when the function ran.
    async fn invoke_event(&self, function: &str, payload: &Value) -> Result<(), Error>;
}
