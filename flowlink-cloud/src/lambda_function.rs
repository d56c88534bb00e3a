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
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use flowlink_error::{Error, ResultExt};
use serde_json::Value;

use crate::function::FunctionInvoker;
use crate::sdk::sdk_err;

/// Function gateway backed by the managed function service.
pub struct LambdaFunctionInvoker {
    client: aws_sdk_lambda::Client,
}

impl LambdaFunctionInvoker {
    pub fn new(client: aws_sdk_lambda::Client) -> Self {
        LambdaFunctionInvoker { client }
    }

    pub async fn from_env() -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_lambda::Client::new(&sdk_config))
    }
}

#[async_trait]
impl FunctionInvoker for LambdaFunctionInvoker {
    async fn invoke_event(&self, function: &str, payload: &Value) -> Result<(), Error> {
        let payload = serde_json::to_vec(payload)
            .err_tip(|| format!("Failed to serialize payload for '{function}'"))?;
        self.client
            .invoke()
            .function_name(function)
            .invocation_type(InvocationType::Event)
            .payload(Blob::new(payload))
            .send()
            .await
            .map_err(|e| sdk_err(e, &format!("Failed to invoke '{function}'")))?;
        Ok(())
    }
}
