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

/// Small-object store for deployment artifacts: the resource map, the
/// advisory config copy and the confirmation artifact. Reads and writes
/// retry transient failures internally.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_json(&self, key: &str, value: &Value) -> Result<(), Error>;

    async fn put_text(&self, key: &str, contents: &str, content_type: &str) -> Result<(), Error>;

    async fn get_json(&self, key: &str) -> Result<Value, Error>;

    /// A missing object is a definitive `false` and short-circuits any
    /// retries; only genuine failures retry.
    async fn exists(&self, key: &str) -> Result<bool, Error>;
}
