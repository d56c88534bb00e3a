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

use async_trait::async_trait;
use flowlink_error::{make_err, Code, Error};
use parking_lot::Mutex;
use serde_json::Value;

use crate::object_store::ObjectStore;

#[derive(Clone)]
struct StoredObject {
    contents: String,
    #[allow(dead_code)]
    content_type: String,
}

/// In-memory object store gateway.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw contents of an object, if present. Handy in tests.
    pub fn text(&self, key: &str) -> Option<String> {
        self.objects.lock().get(key).map(|o| o.contents.clone())
    }

    pub fn remove(&self, key: &str) {
        self.objects.lock().remove(key);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_json(&self, key: &str, value: &Value) -> Result<(), Error> {
        self.objects.lock().insert(
            key.to_string(),
            StoredObject {
                contents: value.to_string(),
                content_type: "application/json".to_string(),
            },
        );
        Ok(())
    }

    async fn put_text(&self, key: &str, contents: &str, content_type: &str) -> Result<(), Error> {
        self.objects.lock().insert(
            key.to_string(),
            StoredObject {
                contents: contents.to_string(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get_json(&self, key: &str) -> Result<Value, Error> {
        let contents = self
            .text(key)
            .ok_or_else(|| make_err!(Code::NotFound, "Object '{key}' not found"))?;
        serde_json::from_str(&contents)
            .map_err(|e| make_err!(Code::InvalidArgument, "Object '{key}' is not valid json: {e}"))
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        Ok(self.objects.lock().contains_key(key))
    }
}
