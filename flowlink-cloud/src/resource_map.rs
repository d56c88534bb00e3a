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

use flowlink_error::{make_err, Code, Error, ResultExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::layout::DeploymentLayout;
use crate::object_store::ObjectStore;

/// Read-only snapshot mapping symbolic component resources to the concrete
/// identifiers the provisioning step created. Loaded once per invocation
/// and immutable for its life.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct ResourceMap {
    entries: HashMap<String, String>,
}

impl ResourceMap {
    pub fn new(entries: HashMap<String, String>) -> Self {
        ResourceMap { entries }
    }

    /// Loads the map from its well-known key. Failure here is fatal to the
    /// calling invocation; nothing else is safe to attempt without it.
    pub async fn load(
        store: &dyn ObjectStore,
        layout: &DeploymentLayout,
    ) -> Result<Self, Error> {
        let value = store
            .get_json(&layout.resource_map_key())
            .await
            .err_tip(|| "Failed to load resource map")?;
        serde_json::from_value(value).err_tip(|| "Resource map is not a string-to-string map")
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Result<&str, Error> {
        self.entries
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| make_err!(Code::NotFound, "No '{key}' entry in resource map"))
    }

    /// Identifier of a component's input queue.
    pub fn input_queue(&self, component: &str) -> Result<&str, Error> {
        self.get(&format!("{component}InputQueue"))
    }

    /// Identifier of a component's concurrency ledger queue.
    pub fn ledger_queue(&self, component: &str) -> Result<&str, Error> {
        self.get(&format!("{component}LedgerQueue"))
    }

    /// Identifier of a component's worker function.
    pub fn function(&self, component: &str) -> Result<&str, Error> {
        self.get(&format!("{component}Function"))
    }

    pub fn to_value(&self) -> Result<Value, Error> {
        serde_json::to_value(self).err_tip(|| "Failed to serialize resource map")
    }
}

impl FromIterator<(String, String)> for ResourceMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        ResourceMap {
            entries: iter.into_iter().collect(),
        }
    }
}
