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

use flowlink_config::ApplicationConfig;

/// Object-store layout of one deployment: everything lives under
/// `<s3KeyPrefix>/<name>/<deployId>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentLayout {
    prefix: String,
}

impl DeploymentLayout {
    pub fn new(config: &ApplicationConfig) -> Self {
        DeploymentLayout {
            prefix: format!(
                "{}/{}/{}",
                config.deployment.s3_key_prefix, config.name, config.deploy_id
            ),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key of the resource map written at switchover and read by every
    /// invocation.
    pub fn resource_map_key(&self) -> String {
        format!("{}/arnMap.json", self.prefix)
    }

    /// Key of an advisory copy of the application configuration.
    pub fn config_key(&self) -> String {
        format!("{}/config.json5", self.prefix)
    }

    /// Key of the confirmation artifact written by the first successful
    /// generation-1 coordinator.
    pub fn confirmation_key(&self) -> String {
        format!("{}/confirm.txt", self.prefix)
    }
}
