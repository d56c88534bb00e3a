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

pub mod coordinator;
pub mod dispatch;
pub mod fanout;
pub mod plan;
pub mod status;
pub mod switchover;

pub use coordinator::{Coordinator, CoordinatorEvent, CoordinatorOptions};
pub use fanout::{Invoker, InvokerEvent};
pub use plan::{build_plan, pack_counts, InvocationCount, InvocationPlan};
pub use status::{measure, ApplicationStatus, ComponentStatus};
pub use switchover::{SwitchoverController, SwitchoverHook};
