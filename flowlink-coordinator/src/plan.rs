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

use std::collections::VecDeque;

use flowlink_config::ApplicationConfig;
use serde::{Deserialize, Serialize};

use crate::status::ApplicationStatus;

/// How many workers of one component to invoke.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InvocationCount {
    pub name: String,
    pub count: usize,
}

/// Pending invocations split between what this instance issues itself
/// (`local`) and the bins it delegates to invokers (`remote`). Every
/// remote bin sums to exactly the batch limit except possibly the last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationPlan {
    pub local: Vec<InvocationCount>,
    pub remote: Vec<Vec<InvocationCount>>,
}

impl InvocationPlan {
    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.remote.is_empty()
    }

    pub fn total(&self) -> usize {
        let local: usize = self.local.iter().map(|c| c.count).sum();
        let remote: usize = self
            .remote
            .iter()
            .flat_map(|bin| bin.iter().map(|c| c.count))
            .sum();
        local + remote
    }
}

/// Computes the invocation plan for one coordinator pass. Per
/// message-driven component with a complete measurement: headroom is the
/// concurrency limit minus the live count (clamped at zero), the desired
/// count is the lesser of queue depth and headroom, and the result is
/// divided by the coordinator concurrency rounding *up*. When several
/// coordinators run in lock-step each contributes its share; over-pursuit
/// is tolerated because under-pursuit strands messages.
pub fn build_plan(app: &ApplicationConfig, status: &ApplicationStatus) -> InvocationPlan {
    let coordinator_concurrency = app.coordinator.coordinator_concurrency.max(1);
    let mut counts = Vec::new();
    for component in &app.components {
        let Some(from_message) = component.from_message() else {
            continue;
        };
        let Some(component_status) = status.component(&component.name) else {
            continue;
        };
        let (Some(queued), Some(concurrency)) = (
            component_status.queued_messages,
            component_status.concurrency,
        ) else {
            continue;
        };
        let headroom = from_message.max_concurrency.saturating_sub(concurrency);
        let count = queued.min(headroom);
        let share = count.div_ceil(coordinator_concurrency);
        if share > 0 {
            counts.push(InvocationCount {
                name: component.name.clone(),
                count: share,
            });
        }
    }
    pack_counts(counts, app.coordinator.max_invocation_count)
}

/// Packs counts into a plan with batch limit `max_batch`. Everything fits
/// locally if the total does; otherwise bins of exactly `max_batch` are
/// filled greedily (splitting oversized counts across bins) until either
/// the remainder fits locally alongside the invoker invocations
/// themselves, or `max_batch - 1` bins exist and the remainder becomes one
/// final remote bin.
pub fn pack_counts(counts: Vec<InvocationCount>, max_batch: usize) -> InvocationPlan {
    let max_batch = max_batch.max(1);
    let mut pending: VecDeque<InvocationCount> =
        counts.into_iter().filter(|c| c.count > 0).collect();
    let total: usize = pending.iter().map(|c| c.count).sum();
    if total <= max_batch {
        return InvocationPlan {
            local: pending.into_iter().collect(),
            remote: Vec::new(),
        };
    }

    let mut remote: Vec<Vec<InvocationCount>> = Vec::new();
    let mut remaining = total;
    loop {
        // Capacity left for local work shrinks by one per remote bin: each
        // bin costs one invoker invocation out of the same batch budget.
        if remaining <= max_batch.saturating_sub(remote.len()) {
            return InvocationPlan {
                local: pending.into_iter().collect(),
                remote,
            };
        }
        if remote.len() == max_batch - 1 {
            remote.push(pending.into_iter().collect());
            return InvocationPlan {
                local: Vec::new(),
                remote,
            };
        }

        let mut bin = Vec::new();
        let mut room = max_batch;
        while room > 0 {
            let Some(front) = pending.front_mut() else {
                break;
            };
            let take = front.count.min(room);
            bin.push(InvocationCount {
                name: front.name.clone(),
                count: take,
            });
            front.count -= take;
            room -= take;
            if front.count == 0 {
                pending.pop_front();
            }
        }
        remaining -= max_batch - room;
        remote.push(bin);
    }
}
