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
use flowlink_coordinator::{build_plan, pack_counts, ApplicationStatus, ComponentStatus, InvocationCount};

fn count(name: &str, count: usize) -> InvocationCount {
    InvocationCount {
        name: name.to_string(),
        count,
    }
}

fn app_with_coordinator_concurrency(concurrency: usize) -> ApplicationConfig {
    ApplicationConfig::parse(&format!(
        r#"{{
          name: "plantest",
          version: "1",
          deployId: 1,
          deployment: {{ region: "us-east-1", s3Bucket: "b", s3KeyPrefix: "apps" }},
          coordinator: {{ coordinatorConcurrency: {concurrency}, maxInvocationCount: 6 }},
          roles: [{{ name: "default" }}],
          components: [
            {{
              name: "a",
              kind: {{ fromMessage: {{ maxConcurrency: 20 }} }},
              worker: {{ handler: "a.handler", memory: 128, timeout: 60, role: "default" }},
            }},
            {{
              name: "b",
              kind: {{ fromMessage: {{ maxConcurrency: 20 }} }},
              worker: {{ handler: "b.handler", memory: 128, timeout: 60, role: "default" }},
            }},
            {{
              name: "c",
              kind: {{ fromMessage: {{ maxConcurrency: 20 }} }},
              worker: {{ handler: "c.handler", memory: 128, timeout: 60, role: "default" }},
            }},
          ],
        }}"#
    ))
    .unwrap()
}

fn status(entries: &[(&str, Option<usize>, Option<usize>)]) -> ApplicationStatus {
    ApplicationStatus {
        components: entries
            .iter()
            .map(|(name, concurrency, queued)| ComponentStatus {
                name: name.to_string(),
                concurrency: *concurrency,
                queued_messages: *queued,
            })
            .collect(),
    }
}

#[cfg(test)]
mod plan_tests {
    use super::*;
    use pretty_assertions::assert_eq; // Must be declared in every module.

    #[test]
    fn everything_fits_locally() {
        let plan = pack_counts(vec![count("a", 2), count("b", 3)], 6);
        assert_eq!(plan.local, vec![count("a", 2), count("b", 3)]);
        assert_eq!(plan.remote, Vec::<Vec<InvocationCount>>::new());
    }

    #[test]
    fn oversized_count_splits_into_exact_bins_with_local_remainder() {
        // Raw counts a:12, b:1, c:2 with a batch limit of 6: two full bins
        // of a, and the remainder (3) fits locally alongside the two
        // invoker invocations (3 <= 6 - 2).
        let plan = pack_counts(vec![count("a", 12), count("b", 1), count("c", 2)], 6);
        assert_eq!(plan.remote, vec![vec![count("a", 6)], vec![count("a", 6)]]);
        assert_eq!(plan.local, vec![count("b", 1), count("c", 2)]);
    }

    #[test]
    fn bin_cap_pushes_remainder_as_final_remote_bin() {
        // With a batch limit of 3 the remainder is too big to run locally
        // next to two invoker invocations, so it becomes one last bin.
        let plan = pack_counts(vec![count("a", 3), count("b", 3), count("c", 3)], 3);
        assert_eq!(
            plan.remote,
            vec![vec![count("a", 3)], vec![count("b", 3)], vec![count("c", 3)]]
        );
        assert_eq!(plan.local, Vec::<InvocationCount>::new());
    }

    #[test]
    fn final_bin_may_exceed_batch_when_bin_count_is_capped() {
        // max_batch = 2 allows at most one full bin before the cap; the
        // oversized remainder rides in the final bin and the receiving
        // invoker re-splits it.
        let plan = pack_counts(vec![count("a", 10)], 2);
        assert_eq!(plan.remote, vec![vec![count("a", 2)], vec![count("a", 8)]]);
        assert_eq!(plan.local, Vec::<InvocationCount>::new());
    }

    #[test]
    fn bins_sum_exactly_to_batch_except_the_last() {
        let plan = pack_counts(
            vec![count("a", 5), count("b", 5), count("c", 9)],
            6,
        );
        let sums: Vec<usize> = plan
            .remote
            .iter()
            .map(|bin| bin.iter().map(|c| c.count).sum())
            .collect();
        for sum in &sums[..sums.len().saturating_sub(1)] {
            assert_eq!(*sum, 6, "Every non-final bin fills its batch");
        }
        let local_total: usize = plan.local.iter().map(|c| c.count).sum();
        assert!(local_total <= 6, "Local work never exceeds one batch");
        assert_eq!(plan.total(), 19, "No invocations lost in packing");
    }

    #[test]
    fn zero_counts_are_dropped() {
        let plan = pack_counts(vec![count("a", 0), count("b", 2)], 6);
        assert_eq!(plan.local, vec![count("b", 2)]);
    }

    #[test]
    fn headroom_clamps_at_zero() {
        let app = app_with_coordinator_concurrency(1);
        // Component a is over its limit already; b has headroom.
        let status = status(&[
            ("a", Some(25), Some(100)),
            ("b", Some(0), Some(4)),
            ("c", Some(0), Some(0)),
        ]);
        let plan = build_plan(&app, &status);
        assert_eq!(plan.local, vec![count("b", 4)]);
        assert_eq!(plan.remote, Vec::<Vec<InvocationCount>>::new());
    }

    #[test]
    fn share_divides_rounding_up() {
        let app = app_with_coordinator_concurrency(2);
        let status = status(&[("a", Some(0), Some(5)), ("b", None, Some(3)), ("c", Some(0), None)]);
        let plan = build_plan(&app, &status);
        // a: min(5, 20) = 5, ceil(5 / 2) = 3. b and c lack a measurement
        // and are skipped entirely.
        assert_eq!(plan.local, vec![count("a", 3)]);
    }

    #[test]
    fn empty_application_yields_empty_plan() {
        let app = app_with_coordinator_concurrency(1);
        let status = status(&[
            ("a", Some(0), Some(0)),
            ("b", Some(0), Some(0)),
            ("c", Some(0), Some(0)),
        ]);
        let plan = build_plan(&app, &status);
        assert!(plan.is_empty());
    }
}
