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

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use flowlink_error::{make_err, Code, Error};
use futures::stream::StreamExt;
use futures::Stream;
use tracing::{event, Level};

/// The number of attempts a retried cloud operation makes in total,
/// including the first run. Cloud APIs exhibit spurious transient failures;
/// cheap local retry markedly improves end-to-end success without masking
/// hard faults.
pub const DEFAULT_TOTAL_ATTEMPTS: usize = 3;

pub struct ExponentialBackoff {
    current: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration) -> Self {
        ExponentialBackoff { current: base }
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.current;
        self.current *= 2;
        Some(current)
    }
}

type SleepFn = Box<dyn Fn(Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// The result of a single attempt of a retried operation.
pub enum RetryResult<T> {
    Ok(T),
    Retry(Error),
    Err(Error),
}

/// Runs a stream of attempts until one succeeds, fails hard, or the
/// duration iterator runs dry. Remember that `.take(N)` on the duration
/// iterator yields N + 1 total attempts.
pub struct Retrier {
    sleep_fn: SleepFn,
}

impl Retrier {
    pub fn new(sleep_fn: SleepFn) -> Self {
        Retrier { sleep_fn }
    }

    pub async fn retry<T, S>(
        &self,
        label: &str,
        duration_iter: impl Iterator<Item = Duration>,
        operation: S,
    ) -> Result<T, Error>
    where
        S: Stream<Item = RetryResult<T>> + Send,
    {
        let mut iter = duration_iter;
        let mut operation = Box::pin(operation);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation.next().await {
                None => {
                    return Err(make_err!(
                        Code::Internal,
                        "Retry stream ended abruptly in '{}'",
                        label,
                    ))
                }
                Some(RetryResult::Ok(value)) => return Ok(value),
                Some(RetryResult::Err(e)) => return Err(e),
                Some(RetryResult::Retry(e)) => match iter.next() {
                    None => return Err(e),
                    Some(duration) => {
                        event!(
                            Level::WARN,
                            label,
                            attempt,
                            err = %e,
                            "Transient failure, retrying"
                        );
                        (self.sleep_fn)(duration).await;
                    }
                },
            }
        }
    }
}
