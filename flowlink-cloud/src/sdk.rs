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

use std::time::Duration;

use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::error::display::DisplayErrorContext;
use flowlink_error::{make_err, Code};
use flowlink_util::retry::{ExponentialBackoff, RetryResult, DEFAULT_TOTAL_ATTEMPTS};

/// Base delay between retried cloud API calls. The platform throttles
/// globally, so local backoff stays short and jitter-free.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

pub(crate) fn default_backoff() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::new(RETRY_BASE_DELAY).take(DEFAULT_TOTAL_ATTEMPTS - 1)
}

/// Spurious transport failures and a handful of HTTP statuses are worth a
/// local retry. Everything else (validation, credentials, parse) never is.
pub(crate) fn is_retriable<E>(err: &SdkError<E, HttpResponse>) -> bool {
    match err {
        SdkError::ConstructionFailure(_) => false,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(context) => matches!(
            context.raw().status().as_u16(),
            409 | 429 | 500 | 502 | 503 | 504
        ),
        _ => false,
    }
}

pub(crate) fn sdk_retry_result<T, E>(err: SdkError<E, HttpResponse>, context: &str) -> RetryResult<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    if is_retriable(&err) {
        RetryResult::Retry(make_err!(
            Code::Unavailable,
            "{context}: {}",
            DisplayErrorContext(&err)
        ))
    } else {
        RetryResult::Err(make_err!(
            Code::Unavailable,
            "{context}. This is not a retryable error: {}",
            DisplayErrorContext(&err)
        ))
    }
}

pub(crate) fn sdk_err<E>(err: SdkError<E, HttpResponse>, context: &str) -> flowlink_error::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    make_err!(Code::Unavailable, "{context}: {}", DisplayErrorContext(&err))
}
