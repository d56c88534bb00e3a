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

use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;
use tokio::task::{JoinError, JoinHandle};

pin_project! {
    /// Simple wrapper that will abort a spawned task when dropped. Handlers
    /// frozen by the platform after signaling completion map onto aborted
    /// tasks here.
    #[must_use]
    pub struct JoinHandleDropGuard<T> {
        #[pin]
        inner: JoinHandle<T>,
    }

    impl<T> PinnedDrop for JoinHandleDropGuard<T> {
        fn drop(this: Pin<&mut Self>) {
            this.inner.abort();
        }
    }
}

impl<T> JoinHandleDropGuard<T> {
    pub fn new(inner: JoinHandle<T>) -> Self {
        JoinHandleDropGuard { inner }
    }
}

impl<T> std::future::Future for JoinHandleDropGuard<T> {
    type Output = Result<T, JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.project().inner.poll(cx)
    }
}
