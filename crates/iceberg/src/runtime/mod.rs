// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Async runtime helpers: task spawning and the bounded worker pool used for
//! manifest io.

use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{StreamExt, TryStreamExt, stream};
use tokio::task;

use crate::utils::available_parallelism;
use crate::{Error, ErrorKind, Result};

/// Handle of a spawned task. The task is aborted when the handle is dropped
/// before completion, so cancelling a commit also cancels its io.
pub struct JoinHandle<T>(task::JoinHandle<T>);

impl<T> Unpin for JoinHandle<T> {}

impl<T: Send + 'static> Future for JoinHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let JoinHandle(handle) = self.get_mut();
        Pin::new(handle).poll(cx).map(|r| {
            r.map_err(|e| {
                Error::new(ErrorKind::Unexpected, "Spawned task failed").with_source(e)
            })
        })
    }
}

impl<T> Drop for JoinHandle<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Spawn a future on the current tokio runtime.
pub fn spawn<F>(f: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    JoinHandle(task::spawn(f))
}

/// Bounded pool used to run manifest reads and writes concurrently.
///
/// At most `parallelism` tasks are in flight at once. Results come back in
/// input order, and the first failure is returned while the remaining tasks
/// are dropped.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    parallelism: NonZeroUsize,
    spawn: bool,
}

impl WorkerPool {
    /// Creates a pool that spawns up to `parallelism` tasks on the tokio
    /// runtime.
    pub fn new(parallelism: usize) -> Result<Self> {
        let parallelism = NonZeroUsize::new(parallelism).ok_or_else(|| {
            Error::new(
                ErrorKind::PreconditionFailed,
                "Worker pool parallelism must be greater than 0",
            )
        })?;
        Ok(Self {
            parallelism,
            spawn: true,
        })
    }

    /// Creates a pool that polls every task on the calling task, one at a
    /// time. Useful when no multi-threaded runtime is available.
    pub fn in_process() -> Self {
        Self {
            parallelism: NonZeroUsize::MIN,
            spawn: false,
        }
    }

    /// Maximum number of tasks in flight.
    pub fn parallelism(&self) -> usize {
        self.parallelism.get()
    }

    /// Runs `f` on every item and collects the results in input order.
    pub async fn run<I, F, Fut, T>(&self, items: I, f: F) -> Result<Vec<T>>
    where
        I: IntoIterator,
        F: Fn(I::Item) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        if self.spawn {
            stream::iter(items.into_iter().map(|item| spawn(f(item))))
                .buffered(self.parallelism.get())
                .map(|joined| joined.and_then(|r| r))
                .try_collect()
                .await
        } else {
            stream::iter(items.into_iter().map(f))
                .buffered(self.parallelism.get())
                .try_collect()
                .await
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self {
            parallelism: available_parallelism(),
            spawn: true,
        }
    }
}
