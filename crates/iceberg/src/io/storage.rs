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

use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;

/// Object storage backend used by [`FileIO`](crate::io::FileIO).
///
/// Paths are absolute, including their scheme. Implementations must be safe
/// to share between the tasks of a worker pool.
#[async_trait]
pub trait Storage: Debug + Send + Sync {
    /// Check whether a file exists.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Read the whole content of a file.
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Write the whole content of a file, replacing any previous content.
    async fn write(&self, path: &str, bs: Bytes) -> Result<()>;

    /// Delete a file. Deleting a missing file is not an error.
    async fn delete(&self, path: &str) -> Result<()>;
}
