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

//! Pure Rust in-memory storage implementation for testing.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use super::Storage;
use crate::{Error, ErrorKind, Result};

/// In-memory storage implementation.
///
/// Stores all data in a thread-safe `HashMap`. Paths are normalized so that
/// `memory://path/to/file`, `memory:/path/to/file`, `/path/to/file` and
/// `path/to/file` all address the same file.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    data: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage` instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files currently stored.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read_lock()?.len())
    }

    /// Returns true if no file is stored.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read_lock()?.is_empty())
    }

    pub(crate) fn normalize_path(path: &str) -> String {
        let path = path.strip_prefix("memory://").unwrap_or(path);
        let path = path.strip_prefix("memory:/").unwrap_or(path);
        path.trim_start_matches('/').to_string()
    }

    fn read_lock(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Bytes>>> {
        self.data.read().map_err(|e| {
            Error::new(
                ErrorKind::Unexpected,
                format!("Failed to acquire read lock: {e}"),
            )
        })
    }

    fn write_lock(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Bytes>>> {
        self.data.write().map_err(|e| {
            Error::new(
                ErrorKind::Unexpected,
                format!("Failed to acquire write lock: {e}"),
            )
        })
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.read_lock()?.contains_key(&Self::normalize_path(path)))
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        match self.read_lock()?.get(&Self::normalize_path(path)) {
            Some(bytes) => Ok(bytes.clone()),
            None => Err(Error::new(
                ErrorKind::Unexpected,
                format!("File not found: {path}"),
            )),
        }
    }

    async fn write(&self, path: &str, bs: Bytes) -> Result<()> {
        self.write_lock()?.insert(Self::normalize_path(path), bs);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.write_lock()?.remove(&Self::normalize_path(path));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(MemoryStorage::normalize_path("memory://a/b"), "a/b");
        assert_eq!(MemoryStorage::normalize_path("memory:/a/b"), "a/b");
        assert_eq!(MemoryStorage::normalize_path("/a/b"), "a/b");
        assert_eq!(MemoryStorage::normalize_path("a/b"), "a/b");
    }

    #[tokio::test]
    async fn test_delete_missing_file_is_noop() {
        let storage = MemoryStorage::new();
        storage.delete("memory://nothing").await.unwrap();
        assert!(storage.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let storage = MemoryStorage::new();
        storage
            .write("/m.json", Bytes::from_static(b"1"))
            .await
            .unwrap();
        storage
            .write("memory://m.json", Bytes::from_static(b"2"))
            .await
            .unwrap();

        assert_eq!(storage.len().unwrap(), 1);
        assert_eq!(
            storage.read("m.json").await.unwrap(),
            Bytes::from_static(b"2")
        );
    }
}
