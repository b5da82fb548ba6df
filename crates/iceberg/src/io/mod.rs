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

//! File io used to read and write manifests, manifest lists and to clean up
//! files written by failed commit attempts.
//!
//! [`FileIO`] is a cheap, cloneable handle over a [`Storage`] backend. The
//! crate ships an in-memory backend, [`MemoryStorage`]; embedding callers plug
//! in their object store by implementing [`Storage`].
//!
//! ```rust
//! use bytes::Bytes;
//! use iceberg_commit::io::FileIO;
//!
//! # async fn example() -> iceberg_commit::Result<()> {
//! let file_io = FileIO::new_with_memory();
//! let output = file_io.new_output("memory://warehouse/t/metadata/m0.json")?;
//! output.write(Bytes::from_static(b"{}")).await?;
//! assert!(file_io.exists("memory://warehouse/t/metadata/m0.json").await?);
//! # Ok(())
//! # }
//! ```

mod file_io;
pub use file_io::*;

mod storage;
pub use storage::Storage;

mod storage_memory;
pub use storage_memory::MemoryStorage;
