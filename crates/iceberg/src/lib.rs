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

//! Snapshot production and commit conflict detection for Apache Iceberg
//! tables.
//!
//! A [`MergingSnapshotProducer`](transaction::MergingSnapshotProducer)
//! collects the files added and removed by one commit. Applying it against
//! the current table state filters the existing manifests, writes the new
//! ones and merges small manifests together. Before publishing the result,
//! the [`SnapshotValidator`](transaction::SnapshotValidator) checks the
//! snapshots committed concurrently for conflicting changes.
//!
//! # Examples
//!
//! ```rust, no_run
//! use iceberg_commit::io::FileIO;
//! use iceberg_commit::spec::{
//!     DataFile, FormatVersion, NestedField, Operation, PrimitiveType, Schema, TableMetadata,
//! };
//! use iceberg_commit::transaction::MergingSnapshotProducer;
//! use iceberg_commit::Result;
//!
//! async fn append(data_file: DataFile) -> Result<()> {
//!     let schema = Schema::builder()
//!         .with_fields(vec![NestedField::required(1, "id", PrimitiveType::Long).into()])
//!         .build()?;
//!     let metadata = TableMetadata::builder("memory://warehouse/t", schema, FormatVersion::V2)
//!         .build()?;
//!     let file_io = FileIO::new_with_memory();
//!
//!     let mut producer =
//!         MergingSnapshotProducer::builder(&metadata, file_io, Operation::Append).build()?;
//!     producer.add_data_file(data_file)?;
//!
//!     let parent = metadata.current_snapshot().map(|s| s.as_ref());
//!     let manifests = producer.apply(&metadata, parent).await?;
//!     assert_eq!(manifests.len(), 1);
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]

#[macro_use]
extern crate derive_builder;

mod error;
pub use error::{Error, ErrorKind, Result};

pub mod delete_file_index;
pub mod expr;
pub mod io;
pub mod runtime;
pub mod spec;
pub mod transaction;
pub mod util;

mod utils;
