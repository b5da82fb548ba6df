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

//! Producing the manifests of a new snapshot.
//!
//! A commit goes through these steps:
//!
//! 1. Collect the changes with a [`MergingSnapshotProducer`]: added data and
//!    delete files, appended manifests, and the files to remove (by file, by
//!    path, by row filter or by partition).
//! 2. Validate the changes against the snapshots committed since the
//!    operation started, with the [`SnapshotValidator`] returned by
//!    [`MergingSnapshotProducer::validator`].
//! 3. [`apply`](MergingSnapshotProducer::apply) the changes on top of the
//!    current snapshot to get the manifests of the new snapshot, and write
//!    them to a manifest list.
//! 4. Once the new snapshot is published, or the commit is abandoned, call
//!    [`clean_uncommitted`](MergingSnapshotProducer::clean_uncommitted) to
//!    delete the manifests that didn't make it.
//!
//! If publishing fails because another writer committed first, steps 2 to 4
//! are repeated against the new table state. Manifests written by earlier
//! attempts are reused when their inputs didn't change.

mod content;
pub use content::{DataContent, DeleteContent, ManifestContentKind};
mod manifest_filter;
pub use manifest_filter::{ManifestFilterManager, ManifestWriterContext};
mod manifest_merge;
pub use manifest_merge::MergeManifestManager;
mod snapshot;
pub use snapshot::{
    MergingSnapshotProducer, MergingSnapshotProducerBuilder, generate_unique_snapshot_id,
};
mod validate;
pub use validate::SnapshotValidator;
