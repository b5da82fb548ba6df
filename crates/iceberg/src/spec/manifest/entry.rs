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

use std::sync::Arc;

use serde_derive::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use typed_builder::TypedBuilder;

use crate::spec::manifest::data_file::{DataContentType, DataFile};
use crate::spec::{INITIAL_SEQUENCE_NUMBER, ManifestFile, UNASSIGNED_SEQUENCE_NUMBER};

/// Reference to [`ManifestEntry`].
pub type ManifestEntryRef = Arc<ManifestEntry>;

/// One record of a manifest: a content file plus the tracking information of
/// the snapshot that produced this status.
#[derive(Debug, PartialEq, Eq, Clone, TypedBuilder, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Used to track additions and deletions.
    pub status: ManifestStatus,
    /// Snapshot id where the file was added, or deleted if status is 2.
    /// Inherited when null.
    #[builder(default, setter(strip_option(fallback = snapshot_id_opt)))]
    pub snapshot_id: Option<i64>,
    /// Data sequence number of the file.
    /// Inherited when null and status is 1 (added).
    #[builder(default, setter(strip_option(fallback = sequence_number_opt)))]
    pub sequence_number: Option<i64>,
    /// File sequence number indicating when the file was added.
    /// Inherited when null and status is 1 (added).
    #[builder(default, setter(strip_option(fallback = file_sequence_number_opt)))]
    pub file_sequence_number: Option<i64>,
    /// File path, partition tuple, metrics, …
    pub data_file: DataFile,
}

impl ManifestEntry {
    /// Check if this manifest entry is live, i.e. added or existing.
    pub fn is_alive(&self) -> bool {
        matches!(
            self.status,
            ManifestStatus::Added | ManifestStatus::Existing
        )
    }

    /// Status of this manifest entry
    pub fn status(&self) -> ManifestStatus {
        self.status
    }

    /// Content type of this manifest entry.
    #[inline]
    pub fn content_type(&self) -> DataContentType {
        self.data_file.content
    }

    /// Data file path of this manifest entry.
    #[inline]
    pub fn file_path(&self) -> &str {
        &self.data_file.file_path
    }

    /// Snapshot id
    #[inline]
    pub fn snapshot_id(&self) -> Option<i64> {
        self.snapshot_id
    }

    /// Data sequence number.
    #[inline]
    pub fn sequence_number(&self) -> Option<i64> {
        self.sequence_number
    }

    /// File sequence number.
    #[inline]
    pub fn file_sequence_number(&self) -> Option<i64> {
        self.file_sequence_number
    }

    /// get a reference to the actual data file
    #[inline]
    pub fn data_file(&self) -> &DataFile {
        &self.data_file
    }

    /// Fill in the snapshot id and sequence numbers left null when the entry
    /// was written, using the manifest list entry of its manifest.
    ///
    /// Sequence numbers are inherited only for added entries, or for any
    /// entry of a manifest written at the initial sequence number. An
    /// unassigned manifest sequence number is never inherited.
    pub(crate) fn inherit_data(&mut self, manifest: &ManifestFile) {
        if self.snapshot_id.is_none() {
            self.snapshot_id = manifest.added_snapshot_id;
        }

        let inheritable = manifest.sequence_number != UNASSIGNED_SEQUENCE_NUMBER
            && (self.status == ManifestStatus::Added
                || manifest.sequence_number == INITIAL_SEQUENCE_NUMBER);
        if !inheritable {
            return;
        }

        if self.sequence_number.is_none() {
            self.sequence_number = Some(manifest.sequence_number);
        }
        if self.file_sequence_number.is_none() {
            self.file_sequence_number = Some(manifest.sequence_number);
        }
    }
}

/// Used to track additions and deletions in ManifestEntry.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ManifestStatus {
    /// Value: 0
    Existing = 0,
    /// Value: 1
    Added = 1,
    /// Value: 2
    ///
    /// Deletes are informational only and not used in scans.
    Deleted = 2,
}
