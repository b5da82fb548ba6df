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

/*!
 * Snapshots
 */
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::{Result, timestamp_ms_to_utc};
use crate::io::FileIO;
use crate::spec::{ManifestContentType, ManifestFile, ManifestList};

/// Reference to [`Snapshot`].
pub type SnapshotRef = Arc<Snapshot>;

/// The operation field is used by some operations, like snapshot expiration, to skip processing certain snapshots.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Only data files were added and no files were removed.
    #[default]
    Append,
    /// Data and delete files were added and removed without changing table data;
    /// i.e., compaction, changing the data file format, or relocating data files.
    Replace,
    /// Data and delete files were added and removed in a logical overwrite operation.
    Overwrite,
    /// Data files were removed and their contents logically deleted and/or delete files were added to delete rows.
    Delete,
}

impl Operation {
    /// Returns the string representation (lowercase) of the operation.
    pub fn as_str(&self) -> &str {
        match self {
            Operation::Append => "append",
            Operation::Replace => "replace",
            Operation::Overwrite => "overwrite",
            Operation::Delete => "delete",
        }
    }
}

/// Summarises the changes in the snapshot.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Default)]
pub struct Summary {
    /// The type of operation in the snapshot
    pub operation: Operation,
    /// Other summary data.
    #[serde(flatten)]
    pub additional_properties: HashMap<String, String>,
}

impl Summary {
    /// An empty summary for `operation`.
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            additional_properties: HashMap::new(),
        }
    }
}

/// A snapshot represents the state of a table at some time and is used to access the complete set of data files in the table.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "kebab-case")]
#[builder(field_defaults(setter(prefix = "with_")))]
pub struct Snapshot {
    /// A unique long ID
    snapshot_id: i64,
    /// The snapshot ID of the snapshot’s parent.
    /// Omitted for any snapshot with no parent
    #[builder(default = None)]
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_snapshot_id: Option<i64>,
    /// A monotonically increasing long that tracks the order of
    /// changes to a table.
    sequence_number: i64,
    /// A timestamp when the snapshot was created, used for garbage
    /// collection and table inspection
    timestamp_ms: i64,
    /// The location of a manifest list for this snapshot that
    /// tracks manifest files with additional metadata.
    #[builder(setter(into))]
    manifest_list: String,
    /// A string map that summarizes the snapshot changes, including operation.
    summary: Summary,
}

impl Snapshot {
    /// Get the id of the snapshot
    #[inline]
    pub fn snapshot_id(&self) -> i64 {
        self.snapshot_id
    }

    /// Get parent snapshot id.
    #[inline]
    pub fn parent_snapshot_id(&self) -> Option<i64> {
        self.parent_snapshot_id
    }

    /// Get sequence_number of the snapshot. Is 0 for Iceberg V1 tables.
    #[inline]
    pub fn sequence_number(&self) -> i64 {
        self.sequence_number
    }

    /// Get location of manifest_list file
    #[inline]
    pub fn manifest_list(&self) -> &str {
        &self.manifest_list
    }

    /// Get summary of the snapshot
    #[inline]
    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    /// Operation that produced the snapshot.
    #[inline]
    pub fn operation(&self) -> Operation {
        self.summary.operation
    }

    /// Get the timestamp of when the snapshot was created
    pub fn timestamp(&self) -> Result<DateTime<Utc>> {
        timestamp_ms_to_utc(self.timestamp_ms)
    }

    /// Get the timestamp of when the snapshot was created in milliseconds
    #[inline]
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    /// Load manifest list.
    pub async fn load_manifest_list(&self, file_io: &FileIO) -> Result<ManifestList> {
        let content = file_io.new_input(&self.manifest_list)?.read().await?;
        ManifestList::parse_json(&content)
    }

    /// Data manifests referenced by this snapshot.
    pub async fn data_manifests(&self, file_io: &FileIO) -> Result<Vec<ManifestFile>> {
        self.manifests_of(file_io, ManifestContentType::Data).await
    }

    /// Delete manifests referenced by this snapshot.
    pub async fn delete_manifests(&self, file_io: &FileIO) -> Result<Vec<ManifestFile>> {
        self.manifests_of(file_io, ManifestContentType::Deletes)
            .await
    }

    async fn manifests_of(
        &self,
        file_io: &FileIO,
        content: ManifestContentType,
    ) -> Result<Vec<ManifestFile>> {
        Ok(self
            .load_manifest_list(file_io)
            .await?
            .consume_entries()
            .into_iter()
            .filter(|manifest| manifest.content == content)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_snapshot_json() {
        let record = r#"
        {
            "snapshot-id": 3051729675574597004,
            "sequence-number": 1,
            "timestamp-ms": 1515100955770,
            "summary": {
                "operation": "append",
                "added-data-files": "2"
            },
            "manifest-list": "s3://b/wh/.../s1.json"
        }
        "#;

        let result: Snapshot = serde_json::from_str(record).unwrap();

        assert_eq!(3051729675574597004, result.snapshot_id());
        assert_eq!(None, result.parent_snapshot_id());
        assert_eq!(Operation::Append, result.operation());
        assert_eq!(
            result.summary().additional_properties["added-data-files"],
            "2"
        );
        assert_eq!(
            result.timestamp().unwrap().timestamp_millis(),
            1515100955770
        );
        assert_eq!("s3://b/wh/.../s1.json", result.manifest_list());
    }

    #[test]
    fn test_builder() {
        let snapshot = Snapshot::builder()
            .with_snapshot_id(2)
            .with_parent_snapshot_id(Some(1))
            .with_sequence_number(2)
            .with_timestamp_ms(0)
            .with_manifest_list("memory://t/metadata/snap-2.json")
            .with_summary(Summary::new(Operation::Delete))
            .build();

        assert_eq!(snapshot.parent_snapshot_id(), Some(1));
        assert_eq!(snapshot.operation().as_str(), "delete");
    }
}
