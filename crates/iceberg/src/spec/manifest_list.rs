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

//! ManifestList for Iceberg.

use std::fmt::{Display, Formatter};

use bytes::Bytes;
use serde_derive::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use super::{Manifest, UNASSIGNED_SEQUENCE_NUMBER};
use crate::error::Result;
use crate::io::{FileIO, OutputFile};
use crate::{Error, ErrorKind};

/// Snapshots embed a list of manifest files, the manifest list.
///
/// Each entry describes one manifest file with enough metadata to skip it
/// without reading it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestList {
    /// Entries in a manifest list.
    entries: Vec<ManifestFile>,
}

impl ManifestList {
    /// Parse manifest list from its json encoding.
    pub fn parse_json(bs: &[u8]) -> Result<ManifestList> {
        Ok(serde_json::from_slice(bs)?)
    }

    /// Get the entries in the manifest list.
    pub fn entries(&self) -> &[ManifestFile] {
        &self.entries
    }

    /// Take ownership of the entries in the manifest list, consuming it
    pub fn consume_entries(self) -> impl IntoIterator<Item = ManifestFile> {
        self.entries
    }
}

/// Entry in a manifest list.
#[derive(Debug, PartialEq, Clone, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Location of the manifest file
    pub manifest_path: String,
    /// Length of the manifest file in bytes
    pub manifest_length: i64,
    /// ID of a partition spec used to write the manifest; must be listed
    /// in table metadata partition-specs
    pub partition_spec_id: i32,
    /// The type of files tracked by the manifest, either data or delete
    /// files; 0 for all v1 manifests
    pub content: ManifestContentType,
    /// The sequence number when the manifest was added to the table; use 0
    /// when reading v1 manifest lists
    pub sequence_number: i64,
    /// The minimum data sequence number of all live data or delete files in
    /// the manifest; use 0 when reading v1 manifest lists
    pub min_sequence_number: i64,
    /// ID of the snapshot where the manifest file was added, `None` until the
    /// manifest is committed or stamped by a producer
    pub added_snapshot_id: Option<i64>,
    /// Number of entries in the manifest that have status ADDED, when null
    /// this is assumed to be non-zero
    pub added_files_count: Option<u32>,
    /// Number of entries in the manifest that have status EXISTING (0),
    /// when null this is assumed to be non-zero
    pub existing_files_count: Option<u32>,
    /// Number of entries in the manifest that have status DELETED (2),
    /// when null this is assumed to be non-zero
    pub deleted_files_count: Option<u32>,
    /// Number of rows in all of files in the manifest that have status
    /// ADDED, when null this is assumed to be non-zero
    pub added_rows_count: Option<u64>,
    /// Number of rows in all of files in the manifest that have status
    /// EXISTING, when null this is assumed to be non-zero
    pub existing_rows_count: Option<u64>,
    /// Number of rows in all of files in the manifest that have status
    /// DELETED, when null this is assumed to be non-zero
    pub deleted_rows_count: Option<u64>,
    /// The starting _row_id to assign to rows added by ADDED data files
    pub first_row_id: Option<u64>,
}

impl ManifestFile {
    /// Checks if the manifest file has any added files.
    pub fn has_added_files(&self) -> bool {
        self.added_files_count.is_none_or(|c| c > 0)
    }

    /// Checks whether this manifest contains entries with EXISTING status.
    pub fn has_existing_files(&self) -> bool {
        self.existing_files_count.is_none_or(|c| c > 0)
    }

    /// Checks whether this manifest contains entries with DELETED status.
    pub fn has_deleted_files(&self) -> bool {
        self.deleted_files_count.is_none_or(|c| c > 0)
    }

    /// Load [`Manifest`], filling inherited snapshot ids and sequence
    /// numbers from this entry.
    pub async fn load_manifest(&self, file_io: &FileIO) -> Result<Manifest> {
        let content = file_io.new_input(&self.manifest_path)?.read().await?;
        let mut manifest = Manifest::parse_json(&content)?;
        manifest.inherit_data(self);
        Ok(manifest)
    }
}

/// The type of files tracked by the manifest, either data or delete files; Data(0) for all v1 manifests
#[derive(
    Debug, PartialEq, Clone, Copy, Eq, Hash, Default, Serialize_repr, Deserialize_repr,
)]
#[repr(u8)]
pub enum ManifestContentType {
    /// The manifest content is data.
    #[default]
    Data = 0,
    /// The manifest content is deletes.
    Deletes = 1,
}

impl Display for ManifestContentType {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            ManifestContentType::Data => write!(f, "data"),
            ManifestContentType::Deletes => write!(f, "deletes"),
        }
    }
}

/// Writes the manifest list of a new snapshot.
///
/// Manifests written during this commit carry an unassigned sequence number,
/// the writer replaces it with the commit's sequence number.
pub struct ManifestListWriter {
    output_file: OutputFile,
    snapshot_id: i64,
    parent_snapshot_id: Option<i64>,
    sequence_number: i64,
    entries: Vec<ManifestFile>,
}

impl std::fmt::Debug for ManifestListWriter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestListWriter")
            .field("output_file", &self.output_file.location())
            .field("snapshot_id", &self.snapshot_id)
            .field("parent_snapshot_id", &self.parent_snapshot_id)
            .field("sequence_number", &self.sequence_number)
            .finish_non_exhaustive()
    }
}

impl ManifestListWriter {
    /// Construct a manifest list writer for the snapshot `snapshot_id`.
    pub fn new(
        output_file: OutputFile,
        snapshot_id: i64,
        parent_snapshot_id: Option<i64>,
        sequence_number: i64,
    ) -> Self {
        Self {
            output_file,
            snapshot_id,
            parent_snapshot_id,
            sequence_number,
            entries: vec![],
        }
    }

    /// Parent of the snapshot being written.
    pub fn parent_snapshot_id(&self) -> Option<i64> {
        self.parent_snapshot_id
    }

    /// Append manifests to be written.
    ///
    /// A manifest without a snapshot id is stamped with this snapshot's id.
    /// A manifest with an unassigned sequence number must have been added
    /// by this snapshot.
    pub fn add_manifests(&mut self, manifests: impl Iterator<Item = ManifestFile>) -> Result<()> {
        for mut manifest in manifests {
            let added_snapshot_id = *manifest.added_snapshot_id.get_or_insert(self.snapshot_id);
            if manifest.sequence_number == UNASSIGNED_SEQUENCE_NUMBER {
                if added_snapshot_id != self.snapshot_id {
                    return Err(Error::new(
                        ErrorKind::DataInvalid,
                        format!(
                            "Found unassigned sequence number for a manifest from snapshot {added_snapshot_id}: {}",
                            manifest.manifest_path
                        ),
                    ));
                }
                manifest.sequence_number = self.sequence_number;
            }
            if manifest.min_sequence_number == UNASSIGNED_SEQUENCE_NUMBER {
                if added_snapshot_id != self.snapshot_id {
                    return Err(Error::new(
                        ErrorKind::DataInvalid,
                        format!(
                            "Found unassigned min sequence number for a manifest from snapshot {added_snapshot_id}: {}",
                            manifest.manifest_path
                        ),
                    ));
                }
                manifest.min_sequence_number = self.sequence_number;
            }
            self.entries.push(manifest);
        }
        Ok(())
    }

    /// Write the manifest list.
    pub async fn close(self) -> Result<()> {
        let list = ManifestList {
            entries: self.entries,
        };
        let content = serde_json::to_vec(&list)?;
        self.output_file.write(Bytes::from(content)).await
    }
}
